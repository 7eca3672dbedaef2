//! Multipart upload engine for [`FsObjects`].
//!
//! On-disk contract (durability of multipart state): each upload is a
//! subdirectory under `<bucket>/.multipart/<object>/<uploadID>/`
//! containing one file per part named `<partNumber>.<etag>` plus a JSON
//! `uploadMeta` file holding `{initiatedAt, userMetadata}`.
//!
//! Upload IDs are 128 random bits rendered as canonical lowercase
//! hyphenated hex.  Uploads for the same (bucket, object) coexist;
//! abort and completion take the exclusive namespace lock while part
//! uploads share a read lock, so parts of one upload proceed
//! concurrently but never race a commit.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::StorageError;
use crate::validate::{validate_bucket_name, validate_object_name};

use super::fs::{FsObjects, MULTIPART_DIR};
use super::{
    CompletedPart, ListMultipartsInfo, ListPartsInfo, MultipartUploadInfo, PartInfo, PayloadReader,
};

/// Name of the per-upload metadata file.
const UPLOAD_META_FILE: &str = "uploadMeta";

/// Hard cap on entries returned by one listing call.
const MAX_UPLOADS_LIST: i32 = 1000;

/// Hard cap on parts returned by one ListObjectParts call.
const MAX_PARTS_LIST: i32 = 1000;

/// Per-upload metadata, stored as `uploadMeta` inside the upload
/// directory.
#[derive(Debug, Serialize, Deserialize)]
struct UploadMeta {
    #[serde(rename = "initiatedAt")]
    initiated_at: String,
    #[serde(rename = "userMetadata", default)]
    user_metadata: HashMap<String, String>,
}

/// One upload discovered by a bucket scan.
#[derive(Debug)]
struct UploadRecord {
    object: String,
    upload_id: String,
    initiated: String,
}

impl FsObjects {
    // -- Path helpers ---------------------------------------------------------

    fn multipart_root(&self, bucket: &str) -> PathBuf {
        self.bucket_path(bucket).join(MULTIPART_DIR)
    }

    fn upload_dir(&self, bucket: &str, object: &str, upload_id: &str) -> PathBuf {
        self.multipart_root(bucket).join(object).join(upload_id)
    }

    fn upload_exists(&self, bucket: &str, object: &str, upload_id: &str) -> bool {
        self.upload_dir(bucket, object, upload_id)
            .join(UPLOAD_META_FILE)
            .is_file()
    }

    // -- NewMultipartUpload ---------------------------------------------------

    pub(super) async fn new_multipart(
        &self,
        bucket: &str,
        object: &str,
        metadata: HashMap<String, String>,
    ) -> Result<String, StorageError> {
        validate_bucket_name(bucket)?;
        validate_object_name(bucket, object)?;
        if !self.bucket_exists(bucket) {
            return Err(StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            });
        }

        let op_id = self.ops_id();
        self.nslock.lock(bucket, object, &op_id).await;
        let res = self.create_upload(bucket, object, metadata);
        self.nslock.unlock(bucket, object, &op_id);
        res
    }

    fn create_upload(
        &self,
        bucket: &str,
        object: &str,
        metadata: HashMap<String, String>,
    ) -> Result<String, StorageError> {
        let object_dir = self.multipart_root(bucket).join(object);
        std::fs::create_dir_all(&object_dir)?;

        // 128 random bits; retry on the (negligible) collision with an
        // existing upload directory.
        let upload_dir = loop {
            let upload_id = Uuid::new_v4().to_string();
            let dir = object_dir.join(&upload_id);
            match std::fs::create_dir(&dir) {
                Ok(()) => break dir,
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            }
        };

        let meta = UploadMeta {
            initiated_at: now_iso8601(),
            user_metadata: metadata,
        };
        let tmp_path = self.temp_path();
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&serde_json::to_vec(&meta)?)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, upload_dir.join(UPLOAD_META_FILE))?;

        Ok(upload_dir
            .file_name()
            .expect("upload dir has a name")
            .to_string_lossy()
            .into_owned())
    }

    // -- PutObjectPart --------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub(super) async fn put_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: i32,
        size: i64,
        reader: PayloadReader<'_>,
        expected_md5: &str,
    ) -> Result<String, StorageError> {
        validate_bucket_name(bucket)?;
        validate_object_name(bucket, object)?;
        if !self.bucket_exists(bucket) {
            return Err(StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            });
        }

        // Parts of one upload may proceed concurrently; abort and
        // completion take the write lock.
        let op_id = self.ops_id();
        self.nslock.rlock(bucket, object, &op_id).await;
        let res = self
            .write_part(bucket, object, upload_id, part_number, size, reader, expected_md5)
            .await;
        self.nslock.runlock(bucket, object, &op_id);
        res
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: i32,
        size: i64,
        reader: PayloadReader<'_>,
        expected_md5: &str,
    ) -> Result<String, StorageError> {
        // An upload ID is only valid against the exact (bucket, object)
        // it was minted for.
        if !self.upload_exists(bucket, object, upload_id) {
            return Err(StorageError::InvalidUploadId {
                upload_id: upload_id.to_string(),
            });
        }
        if !(1..=10000).contains(&part_number) {
            return Err(StorageError::InvalidPart { part_number });
        }

        let (tmp_path, etag) = self.stream_to_temp(reader, size).await?;
        if !expected_md5.is_empty() && expected_md5 != etag {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(StorageError::BadDigest {
                expected: expected_md5.to_string(),
                computed: etag,
            });
        }

        let upload_dir = self.upload_dir(bucket, object, upload_id);
        let part_name = format!("{part_number}.{etag}");
        std::fs::rename(&tmp_path, upload_dir.join(&part_name))?;

        // Re-uploading a part number replaces the prior record; drop any
        // superseded part file.
        let stale_prefix = format!("{part_number}.");
        for entry in std::fs::read_dir(&upload_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&stale_prefix) && name != part_name {
                let _ = std::fs::remove_file(entry.path());
            }
        }

        Ok(etag)
    }

    // -- ListMultipartUploads -------------------------------------------------

    pub(super) async fn list_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: &str,
        upload_id_marker: &str,
        delimiter: &str,
        max_uploads: i32,
    ) -> Result<ListMultipartsInfo, StorageError> {
        validate_bucket_name(bucket)?;
        if !self.bucket_exists(bucket) {
            return Err(StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            });
        }
        if !delimiter.is_empty() && delimiter != "/" {
            return Err(StorageError::UnsupportedDelimiter {
                delimiter: delimiter.to_string(),
            });
        }
        if !key_marker.is_empty() && !key_marker.starts_with(prefix) {
            return Err(StorageError::InvalidMarkerPrefixCombination {
                marker: key_marker.to_string(),
                prefix: prefix.to_string(),
            });
        }
        if !upload_id_marker.is_empty() {
            if key_marker.ends_with('/') {
                return Err(StorageError::InvalidUploadIdMarkerCombination {
                    upload_id_marker: upload_id_marker.to_string(),
                    key_marker: key_marker.to_string(),
                });
            }
            if Uuid::parse_str(upload_id_marker).is_err() {
                return Err(StorageError::InvalidUuid {
                    uuid: upload_id_marker.to_string(),
                });
            }
        }

        let max_uploads = max_uploads.clamp(0, MAX_UPLOADS_LIST);

        let mut records = self.collect_uploads(bucket)?;
        records.retain(|r| r.object.starts_with(prefix));
        // Object name first, then initiation order; upload IDs only break
        // exact timestamp ties.
        records.sort_by(|a, b| {
            (&a.object, &a.initiated, &a.upload_id).cmp(&(&b.object, &b.initiated, &b.upload_id))
        });

        let mut uploads = Vec::new();
        let mut common_prefixes: Vec<String> = Vec::new();
        let mut is_truncated = false;
        let mut last_key = String::new();
        let mut last_upload_id = String::new();
        // With an upload-ID marker the listing resumes after that entry;
        // everything at or before it in the sorted order has been paged
        // out already.
        let mut past_marker = upload_id_marker.is_empty();

        for rec in &records {
            if rec.object.as_str() < key_marker {
                continue;
            }
            if !key_marker.is_empty() && rec.object == key_marker && upload_id_marker.is_empty() {
                // The marker entry itself was emitted on the prior page.
                continue;
            }
            if !past_marker {
                if key_marker.is_empty() || rec.object == key_marker {
                    if rec.upload_id == upload_id_marker {
                        past_marker = true;
                    }
                    continue;
                }
                // Moved beyond the marker's object without meeting it.
                past_marker = true;
            }

            // Delimiter folding: report the segment up to the first
            // delimiter past the prefix instead of the upload itself.
            if delimiter == "/" {
                if let Some(pos) = rec.object[prefix.len()..].find('/') {
                    let common = rec.object[..prefix.len() + pos + 1].to_string();
                    // Already reported, on this page or (as the key
                    // marker) on the prior one.
                    if common_prefixes.contains(&common) || common == key_marker {
                        continue;
                    }
                    if (uploads.len() + common_prefixes.len()) as i32 >= max_uploads {
                        is_truncated = true;
                        break;
                    }
                    last_key = common.clone();
                    last_upload_id.clear();
                    common_prefixes.push(common);
                    continue;
                }
            }

            if (uploads.len() + common_prefixes.len()) as i32 >= max_uploads {
                is_truncated = true;
                break;
            }
            last_key = rec.object.clone();
            last_upload_id = rec.upload_id.clone();
            uploads.push(MultipartUploadInfo {
                object: rec.object.clone(),
                upload_id: rec.upload_id.clone(),
                initiated: rec.initiated.clone(),
            });
        }

        let (next_key_marker, next_upload_id_marker) = if is_truncated {
            (last_key, last_upload_id)
        } else {
            (String::new(), String::new())
        };

        Ok(ListMultipartsInfo {
            key_marker: key_marker.to_string(),
            upload_id_marker: upload_id_marker.to_string(),
            next_key_marker,
            next_upload_id_marker,
            max_uploads,
            is_truncated,
            uploads,
            prefix: prefix.to_string(),
            delimiter: delimiter.to_string(),
            common_prefixes,
        })
    }

    /// Walk `<bucket>/.multipart/` and gather every active upload.  An
    /// upload directory is recognized by a name in upload-ID form that
    /// holds an `uploadMeta` file; everything above it is object-name
    /// path.
    fn collect_uploads(&self, bucket: &str) -> Result<Vec<UploadRecord>, StorageError> {
        let root = self.multipart_root(bucket);
        let mut records = Vec::new();
        if !root.is_dir() {
            return Ok(records);
        }

        let mut stack = vec![root.clone()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                let meta_path = path.join(UPLOAD_META_FILE);
                if Uuid::parse_str(&name).is_ok() && meta_path.is_file() {
                    let meta: UploadMeta =
                        serde_json::from_slice(&std::fs::read(&meta_path)?)?;
                    let object = relative_object_name(&root, &path);
                    records.push(UploadRecord {
                        object,
                        upload_id: name,
                        initiated: meta.initiated_at,
                    });
                } else {
                    stack.push(path);
                }
            }
        }
        Ok(records)
    }

    // -- ListObjectParts ------------------------------------------------------

    pub(super) async fn list_parts(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number_marker: i32,
        max_parts: i32,
    ) -> Result<ListPartsInfo, StorageError> {
        validate_bucket_name(bucket)?;
        validate_object_name(bucket, object)?;
        if !self.bucket_exists(bucket) {
            return Err(StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            });
        }

        let op_id = self.ops_id();
        self.nslock.rlock(bucket, object, &op_id).await;
        let res = self.scan_upload_parts(bucket, object, upload_id, part_number_marker, max_parts);
        self.nslock.runlock(bucket, object, &op_id);
        res
    }

    fn scan_upload_parts(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number_marker: i32,
        max_parts: i32,
    ) -> Result<ListPartsInfo, StorageError> {
        if !self.upload_exists(bucket, object, upload_id) {
            return Err(StorageError::InvalidUploadId {
                upload_id: upload_id.to_string(),
            });
        }
        let max_parts = max_parts.clamp(0, MAX_PARTS_LIST);
        let all = self.scan_parts(&self.upload_dir(bucket, object, upload_id))?;
        let mut remaining: Vec<PartInfo> = all
            .into_iter()
            .filter(|p| p.part_number > part_number_marker)
            .collect();

        let is_truncated = remaining.len() as i32 > max_parts;
        remaining.truncate(max_parts as usize);
        let next_part_number_marker = if is_truncated {
            remaining.last().map(|p| p.part_number).unwrap_or(0)
        } else {
            0
        };

        Ok(ListPartsInfo {
            bucket: bucket.to_string(),
            object: object.to_string(),
            upload_id: upload_id.to_string(),
            part_number_marker,
            next_part_number_marker,
            max_parts,
            is_truncated,
            parts: remaining,
        })
    }

    /// Read the part records of one upload directory, ordered by part
    /// number.  A superseded duplicate (same part number, older file)
    /// loses to the latest write.
    fn scan_parts(&self, upload_dir: &Path) -> Result<Vec<PartInfo>, StorageError> {
        let mut by_number: HashMap<i32, (PartInfo, SystemTime)> = HashMap::new();
        for entry in std::fs::read_dir(upload_dir)? {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == UPLOAD_META_FILE {
                continue;
            }
            let Some((number, etag)) = name.split_once('.') else {
                continue;
            };
            let Ok(part_number) = number.parse::<i32>() else {
                continue;
            };
            let meta = entry.metadata()?;
            let modified = meta.modified()?;
            let info = PartInfo {
                part_number,
                size: meta.len() as i64,
                etag: etag.to_string(),
                last_modified: iso8601(modified),
            };
            match by_number.get(&part_number) {
                Some((_, seen)) if *seen >= modified => {}
                _ => {
                    by_number.insert(part_number, (info, modified));
                }
            }
        }
        let mut parts: Vec<PartInfo> = by_number.into_values().map(|(info, _)| info).collect();
        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }

    // -- AbortMultipartUpload -------------------------------------------------

    pub(super) async fn abort_multipart(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        validate_bucket_name(bucket)?;
        validate_object_name(bucket, object)?;
        if !self.bucket_exists(bucket) {
            return Err(StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            });
        }

        let op_id = self.ops_id();
        self.nslock.lock(bucket, object, &op_id).await;
        let res = self.remove_upload(bucket, object, upload_id);
        self.nslock.unlock(bucket, object, &op_id);
        res
    }

    fn remove_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        if !self.upload_exists(bucket, object, upload_id) {
            return Err(StorageError::InvalidUploadId {
                upload_id: upload_id.to_string(),
            });
        }
        std::fs::remove_dir_all(self.upload_dir(bucket, object, upload_id))?;
        self.prune_empty_upload_dirs(bucket, object);
        Ok(())
    }

    /// Best-effort cleanup of now-empty object directories below
    /// `.multipart/`.  `remove_dir` refuses non-empty directories, so the
    /// walk stops at the first dir still in use.
    fn prune_empty_upload_dirs(&self, bucket: &str, object: &str) {
        let root = self.multipart_root(bucket);
        let mut dir = root.join(object);
        while dir.starts_with(&root) && dir != root {
            if std::fs::remove_dir(&dir).is_err() {
                break;
            }
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => break,
            }
        }
    }

    // -- CompleteMultipartUpload ----------------------------------------------

    pub(super) async fn complete_multipart(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<String, StorageError> {
        validate_bucket_name(bucket)?;
        validate_object_name(bucket, object)?;
        if !self.bucket_exists(bucket) {
            return Err(StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            });
        }

        let op_id = self.ops_id();
        self.nslock.lock(bucket, object, &op_id).await;
        let res = self.assemble_upload(bucket, object, upload_id, parts);
        self.nslock.unlock(bucket, object, &op_id);
        res
    }

    fn assemble_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<String, StorageError> {
        if !self.upload_exists(bucket, object, upload_id) {
            return Err(StorageError::InvalidUploadId {
                upload_id: upload_id.to_string(),
            });
        }
        if parts.is_empty() {
            return Err(StorageError::InvalidPart { part_number: 0 });
        }
        for pair in parts.windows(2) {
            if pair[1].part_number <= pair[0].part_number {
                return Err(StorageError::InvalidPartOrder);
            }
        }

        let upload_dir = self.upload_dir(bucket, object, upload_id);
        let stored = self.scan_parts(&upload_dir)?;
        let by_number: HashMap<i32, &PartInfo> =
            stored.iter().map(|p| (p.part_number, p)).collect();

        let tmp_path = self.temp_path();
        let mut out = std::fs::File::create(&tmp_path)?;
        let mut md5_concat: Vec<u8> = Vec::with_capacity(parts.len() * 16);

        let result: Result<String, StorageError> = (|| {
            for (i, requested) in parts.iter().enumerate() {
                let part_number = requested.part_number;
                let stored_part = by_number
                    .get(&part_number)
                    .ok_or(StorageError::InvalidPart { part_number })?;
                // Clients may quote etags; stored ones never are.
                if requested.etag.trim_matches('"') != stored_part.etag {
                    return Err(StorageError::InvalidPart { part_number });
                }
                let is_last = i == parts.len() - 1;
                if !is_last && stored_part.size < self.min_part_size {
                    return Err(StorageError::EntityTooSmall { part_number });
                }

                let part_path = upload_dir.join(format!("{part_number}.{}", stored_part.etag));
                let mut src = std::fs::File::open(&part_path)?;
                std::io::copy(&mut src, &mut out)?;
                md5_concat.extend_from_slice(
                    &hex::decode(&stored_part.etag)
                        .map_err(|_| StorageError::InvalidPart { part_number })?,
                );
            }
            out.sync_all()?;

            // Aggregate etag: MD5 of the concatenated raw part digests,
            // suffixed with the part count.
            Ok(format!(
                "{}-{}",
                hex::encode(Md5::digest(&md5_concat)),
                parts.len()
            ))
        })();

        let etag = match result {
            Ok(etag) => etag,
            Err(err) => {
                let _ = std::fs::remove_file(&tmp_path);
                return Err(err);
            }
        };

        let final_path = self.object_path(bucket, object)?;
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&tmp_path, &final_path)?;

        // The upload record is gone once the object is committed; staged
        // part data cleanup is best-effort.
        let _ = std::fs::remove_dir_all(&upload_dir);
        self.prune_empty_upload_dirs(bucket, object);

        Ok(etag)
    }
}

// -- Timestamp helpers --------------------------------------------------------

/// Current time as an ISO-8601 string with nanosecond precision.  The
/// fixed width keeps lexicographic order equal to chronological order,
/// which the listing sort relies on.
fn now_iso8601() -> String {
    iso8601(SystemTime::now())
}

/// Format a timestamp as ISO-8601 with nanosecond precision.
fn iso8601(at: SystemTime) -> String {
    let since_epoch = at
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = since_epoch.as_secs();
    let nanos = since_epoch.subsec_nanos();

    let days = secs / 86400;
    let day_secs = secs % 86400;
    let hours = day_secs / 3600;
    let minutes = (day_secs % 3600) / 60;
    let seconds = day_secs % 60;

    let (year, month, day) = days_to_ymd(days);

    format!("{year:04}-{month:02}-{day:02}T{hours:02}:{minutes:02}:{seconds:02}.{nanos:09}Z")
}

/// Convert days since Unix epoch to (year, month, day).
fn days_to_ymd(days: u64) -> (i32, u32, u32) {
    let z = days as i64 + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if m <= 2 { y + 1 } else { y };
    (year as i32, m as u32, d as u32)
}

/// Object name of an upload directory: the path between the multipart
/// root and the upload-ID component, joined with `/`.
fn relative_object_name(root: &Path, upload_dir: &Path) -> String {
    let rel = upload_dir
        .parent()
        .and_then(|p| p.strip_prefix(root).ok())
        .unwrap_or_else(|| Path::new(""));
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// -- Unit tests ---------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nslock::NsLockMap;
    use crate::object::ObjectLayer;
    use std::sync::Arc;
    use std::time::Duration;

    const MD5_EMPTY: &str = "d41d8cd98f00b204e9800998ecf8427e";
    const MD5_ABCD: &str = "e2fc714c4727ee9395f324cd2e7f331f";
    const MD5_EFGH: &str = "1f7690ebdd9b4caf8fab49ca1757bf27";
    const MD5_IJKL: &str = "09a0877d04abf8759f99adec02baf579";
    const MD5_MNOP: &str = "e132e96a5ddad6da8b07bba6f6131fef";

    fn new_fs() -> (tempfile::TempDir, FsObjects) {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsObjects::new(dir.path(), Arc::new(NsLockMap::new(false))).unwrap();
        (dir, fs)
    }

    /// Start an upload with a short pause first, so initiation timestamps
    /// order the uploads the way they were created.
    async fn start_upload(fs: &FsObjects, bucket: &str, object: &str) -> String {
        tokio::time::sleep(Duration::from_millis(2)).await;
        fs.new_multipart_upload(bucket, object, HashMap::new())
            .await
            .unwrap()
    }

    async fn seed_part(fs: &FsObjects, bucket: &str, object: &str, id: &str, n: i32, data: &[u8]) {
        let mut reader = data;
        fs.put_object_part(bucket, object, id, n, data.len() as i64, &mut reader, "")
            .await
            .unwrap();
    }

    // -- NewMultipartUpload ---------------------------------------------------

    #[tokio::test]
    async fn test_new_multipart_upload_missing_bucket() {
        let (_dir, fs) = new_fs();
        let err = fs
            .new_multipart_upload("minio-bucket", "minio-object", HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Bucket not found: minio-bucket");
    }

    #[tokio::test]
    async fn test_new_multipart_upload_then_abort() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();

        let upload_id = fs
            .new_multipart_upload("minio-bucket", "minio-object", HashMap::new())
            .await
            .unwrap();
        assert!(Uuid::parse_str(&upload_id).is_ok());

        // Aborting with a bogus ID does not touch the real upload.
        let err = fs
            .abort_multipart_upload("minio-bucket", "minio-object", "abc")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid upload id abc");

        fs.abort_multipart_upload("minio-bucket", "minio-object", &upload_id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_abort_succeeds_exactly_once() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();
        let id = start_upload(&fs, "minio-bucket", "minio-object").await;

        fs.abort_multipart_upload("minio-bucket", "minio-object", &id)
            .await
            .unwrap();
        let err = fs
            .abort_multipart_upload("minio-bucket", "minio-object", &id)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), format!("Invalid upload id {id}"));
    }

    #[tokio::test]
    async fn test_uploads_for_same_object_coexist() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();
        let id1 = start_upload(&fs, "minio-bucket", "minio-object").await;
        let id2 = start_upload(&fs, "minio-bucket", "minio-object").await;
        assert_ne!(id1, id2);

        fs.abort_multipart_upload("minio-bucket", "minio-object", &id1)
            .await
            .unwrap();
        // The sibling upload survives the abort.
        seed_part(&fs, "minio-bucket", "minio-object", &id2, 1, b"abcd").await;
    }

    // -- PutObjectPart --------------------------------------------------------

    #[tokio::test]
    async fn test_put_object_part_failures() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();
        let upload_id = fs
            .new_multipart_upload("minio-bucket", "minio-object", HashMap::new())
            .await
            .unwrap();
        fs.make_bucket("unused-bucket").await.unwrap();

        struct Case {
            bucket: &'static str,
            object: &'static str,
            upload_id: String,
            part_number: i32,
            data: &'static [u8],
            md5: &'static str,
            size: i64,
            expected: String,
        }

        let cases = vec![
            // Invalid bucket names.
            Case {
                bucket: ".test",
                object: "obj",
                upload_id: String::new(),
                part_number: 1,
                data: b"",
                md5: "",
                size: 0,
                expected: "Bucket name invalid: .test".to_string(),
            },
            Case {
                bucket: "------",
                object: "obj",
                upload_id: String::new(),
                part_number: 1,
                data: b"",
                md5: "",
                size: 0,
                expected: "Bucket name invalid: ------".to_string(),
            },
            Case {
                bucket: "$this-is-not-valid-too",
                object: "obj",
                upload_id: String::new(),
                part_number: 1,
                data: b"",
                md5: "",
                size: 0,
                expected: "Bucket name invalid: $this-is-not-valid-too".to_string(),
            },
            Case {
                bucket: "a",
                object: "obj",
                upload_id: String::new(),
                part_number: 1,
                data: b"",
                md5: "",
                size: 0,
                expected: "Bucket name invalid: a".to_string(),
            },
            // Invalid object name.
            Case {
                bucket: "minio-bucket",
                object: "",
                upload_id: String::new(),
                part_number: 1,
                data: b"",
                md5: "",
                size: 0,
                expected: "Object name invalid: minio-bucket#".to_string(),
            },
            // Valid names, nonexistent bucket.
            Case {
                bucket: "abc",
                object: "def",
                upload_id: String::new(),
                part_number: 1,
                data: b"",
                md5: "",
                size: 0,
                expected: "Bucket not found: abc".to_string(),
            },
            // Existing bucket without an initiated upload.
            Case {
                bucket: "unused-bucket",
                object: "def",
                upload_id: "xyz".to_string(),
                part_number: 1,
                data: b"",
                md5: "",
                size: 0,
                expected: "Invalid upload id xyz".to_string(),
            },
            // Right bucket, wrong object.
            Case {
                bucket: "minio-bucket",
                object: "def",
                upload_id: "xyz".to_string(),
                part_number: 1,
                data: b"",
                md5: "",
                size: 0,
                expected: "Invalid upload id xyz".to_string(),
            },
            // Right (bucket, object), bogus upload ID.
            Case {
                bucket: "minio-bucket",
                object: "minio-object",
                upload_id: "xyz".to_string(),
                part_number: 1,
                data: b"",
                md5: "",
                size: 0,
                expected: "Invalid upload id xyz".to_string(),
            },
            // A minted upload ID is invalid against any other bucket.
            Case {
                bucket: "unused-bucket",
                object: "minio-object",
                upload_id: upload_id.clone(),
                part_number: 1,
                data: b"",
                md5: "",
                size: 0,
                expected: format!("Invalid upload id {upload_id}"),
            },
            // ... and against any other object.
            Case {
                bucket: "minio-bucket",
                object: "none-object",
                upload_id: upload_id.clone(),
                part_number: 1,
                data: b"",
                md5: "",
                size: 0,
                expected: format!("Invalid upload id {upload_id}"),
            },
            // MD5 mismatch over drained (empty) input.
            Case {
                bucket: "minio-bucket",
                object: "minio-object",
                upload_id: upload_id.clone(),
                part_number: 1,
                data: b"",
                md5: "a35",
                size: 0,
                expected: format!(
                    "Bad digest: Expected a35 is not valid with what we calculated {MD5_EMPTY}"
                ),
            },
            // MD5 mismatch over real data.
            Case {
                bucket: "minio-bucket",
                object: "minio-object",
                upload_id: upload_id.clone(),
                part_number: 1,
                data: b"abcd",
                md5: "a35",
                size: 4,
                expected: format!(
                    "Bad digest: Expected a35 is not valid with what we calculated {MD5_ABCD}"
                ),
            },
            // Declared size larger than the reader holds.
            Case {
                bucket: "minio-bucket",
                object: "minio-object",
                upload_id: upload_id.clone(),
                part_number: 1,
                data: b"abcd",
                md5: "a35",
                size: 5,
                expected: "EOF".to_string(),
            },
            // Declared size smaller than the reader holds.
            Case {
                bucket: "minio-bucket",
                object: "minio-object",
                upload_id: upload_id.clone(),
                part_number: 1,
                data: b"abcd",
                md5: "a35",
                size: 3,
                expected: "Contains more data than specified size of 3 bytes.".to_string(),
            },
        ];

        for (i, case) in cases.iter().enumerate() {
            let mut reader = case.data;
            let err = fs
                .put_object_part(
                    case.bucket,
                    case.object,
                    &case.upload_id,
                    case.part_number,
                    case.size,
                    &mut reader,
                    case.md5,
                )
                .await
                .unwrap_err();
            assert_eq!(
                err.to_string(),
                case.expected,
                "case {} failed with the wrong error",
                i + 1
            );
        }
    }

    #[tokio::test]
    async fn test_put_object_part_success_returns_md5() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();
        let id = fs
            .new_multipart_upload("minio-bucket", "minio-object", HashMap::new())
            .await
            .unwrap();

        let inputs: [(&[u8], i32, &str); 4] = [
            (b"abcd", 1, MD5_ABCD),
            (b"efgh", 2, MD5_EFGH),
            (b"ijkl", 3, MD5_IJKL),
            (b"mnop", 4, MD5_MNOP),
        ];
        for (data, part_number, expected_md5) in inputs {
            let mut reader = data;
            let etag = fs
                .put_object_part(
                    "minio-bucket",
                    "minio-object",
                    &id,
                    part_number,
                    data.len() as i64,
                    &mut reader,
                    expected_md5,
                )
                .await
                .unwrap();
            assert_eq!(etag, expected_md5);
        }
    }

    #[tokio::test]
    async fn test_put_object_part_replaces_prior_record() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();
        let id = start_upload(&fs, "minio-bucket", "minio-object").await;

        seed_part(&fs, "minio-bucket", "minio-object", &id, 1, b"abcd").await;
        // Re-putting the same bytes yields the same etag.
        seed_part(&fs, "minio-bucket", "minio-object", &id, 1, b"abcd").await;
        // New bytes replace the record atomically.
        seed_part(&fs, "minio-bucket", "minio-object", &id, 1, b"efgh").await;

        let listed = fs
            .list_object_parts("minio-bucket", "minio-object", &id, 0, 1000)
            .await
            .unwrap();
        assert_eq!(listed.parts.len(), 1);
        assert_eq!(listed.parts[0].part_number, 1);
        assert_eq!(listed.parts[0].etag, MD5_EFGH);
        assert_eq!(listed.parts[0].size, 4);
    }

    #[tokio::test]
    async fn test_put_object_part_rejects_out_of_range_number() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();
        let id = start_upload(&fs, "minio-bucket", "minio-object").await;

        for part_number in [0, -1, 10001] {
            let mut reader: &[u8] = b"abcd";
            let err = fs
                .put_object_part("minio-bucket", "minio-object", &id, part_number, 4, &mut reader, "")
                .await
                .unwrap_err();
            assert!(matches!(err, StorageError::InvalidPart { .. }));
        }
    }

    // -- ListMultipartUploads -------------------------------------------------

    /// Mirror of the seeded listing fixture: bucket 0 holds one upload
    /// with four parts, bucket 1 holds three uploads of one object.
    async fn seed_listing_fixture(fs: &FsObjects) -> Vec<String> {
        let mut ids = Vec::new();

        fs.make_bucket("minio-bucket").await.unwrap();
        ids.push(start_upload(fs, "minio-bucket", "minio-object").await);

        fs.make_bucket("minio-2-bucket").await.unwrap();
        for _ in 0..3 {
            ids.push(start_upload(fs, "minio-2-bucket", "minio-object").await);
        }

        for (data, part_number) in [(b"abcd", 1), (b"efgh", 2), (b"ijkl", 3), (b"mnop", 4)] {
            seed_part(fs, "minio-bucket", "minio-object", &ids[0], part_number, data).await;
        }
        for id in &ids[1..4] {
            seed_part(fs, "minio-2-bucket", "minio-object", id, 1, b"abcd").await;
        }
        ids
    }

    #[tokio::test]
    async fn test_list_uploads_validation_failures() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();

        let cases: Vec<(&str, &str, &str, &str, &str, i32, String)> = vec![
            (".test", "", "", "", "", 0, "Bucket name invalid: .test".to_string()),
            ("Test", "", "", "", "", 0, "Bucket name invalid: Test".to_string()),
            ("---", "", "", "", "", 0, "Bucket name invalid: ---".to_string()),
            ("ad", "", "", "", "", 0, "Bucket name invalid: ad".to_string()),
            (
                "volatile-bucket-1",
                "",
                "",
                "",
                "",
                0,
                "Bucket not found: volatile-bucket-1".to_string(),
            ),
            (
                "minio-bucket",
                "",
                "",
                "",
                "*",
                0,
                "delimiter '*' is not supported".to_string(),
            ),
            (
                "minio-bucket",
                "",
                "",
                "",
                "-",
                0,
                "delimiter '-' is not supported".to_string(),
            ),
            (
                "minio-bucket",
                "asia",
                "europe-object",
                "",
                "",
                0,
                "Invalid combination of marker 'europe-object' and prefix 'asia'".to_string(),
            ),
            (
                "minio-bucket",
                "asia",
                "asia/europe/",
                "abc",
                "",
                0,
                "Invalid combination of uploadID marker 'abc' and marker 'asia/europe/'".to_string(),
            ),
            (
                "minio-bucket",
                "asia",
                "asia/europe",
                "abc",
                "",
                0,
                "unknown UUID string abc".to_string(),
            ),
        ];

        for (i, (bucket, prefix, key_marker, uid_marker, delimiter, max, expected)) in
            cases.iter().enumerate()
        {
            let err = fs
                .list_multipart_uploads(bucket, prefix, key_marker, uid_marker, delimiter, *max)
                .await
                .unwrap_err();
            assert_eq!(&err.to_string(), expected, "case {} failed", i + 1);
        }
    }

    #[tokio::test]
    async fn test_list_uploads_single_upload_bucket() {
        let (_dir, fs) = new_fs();
        let ids = seed_listing_fixture(&fs).await;

        // Four parts fold into exactly one upload entry.
        let result = fs
            .list_multipart_uploads("minio-bucket", "", "", "", "", 100)
            .await
            .unwrap();
        assert_eq!(result.max_uploads, 100);
        assert!(!result.is_truncated);
        assert_eq!(result.uploads.len(), 1);
        assert_eq!(result.uploads[0].object, "minio-object");
        assert_eq!(result.uploads[0].upload_id, ids[0]);

        // Key markers sorting before the object leave it visible...
        for (key_marker, max) in [("kin", 100), ("min", 10), ("min", 1)] {
            let result = fs
                .list_multipart_uploads("minio-bucket", "", key_marker, "", "", max)
                .await
                .unwrap();
            assert_eq!(result.uploads.len(), 1, "marker {key_marker} max {max}");
            assert!(!result.is_truncated);
            assert_eq!(result.key_marker, key_marker);
        }

        // ...markers sorting after it hide it.
        for max in [100, 1] {
            let result = fs
                .list_multipart_uploads("minio-bucket", "", "orange", "", "", max)
                .await
                .unwrap();
            assert!(result.uploads.is_empty());
            assert!(!result.is_truncated);
            assert_eq!(result.max_uploads, max);
        }

        // maxUploads of zero truncates when anything matches; -1 is
        // tolerated and treated the same way.
        for max in [0, -1] {
            let result = fs
                .list_multipart_uploads("minio-bucket", "", "min", "", "", max)
                .await
                .unwrap();
            assert!(result.uploads.is_empty());
            assert!(result.is_truncated);
            assert_eq!(result.max_uploads, 0);
        }

        // An entry whose object equals the key marker is skipped.
        let result = fs
            .list_multipart_uploads("minio-bucket", "", "minio-object", "", "", 2)
            .await
            .unwrap();
        assert!(result.uploads.is_empty());
        assert!(!result.is_truncated);

        // Prefix handling.
        for (prefix, max, expect) in [
            ("minio-object", 2, 1),
            ("min", 2, 1),
            ("min", 1, 1),
            ("orange", 2, 0),
            ("Asia", 2, 0),
        ] {
            let result = fs
                .list_multipart_uploads("minio-bucket", prefix, "", "", "", max)
                .await
                .unwrap();
            assert_eq!(result.uploads.len(), expect, "prefix {prefix}");
            assert!(!result.is_truncated);
            assert_eq!(result.prefix, prefix);
        }

        // A "/" delimiter leaves slash-free objects as plain entries.
        let result = fs
            .list_multipart_uploads("minio-bucket", "", "", "", "/", 2)
            .await
            .unwrap();
        assert_eq!(result.uploads.len(), 1);
        assert!(result.common_prefixes.is_empty());
        assert!(!result.is_truncated);
        assert_eq!(result.delimiter, "/");
    }

    #[tokio::test]
    async fn test_list_uploads_multiple_ids_per_object() {
        let (_dir, fs) = new_fs();
        let ids = seed_listing_fixture(&fs).await;

        // All three uploads list in initiation order.
        let result = fs
            .list_multipart_uploads("minio-2-bucket", "", "", "", "", 100)
            .await
            .unwrap();
        assert_eq!(
            result
                .uploads
                .iter()
                .map(|u| u.upload_id.as_str())
                .collect::<Vec<_>>(),
            vec![ids[1].as_str(), ids[2].as_str(), ids[3].as_str()]
        );
        assert!(!result.is_truncated);

        // An upload-ID marker resumes after that entry.
        let result = fs
            .list_multipart_uploads("minio-2-bucket", "", "", &ids[1], "", 100)
            .await
            .unwrap();
        assert_eq!(
            result
                .uploads
                .iter()
                .map(|u| u.upload_id.as_str())
                .collect::<Vec<_>>(),
            vec![ids[2].as_str(), ids[3].as_str()]
        );
        assert!(!result.is_truncated);

        // Truncation reports the last emitted entry as the next markers.
        let result = fs
            .list_multipart_uploads("minio-2-bucket", "", "", "", "", 2)
            .await
            .unwrap();
        assert_eq!(
            result
                .uploads
                .iter()
                .map(|u| u.upload_id.as_str())
                .collect::<Vec<_>>(),
            vec![ids[1].as_str(), ids[2].as_str()]
        );
        assert!(result.is_truncated);
        assert_eq!(result.next_key_marker, "minio-object");
        assert_eq!(result.next_upload_id_marker, ids[2]);
    }

    #[tokio::test]
    async fn test_list_uploads_delimiter_folds_common_prefixes() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();
        for object in [
            "photos/2016/january/sample.jpg",
            "photos/2016/february/sample.jpg",
            "photos/2017/march/sample.jpg",
            "index.html",
        ] {
            start_upload(&fs, "minio-bucket", object).await;
        }

        let result = fs
            .list_multipart_uploads("minio-bucket", "", "", "", "/", 100)
            .await
            .unwrap();
        assert_eq!(result.uploads.len(), 1);
        assert_eq!(result.uploads[0].object, "index.html");
        assert_eq!(result.common_prefixes, vec!["photos/".to_string()]);

        let result = fs
            .list_multipart_uploads("minio-bucket", "photos/", "", "", "/", 100)
            .await
            .unwrap();
        assert!(result.uploads.is_empty());
        assert_eq!(
            result.common_prefixes,
            vec!["photos/2016/".to_string(), "photos/2017/".to_string()]
        );
        assert!(!result.is_truncated);
    }

    #[tokio::test]
    async fn test_list_uploads_two_pages_equal_one() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();
        for object in ["alpha", "beta", "beta", "gamma", "delta"] {
            start_upload(&fs, "minio-bucket", object).await;
        }

        let unpaged = fs
            .list_multipart_uploads("minio-bucket", "", "", "", "", 1000)
            .await
            .unwrap();
        assert_eq!(unpaged.uploads.len(), 5);
        assert!(!unpaged.is_truncated);

        let mut paged = Vec::new();
        let mut key_marker = String::new();
        let mut upload_id_marker = String::new();
        loop {
            let page = fs
                .list_multipart_uploads(
                    "minio-bucket",
                    "",
                    &key_marker,
                    &upload_id_marker,
                    "",
                    2,
                )
                .await
                .unwrap();
            paged.extend(page.uploads.clone());
            if !page.is_truncated {
                break;
            }
            key_marker = page.next_key_marker;
            upload_id_marker = page.next_upload_id_marker;
        }
        assert_eq!(paged, unpaged.uploads);
    }

    // -- ListObjectParts ------------------------------------------------------

    #[tokio::test]
    async fn test_list_parts_pagination() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();
        let id = start_upload(&fs, "minio-bucket", "minio-object").await;
        for (data, n) in [(b"abcd", 1), (b"efgh", 2), (b"ijkl", 3), (b"mnop", 4)] {
            seed_part(&fs, "minio-bucket", "minio-object", &id, n, data).await;
        }

        let page = fs
            .list_object_parts("minio-bucket", "minio-object", &id, 0, 2)
            .await
            .unwrap();
        assert_eq!(
            page.parts.iter().map(|p| p.part_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(page.is_truncated);
        assert_eq!(page.next_part_number_marker, 2);

        let page = fs
            .list_object_parts("minio-bucket", "minio-object", &id, 2, 2)
            .await
            .unwrap();
        assert_eq!(
            page.parts.iter().map(|p| p.part_number).collect::<Vec<_>>(),
            vec![3, 4]
        );
        assert!(!page.is_truncated);
        assert_eq!(page.next_part_number_marker, 0);

        let err = fs
            .list_object_parts("minio-bucket", "minio-object", "abc", 0, 1000)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid upload id abc");
    }

    // -- CompleteMultipartUpload ----------------------------------------------

    #[tokio::test]
    async fn test_complete_rejects_unknown_upload() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();
        let err = fs
            .complete_multipart_upload(
                "minio-bucket",
                "minio-object",
                "abc",
                vec![CompletedPart {
                    part_number: 1,
                    etag: MD5_ABCD.to_string(),
                }],
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid upload id abc");
    }

    #[tokio::test]
    async fn test_complete_rejects_bad_part_order() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();
        let id = start_upload(&fs, "minio-bucket", "minio-object").await;
        seed_part(&fs, "minio-bucket", "minio-object", &id, 1, b"abcd").await;
        seed_part(&fs, "minio-bucket", "minio-object", &id, 2, b"efgh").await;

        let err = fs
            .complete_multipart_upload(
                "minio-bucket",
                "minio-object",
                &id,
                vec![
                    CompletedPart {
                        part_number: 2,
                        etag: MD5_EFGH.to_string(),
                    },
                    CompletedPart {
                        part_number: 1,
                        etag: MD5_ABCD.to_string(),
                    },
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPartOrder));
    }

    #[tokio::test]
    async fn test_complete_rejects_unknown_and_mismatched_parts() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();
        let id = start_upload(&fs, "minio-bucket", "minio-object").await;
        seed_part(&fs, "minio-bucket", "minio-object", &id, 1, b"abcd").await;

        // A part that was never uploaded.
        let err = fs
            .complete_multipart_upload(
                "minio-bucket",
                "minio-object",
                &id,
                vec![CompletedPart {
                    part_number: 3,
                    etag: MD5_IJKL.to_string(),
                }],
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid part 3");

        // A stored part with a different etag.
        let err = fs
            .complete_multipart_upload(
                "minio-bucket",
                "minio-object",
                &id,
                vec![CompletedPart {
                    part_number: 1,
                    etag: MD5_EFGH.to_string(),
                }],
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid part 1");
    }

    #[tokio::test]
    async fn test_complete_rejects_small_non_terminal_part() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();
        let id = start_upload(&fs, "minio-bucket", "minio-object").await;
        seed_part(&fs, "minio-bucket", "minio-object", &id, 1, b"abcd").await;
        seed_part(&fs, "minio-bucket", "minio-object", &id, 2, b"efgh").await;

        // Part 1 is four bytes, far below the 5 MiB floor for
        // non-terminal parts.
        let err = fs
            .complete_multipart_upload(
                "minio-bucket",
                "minio-object",
                &id,
                vec![
                    CompletedPart {
                        part_number: 1,
                        etag: MD5_ABCD.to_string(),
                    },
                    CompletedPart {
                        part_number: 2,
                        etag: MD5_EFGH.to_string(),
                    },
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::EntityTooSmall { part_number: 1 }
        ));
    }

    #[tokio::test]
    async fn test_complete_commits_object() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsObjects::new(dir.path(), Arc::new(NsLockMap::new(false)))
            .unwrap()
            .with_min_part_size(1);
        fs.make_bucket("minio-bucket").await.unwrap();
        let id = start_upload(&fs, "minio-bucket", "minio-object").await;
        seed_part(&fs, "minio-bucket", "minio-object", &id, 1, b"abcd").await;
        seed_part(&fs, "minio-bucket", "minio-object", &id, 2, b"efgh").await;

        let etag = fs
            .complete_multipart_upload(
                "minio-bucket",
                "minio-object",
                &id,
                vec![
                    CompletedPart {
                        part_number: 1,
                        etag: format!("\"{MD5_ABCD}\""),
                    },
                    CompletedPart {
                        part_number: 2,
                        etag: MD5_EFGH.to_string(),
                    },
                ],
            )
            .await
            .unwrap();

        // Aggregate etag: MD5 over the concatenated raw part digests,
        // "-N" suffixed.
        let mut concat = Vec::new();
        concat.extend_from_slice(&hex::decode(MD5_ABCD).unwrap());
        concat.extend_from_slice(&hex::decode(MD5_EFGH).unwrap());
        let expected = format!("{}-2", hex::encode(Md5::digest(&concat)));
        assert_eq!(etag, expected);

        // The object holds the concatenated parts.
        let mut out = Vec::new();
        fs.get_object("minio-bucket", "minio-object", 0, -1, &mut out)
            .await
            .unwrap();
        assert_eq!(out, b"abcdefgh");

        // The upload record is gone.
        let err = fs
            .abort_multipart_upload("minio-bucket", "minio-object", &id)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidUploadId { .. }));
        let listed = fs
            .list_multipart_uploads("minio-bucket", "", "", "", "", 100)
            .await
            .unwrap();
        assert!(listed.uploads.is_empty());
    }

    // -- Timestamp helpers ----------------------------------------------------

    #[test]
    fn test_iso8601_format_and_ordering() {
        let now = now_iso8601();
        assert!(now.contains('T'));
        assert!(now.ends_with('Z'));

        let earlier = iso8601(std::time::UNIX_EPOCH + Duration::from_nanos(1_000_000_001));
        let later = iso8601(std::time::UNIX_EPOCH + Duration::from_nanos(1_000_000_002));
        assert_eq!(earlier, "1970-01-01T00:00:01.000000001Z");
        assert!(earlier < later);
    }

    #[test]
    fn test_days_to_ymd() {
        assert_eq!(days_to_ymd(0), (1970, 1, 1));
        assert_eq!(days_to_ymd(365), (1971, 1, 1));
        // 2016-02-29 was day 16860 of the epoch.
        assert_eq!(days_to_ymd(16860), (2016, 2, 29));
    }
}
