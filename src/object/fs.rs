//! Filesystem-backed object layer.
//!
//! Buckets are directories under a configurable root; objects are flat
//! files inside their bucket (keys with `/` become nested directories).
//! Multipart state lives under `<bucket>/.multipart/` (see the
//! `multipart` module for the on-disk contract).
//!
//! All writes follow crash-only design: write to a temp file under
//! `.tmp/`, fsync, rename.  Mutations of one (bucket, object) pair are
//! serialized through the namespace lock map.

use std::collections::HashMap;
use std::future::Future;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use md5::{Digest, Md5};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::errors::{generate_request_id, StorageError};
use crate::nslock::NsLockMap;
use crate::validate::{validate_bucket_name, validate_object_name};

use super::{
    CompletedPart, ListMultipartsInfo, ListPartsInfo, ObjectLayer, PayloadReader, PayloadWriter,
};

/// Reserved directory holding multipart upload state inside a bucket.
pub(super) const MULTIPART_DIR: &str = ".multipart";

/// Reserved directory for in-flight temp files under the storage root.
const TMP_DIR: &str = ".tmp";

/// Default minimum size of every part but the last (5 MiB).
pub const DEFAULT_MIN_PART_SIZE: i64 = 5 * 1024 * 1024;

/// Filesystem-backed [`ObjectLayer`] implementation.
pub struct FsObjects {
    /// Root directory for all buckets.
    pub(super) root: PathBuf,
    /// Namespace locks serializing mutations per (bucket, object).
    pub(super) nslock: Arc<NsLockMap>,
    /// Minimum size of every part but the last in a completed upload.
    pub(super) min_part_size: i64,
}

impl FsObjects {
    /// Create an `FsObjects` rooted at `root`.  The directory is created
    /// if it does not exist.
    pub fn new(root: impl Into<PathBuf>, nslock: Arc<NsLockMap>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join(TMP_DIR))?;
        Ok(Self {
            root,
            nslock,
            min_part_size: DEFAULT_MIN_PART_SIZE,
        })
    }

    /// Override the minimum part size enforced by
    /// CompleteMultipartUpload.
    pub fn with_min_part_size(mut self, min_part_size: i64) -> Self {
        self.min_part_size = min_part_size;
        self
    }

    // -- Path helpers ---------------------------------------------------------

    pub(super) fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    pub(super) fn bucket_exists(&self, bucket: &str) -> bool {
        self.bucket_path(bucket).is_dir()
    }

    /// Resolve an object key to its file path, rejecting keys that would
    /// escape the bucket or collide with reserved state.
    pub(super) fn object_path(&self, bucket: &str, object: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(object);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        let reserved = matches!(
            rel.components().next(),
            Some(Component::Normal(first)) if first == MULTIPART_DIR
        );
        if escapes || reserved {
            return Err(StorageError::ObjectNameInvalid {
                bucket: bucket.to_string(),
                object: object.to_string(),
            });
        }
        Ok(self.bucket_path(bucket).join(rel))
    }

    /// Generate a temp file path under `.tmp/` for atomic writes.
    pub(super) fn temp_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.root.join(TMP_DIR).join(format!("tmp-{id}"))
    }

    /// Operation ID for lock instrumentation; empty when instrumentation
    /// is off.
    pub(super) fn ops_id(&self) -> String {
        if self.nslock.is_instrumented() {
            generate_request_id()
        } else {
            String::new()
        }
    }

    // -- Payload streaming ----------------------------------------------------

    /// Read exactly `size` bytes from `reader` into a fresh temp file,
    /// hashing MD5 as it reads.  Returns the temp path and the lowercase
    /// hex digest.
    ///
    /// A reader that runs dry early yields `UnexpectedEof`; a reader with
    /// bytes left over past `size` yields `IncompleteBody`.
    pub(super) async fn stream_to_temp(
        &self,
        reader: PayloadReader<'_>,
        size: i64,
    ) -> Result<(PathBuf, String), StorageError> {
        let tmp_path = self.temp_path();
        let mut file = std::fs::File::create(&tmp_path)?;
        let mut hasher = Md5::new();
        let mut buf = [0u8; 64 * 1024];
        let mut remaining = size.max(0) as u64;

        let result: Result<String, StorageError> = loop {
            if remaining == 0 {
                // The declared size is authoritative; any surplus byte in
                // the reader is an over-send.
                let mut probe = [0u8; 1];
                match reader.read(&mut probe).await {
                    Ok(0) => {}
                    Ok(_) => break Err(StorageError::IncompleteBody { size }),
                    Err(err) => break Err(err.into()),
                }
                break Ok(hex::encode(hasher.finalize()));
            }
            let want = (buf.len() as u64).min(remaining) as usize;
            match reader.read(&mut buf[..want]).await {
                Ok(0) => break Err(StorageError::UnexpectedEof),
                Ok(n) => {
                    hasher.update(&buf[..n]);
                    if let Err(err) = file.write_all(&buf[..n]) {
                        break Err(err.into());
                    }
                    remaining -= n as u64;
                }
                Err(err) => break Err(err.into()),
            }
        };

        match result {
            Ok(etag) => {
                file.sync_all()?;
                Ok((tmp_path, etag))
            }
            Err(err) => {
                drop(file);
                let _ = std::fs::remove_file(&tmp_path);
                Err(err)
            }
        }
    }

    // -- Whole-object operations ----------------------------------------------

    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        validate_bucket_name(bucket)?;
        let path = self.bucket_path(bucket);
        if path.is_dir() {
            return Err(StorageError::BucketExists {
                bucket: bucket.to_string(),
            });
        }
        std::fs::create_dir_all(&path)?;
        Ok(())
    }

    async fn write_object(
        &self,
        bucket: &str,
        object: &str,
        size: i64,
        reader: PayloadReader<'_>,
        _metadata: HashMap<String, String>,
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
        let res = async {
            let (tmp_path, etag) = self.stream_to_temp(reader, size).await?;
            let final_path = self.object_path(bucket, object)?;
            if let Some(parent) = final_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::rename(&tmp_path, &final_path)?;
            Ok(etag)
        }
        .await;
        self.nslock.unlock(bucket, object, &op_id);
        res
    }

    async fn read_object(
        &self,
        bucket: &str,
        object: &str,
        offset: i64,
        length: i64,
        writer: PayloadWriter<'_>,
    ) -> Result<(), StorageError> {
        validate_bucket_name(bucket)?;
        validate_object_name(bucket, object)?;
        if !self.bucket_exists(bucket) {
            return Err(StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            });
        }

        let op_id = self.ops_id();
        self.nslock.rlock(bucket, object, &op_id).await;
        let res = self
            .copy_object_range(bucket, object, offset, length, writer)
            .await;
        self.nslock.runlock(bucket, object, &op_id);
        res
    }

    async fn copy_object_range(
        &self,
        bucket: &str,
        object: &str,
        offset: i64,
        length: i64,
        writer: PayloadWriter<'_>,
    ) -> Result<(), StorageError> {
        let path = self.object_path(bucket, object)?;
        if !path.is_file() {
            return Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                object: object.to_string(),
            });
        }
        let mut file = std::fs::File::open(&path)?;
        let total = file.metadata()?.len();
        let offset = offset.max(0) as u64;
        if offset > total {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "offset beyond object size",
            )));
        }
        file.seek(SeekFrom::Start(offset))?;

        let mut remaining = if length < 0 {
            total - offset
        } else {
            (length as u64).min(total - offset)
        };
        let mut buf = [0u8; 64 * 1024];
        while remaining > 0 {
            let want = (buf.len() as u64).min(remaining) as usize;
            let n = file.read(&mut buf[..want])?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
            remaining -= n as u64;
        }
        writer.flush().await?;
        Ok(())
    }
}

// -- ObjectLayer impl ---------------------------------------------------------

impl ObjectLayer for FsObjects {
    fn make_bucket(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
        let bucket = bucket.to_string();
        Box::pin(async move { self.create_bucket(&bucket).await })
    }

    fn put_object<'a>(
        &'a self,
        bucket: &str,
        object: &str,
        size: i64,
        reader: PayloadReader<'a>,
        metadata: HashMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = Result<String, StorageError>> + Send + 'a>> {
        let bucket = bucket.to_string();
        let object = object.to_string();
        Box::pin(async move {
            self.write_object(&bucket, &object, size, reader, metadata)
                .await
        })
    }

    fn get_object<'a>(
        &'a self,
        bucket: &str,
        object: &str,
        offset: i64,
        length: i64,
        writer: PayloadWriter<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + 'a>> {
        let bucket = bucket.to_string();
        let object = object.to_string();
        Box::pin(async move {
            self.read_object(&bucket, &object, offset, length, writer)
                .await
        })
    }

    fn new_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        metadata: HashMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = Result<String, StorageError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let object = object.to_string();
        Box::pin(async move { self.new_multipart(&bucket, &object, metadata).await })
    }

    fn put_object_part<'a>(
        &'a self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: i32,
        size: i64,
        reader: PayloadReader<'a>,
        expected_md5: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, StorageError>> + Send + 'a>> {
        let bucket = bucket.to_string();
        let object = object.to_string();
        let upload_id = upload_id.to_string();
        let expected_md5 = expected_md5.to_string();
        Box::pin(async move {
            self.put_part(
                &bucket,
                &object,
                &upload_id,
                part_number,
                size,
                reader,
                &expected_md5,
            )
            .await
        })
    }

    fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: &str,
        upload_id_marker: &str,
        delimiter: &str,
        max_uploads: i32,
    ) -> Pin<Box<dyn Future<Output = Result<ListMultipartsInfo, StorageError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        let key_marker = key_marker.to_string();
        let upload_id_marker = upload_id_marker.to_string();
        let delimiter = delimiter.to_string();
        Box::pin(async move {
            self.list_uploads(
                &bucket,
                &prefix,
                &key_marker,
                &upload_id_marker,
                &delimiter,
                max_uploads,
            )
            .await
        })
    }

    fn list_object_parts(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number_marker: i32,
        max_parts: i32,
    ) -> Pin<Box<dyn Future<Output = Result<ListPartsInfo, StorageError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let object = object.to_string();
        let upload_id = upload_id.to_string();
        Box::pin(async move {
            self.list_parts(&bucket, &object, &upload_id, part_number_marker, max_parts)
                .await
        })
    }

    fn abort_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let object = object.to_string();
        let upload_id = upload_id.to_string();
        Box::pin(async move { self.abort_multipart(&bucket, &object, &upload_id).await })
    }

    fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Pin<Box<dyn Future<Output = Result<String, StorageError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let object = object.to_string();
        let upload_id = upload_id.to_string();
        Box::pin(async move {
            self.complete_multipart(&bucket, &object, &upload_id, parts)
                .await
        })
    }
}

// -- Unit tests ---------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn new_fs() -> (tempfile::TempDir, FsObjects) {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsObjects::new(dir.path(), Arc::new(NsLockMap::new(false))).unwrap();
        (dir, fs)
    }

    #[tokio::test]
    async fn test_make_bucket_and_duplicate() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();
        let err = fs.make_bucket("minio-bucket").await.unwrap_err();
        assert_eq!(err.to_string(), "Bucket exists: minio-bucket");
    }

    #[tokio::test]
    async fn test_make_bucket_invalid_name() {
        let (_dir, fs) = new_fs();
        let err = fs.make_bucket(".test").await.unwrap_err();
        assert_eq!(err.to_string(), "Bucket name invalid: .test");
    }

    #[tokio::test]
    async fn test_put_get_object_roundtrip() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();

        let etag = fs
            .put_object(
                "minio-bucket",
                "minio-object",
                4,
                &mut &b"abcd"[..],
                HashMap::new(),
            )
            .await
            .unwrap();
        assert_eq!(etag, "e2fc714c4727ee9395f324cd2e7f331f");

        let mut out = Vec::new();
        fs.get_object("minio-bucket", "minio-object", 0, -1, &mut out)
            .await
            .unwrap();
        assert_eq!(out, b"abcd");
    }

    #[tokio::test]
    async fn test_get_object_range() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();
        fs.put_object(
            "minio-bucket",
            "minio-object",
            10,
            &mut &b"0123456789"[..],
            HashMap::new(),
        )
        .await
        .unwrap();

        let mut out = Vec::new();
        fs.get_object("minio-bucket", "minio-object", 2, 4, &mut out)
            .await
            .unwrap();
        assert_eq!(out, b"2345");
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();
        let mut out = Vec::new();
        let err = fs
            .get_object("minio-bucket", "ghost", 0, -1, &mut out)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Object not found: minio-bucket#ghost");
    }

    #[tokio::test]
    async fn test_put_object_size_mismatch() {
        let (_dir, fs) = new_fs();
        fs.make_bucket("minio-bucket").await.unwrap();

        let err = fs
            .put_object(
                "minio-bucket",
                "minio-object",
                5,
                &mut &b"abcd"[..],
                HashMap::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "EOF");

        let err = fs
            .put_object(
                "minio-bucket",
                "minio-object",
                3,
                &mut &b"abcd"[..],
                HashMap::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Contains more data than specified size of 3 bytes."
        );
    }

    #[tokio::test]
    async fn test_object_path_rejects_traversal() {
        let (_dir, fs) = new_fs();
        assert!(fs.object_path("bucket", "../escape").is_err());
        assert!(fs.object_path("bucket", "/absolute").is_err());
        assert!(fs.object_path("bucket", ".multipart/sneaky").is_err());
        assert!(fs.object_path("bucket", "plain/nested/key").is_ok());
    }
}
