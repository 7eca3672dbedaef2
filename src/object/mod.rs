//! The object layer.
//!
//! [`ObjectLayer`] is the persistence contract consumed by the HTTP
//! handlers.  The trait uses `async_trait`-style methods (manual
//! desugaring with pinned futures) so implementations can be stored
//! behind `Arc<dyn ObjectLayer>`.  [`fs::FsObjects`] is the
//! filesystem-backed implementation carrying the multipart engine.

pub mod fs;
mod multipart;

pub use fs::FsObjects;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::errors::StorageError;

/// Byte source for object and part payloads.
pub type PayloadReader<'a> = &'a mut (dyn tokio::io::AsyncRead + Send + Unpin);

/// Byte sink for object reads.
pub type PayloadWriter<'a> = &'a mut (dyn tokio::io::AsyncWrite + Send + Unpin);

// -- Result types -------------------------------------------------------------

/// One in-progress multipart upload, as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartUploadInfo {
    /// Object key being uploaded.
    pub object: String,
    /// Opaque upload identifier.
    pub upload_id: String,
    /// ISO-8601 initiation timestamp.
    pub initiated: String,
}

/// Result of a ListMultipartUploads operation.  The marker, prefix,
/// delimiter and max-uploads fields echo the request.
#[derive(Debug, Clone, Default)]
pub struct ListMultipartsInfo {
    pub key_marker: String,
    pub upload_id_marker: String,
    pub next_key_marker: String,
    pub next_upload_id_marker: String,
    pub max_uploads: i32,
    pub is_truncated: bool,
    pub uploads: Vec<MultipartUploadInfo>,
    pub prefix: String,
    pub delimiter: String,
    /// Folded key prefixes when a delimiter is used, deduplicated and in
    /// insertion order.
    pub common_prefixes: Vec<String>,
}

/// Metadata of a single uploaded part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    /// Part number (1-based).
    pub part_number: i32,
    /// Size in bytes.
    pub size: i64,
    /// Unquoted lowercase hex MD5 of the part data.
    pub etag: String,
    /// ISO-8601 upload timestamp.
    pub last_modified: String,
}

/// Result of a ListObjectParts operation.
#[derive(Debug, Clone, Default)]
pub struct ListPartsInfo {
    pub bucket: String,
    pub object: String,
    pub upload_id: String,
    pub part_number_marker: i32,
    pub next_part_number_marker: i32,
    pub max_parts: i32,
    pub is_truncated: bool,
    pub parts: Vec<PartInfo>,
}

/// One entry of the part manifest a client sends to
/// CompleteMultipartUpload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

// -- Trait --------------------------------------------------------------------

/// Async object persistence contract.
///
/// Implementors must serialize concurrent mutations per (bucket, object)
/// and keep multipart state durable across restarts.
pub trait ObjectLayer: Send + Sync + 'static {
    /// Create a new bucket.
    fn make_bucket(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>>;

    /// Store a whole object read from `reader`, returning its etag.
    fn put_object<'a>(
        &'a self,
        bucket: &str,
        object: &str,
        size: i64,
        reader: PayloadReader<'a>,
        metadata: HashMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = Result<String, StorageError>> + Send + 'a>>;

    /// Write `length` bytes of the object starting at `offset` into
    /// `writer`.  A negative `length` means "to the end".
    fn get_object<'a>(
        &'a self,
        bucket: &str,
        object: &str,
        offset: i64,
        length: i64,
        writer: PayloadWriter<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + 'a>>;

    /// Start a multipart upload, returning its upload ID.
    fn new_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        metadata: HashMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = Result<String, StorageError>> + Send + '_>>;

    /// Upload one part, reading exactly `size` bytes from `reader` and
    /// returning the part's etag.  A non-empty `expected_md5` (lowercase
    /// hex) is verified against the data received.
    #[allow(clippy::too_many_arguments)]
    fn put_object_part<'a>(
        &'a self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: i32,
        size: i64,
        reader: PayloadReader<'a>,
        expected_md5: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, StorageError>> + Send + 'a>>;

    /// List in-progress multipart uploads, paginated over
    /// (key, upload ID) markers.
    fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: &str,
        upload_id_marker: &str,
        delimiter: &str,
        max_uploads: i32,
    ) -> Pin<Box<dyn Future<Output = Result<ListMultipartsInfo, StorageError>> + Send + '_>>;

    /// List the parts of one in-progress upload.
    fn list_object_parts(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number_marker: i32,
        max_parts: i32,
    ) -> Pin<Box<dyn Future<Output = Result<ListPartsInfo, StorageError>> + Send + '_>>;

    /// Abort an in-progress upload, discarding its parts.
    fn abort_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>>;

    /// Commit an upload: assemble the named parts in order into the final
    /// object and return the aggregate etag.
    fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Pin<Box<dyn Future<Output = Result<String, StorageError>> + Send + '_>>;
}
