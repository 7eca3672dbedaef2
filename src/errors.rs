//! S3-compatible error types.
//!
//! Every variant maps to a well-known S3 error code, and the `#[error]`
//! message strings are a compatibility contract: clients and tests match
//! on them verbatim.  The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(StorageError::BucketNotFound { .. })`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::xml::render_error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Storage and multipart-engine errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The bucket name does not satisfy the S3 naming rules.
    #[error("Bucket name invalid: {bucket}")]
    BucketNameInvalid { bucket: String },

    /// The object name is empty or otherwise unusable.  The bucket acts
    /// as the namespace in the message.
    #[error("Object name invalid: {bucket}#{object}")]
    ObjectNameInvalid { bucket: String, object: String },

    /// The bucket does not exist.
    #[error("Bucket not found: {bucket}")]
    BucketNotFound { bucket: String },

    /// A bucket with this name already exists.
    #[error("Bucket exists: {bucket}")]
    BucketExists { bucket: String },

    /// The object does not exist.
    #[error("Object not found: {bucket}#{object}")]
    ObjectNotFound { bucket: String, object: String },

    /// The (bucket, object, uploadID) triple does not name an active
    /// multipart upload.
    #[error("Invalid upload id {upload_id}")]
    InvalidUploadId { upload_id: String },

    /// A part named in CompleteMultipartUpload was never uploaded, or its
    /// etag does not match the stored part.
    #[error("Invalid part {part_number}")]
    InvalidPart { part_number: i32 },

    /// The parts in CompleteMultipartUpload were not strictly ascending.
    #[error("The list of parts was not in ascending order. Parts must be ordered by part number.")]
    InvalidPartOrder,

    /// A non-terminal part was below the minimum part size.
    #[error("Proposed upload part {part_number} is smaller than the minimum allowed size")]
    EntityTooSmall { part_number: i32 },

    /// The client-supplied MD5 does not match the data received.
    #[error("Bad digest: Expected {expected} is not valid with what we calculated {computed}")]
    BadDigest { expected: String, computed: String },

    /// The reader held more bytes than the declared size.
    #[error("Contains more data than specified size of {size} bytes.")]
    IncompleteBody { size: i64 },

    /// The reader ran dry before the declared size was read.
    #[error("EOF")]
    UnexpectedEof,

    /// keyMarker must begin with prefix when both are set.
    #[error("Invalid combination of marker '{marker}' and prefix '{prefix}'")]
    InvalidMarkerPrefixCombination { marker: String, prefix: String },

    /// uploadIDMarker cannot be combined with a keyMarker naming a prefix.
    #[error("Invalid combination of uploadID marker '{upload_id_marker}' and marker '{key_marker}'")]
    InvalidUploadIdMarkerCombination {
        upload_id_marker: String,
        key_marker: String,
    },

    /// Only "" and "/" are accepted as listing delimiters.
    #[error("delimiter '{delimiter}' is not supported")]
    UnsupportedDelimiter { delimiter: String },

    /// The upload-ID marker was not a well-formed upload ID.
    #[error("unknown UUID string {uuid}")]
    InvalidUuid { uuid: String },

    /// Malformed XML in a request body.
    #[error("The XML you provided was not well-formed or did not validate against our published schema.")]
    MalformedXml,

    /// The requested operation is not implemented.
    #[error("A header you provided implies functionality that is not implemented")]
    NotImplemented,

    /// Persistence failure, propagated verbatim.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Multipart metadata on disk could not be decoded.
    #[error(transparent)]
    Meta(#[from] serde_json::Error),
}

impl StorageError {
    /// Return the S3 XML error code string.
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::BucketNameInvalid { .. } => "InvalidBucketName",
            StorageError::ObjectNameInvalid { .. } => "InvalidArgument",
            StorageError::BucketNotFound { .. } => "NoSuchBucket",
            StorageError::BucketExists { .. } => "BucketAlreadyExists",
            StorageError::ObjectNotFound { .. } => "NoSuchKey",
            StorageError::InvalidUploadId { .. } => "NoSuchUpload",
            StorageError::InvalidPart { .. } => "InvalidPart",
            StorageError::InvalidPartOrder => "InvalidPartOrder",
            StorageError::EntityTooSmall { .. } => "EntityTooSmall",
            StorageError::BadDigest { .. } => "BadDigest",
            StorageError::IncompleteBody { .. } => "IncompleteBody",
            StorageError::UnexpectedEof => "IncompleteBody",
            StorageError::InvalidMarkerPrefixCombination { .. } => "InvalidArgument",
            StorageError::InvalidUploadIdMarkerCombination { .. } => "InvalidArgument",
            StorageError::UnsupportedDelimiter { .. } => "InvalidArgument",
            StorageError::InvalidUuid { .. } => "InvalidArgument",
            StorageError::MalformedXml => "MalformedXML",
            StorageError::NotImplemented => "NotImplemented",
            StorageError::Io(_) => "InternalError",
            StorageError::Meta(_) => "InternalError",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            StorageError::BucketNameInvalid { .. } => StatusCode::BAD_REQUEST,
            StorageError::ObjectNameInvalid { .. } => StatusCode::BAD_REQUEST,
            StorageError::BucketNotFound { .. } => StatusCode::NOT_FOUND,
            StorageError::BucketExists { .. } => StatusCode::CONFLICT,
            StorageError::ObjectNotFound { .. } => StatusCode::NOT_FOUND,
            StorageError::InvalidUploadId { .. } => StatusCode::NOT_FOUND,
            StorageError::InvalidPart { .. } => StatusCode::BAD_REQUEST,
            StorageError::InvalidPartOrder => StatusCode::BAD_REQUEST,
            StorageError::EntityTooSmall { .. } => StatusCode::BAD_REQUEST,
            StorageError::BadDigest { .. } => StatusCode::BAD_REQUEST,
            StorageError::IncompleteBody { .. } => StatusCode::BAD_REQUEST,
            StorageError::UnexpectedEof => StatusCode::BAD_REQUEST,
            StorageError::InvalidMarkerPrefixCombination { .. } => StatusCode::BAD_REQUEST,
            StorageError::InvalidUploadIdMarkerCombination { .. } => StatusCode::BAD_REQUEST,
            StorageError::UnsupportedDelimiter { .. } => StatusCode::BAD_REQUEST,
            StorageError::InvalidUuid { .. } => StatusCode::BAD_REQUEST,
            StorageError::MalformedXml => StatusCode::BAD_REQUEST,
            StorageError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            StorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StorageError::Meta(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StorageError {
    fn into_response(self) -> Response {
        let request_id = generate_request_id();
        let status = self.status_code();
        let date = httpdate::fmt_http_date(std::time::SystemTime::now());

        let body = render_error(self.code(), &self.to_string(), "", &request_id);

        (
            status,
            [
                ("content-type", "application/xml".to_string()),
                ("x-amz-request-id", request_id),
                ("date", date),
                ("server", "TideStore".to_string()),
            ],
            body,
        )
            .into_response()
    }
}

// -- Unit tests ---------------------------------------------------------------
