//! Bucket and whole-object S3 API handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::errors::StorageError;
use crate::AppState;

use super::multipart::content_md5_hex;

/// `PUT /{bucket}` -- Create a bucket.
#[utoipa::path(
    put,
    path = "/{bucket}",
    tag = "Bucket",
    operation_id = "CreateBucket",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 200, description = "Bucket created"),
        (status = 409, description = "Bucket already exists")
    )
)]
pub async fn create_bucket(state: Arc<AppState>, bucket: &str) -> Result<Response, StorageError> {
    state.objects.make_bucket(bucket).await?;

    metrics::counter!(crate::metrics::S3_OPERATIONS_TOTAL, "operation" => "CreateBucket")
        .increment(1);

    let mut response = StatusCode::OK.into_response();
    response.headers_mut().insert(
        "location",
        HeaderValue::from_str(&format!("/{bucket}")).expect("valid bucket name header"),
    );
    Ok(response)
}

/// `PUT /{bucket}/{key}` -- Store a whole object.
#[utoipa::path(
    put,
    path = "/{bucket}/{key}",
    tag = "Object",
    operation_id = "PutObject",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Object key"),
    ),
    responses(
        (status = 200, description = "Object stored"),
        (status = 404, description = "Bucket not found")
    )
)]
pub async fn put_object(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, StorageError> {
    // Verify Content-MD5 before anything is committed.
    let expected_md5 = content_md5_hex(headers)?;
    if !expected_md5.is_empty() {
        use md5::{Digest, Md5};
        let computed = hex::encode(Md5::digest(body));
        if expected_md5 != computed {
            return Err(StorageError::BadDigest {
                expected: expected_md5,
                computed,
            });
        }
    }
    let user_metadata = extract_user_metadata(headers);

    let mut reader = body;
    let etag = state
        .objects
        .put_object(bucket, key, body.len() as i64, &mut reader, user_metadata)
        .await?;

    metrics::counter!(crate::metrics::S3_OPERATIONS_TOTAL, "operation" => "PutObject")
        .increment(1);

    let mut response = StatusCode::OK.into_response();
    response.headers_mut().insert(
        "etag",
        HeaderValue::from_str(&format!("\"{etag}\"")).expect("hex etag is a valid header"),
    );
    Ok(response)
}

/// `GET /{bucket}/{key}` -- Read a whole object.
#[utoipa::path(
    get,
    path = "/{bucket}/{key}",
    tag = "Object",
    operation_id = "GetObject",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Object key"),
    ),
    responses(
        (status = 200, description = "Object data"),
        (status = 404, description = "Object not found")
    )
)]
pub async fn get_object(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
) -> Result<Response, StorageError> {
    let mut body: Vec<u8> = Vec::new();
    state
        .objects
        .get_object(bucket, key, 0, -1, &mut body)
        .await?;

    metrics::counter!(crate::metrics::S3_OPERATIONS_TOTAL, "operation" => "GetObject")
        .increment(1);

    Ok((
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        )],
        body,
    )
        .into_response())
}

/// Extract user metadata from request headers.
fn extract_user_metadata(headers: &HeaderMap) -> HashMap<String, String> {
    let mut meta = HashMap::new();
    for (name, value) in headers.iter() {
        let name_str = name.as_str().to_lowercase();
        if name_str.starts_with("x-amz-meta-") {
            if let Ok(val) = value.to_str() {
                meta.insert(name_str, val.to_string());
            }
        }
    }
    meta
}
