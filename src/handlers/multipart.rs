//! Multipart-upload S3 API handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::errors::StorageError;
use crate::object::CompletedPart;
use crate::AppState;

// -- Helper functions ---------------------------------------------------------

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

/// Decode a base64 `Content-MD5` header into the lowercase hex form the
/// engine verifies against.  Absent header means no verification.
pub(super) fn content_md5_hex(headers: &HeaderMap) -> Result<String, StorageError> {
    let Some(value) = headers.get("content-md5").and_then(|v| v.to_str().ok()) else {
        return Ok(String::new());
    };
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, value)
        .map_err(|_| StorageError::BadDigest {
            expected: value.to_string(),
            computed: String::new(),
        })?;
    if decoded.len() != 16 {
        return Err(StorageError::BadDigest {
            expected: value.to_string(),
            computed: String::new(),
        });
    }
    Ok(hex::encode(decoded))
}

fn xml_response(xml: String) -> Response {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/xml"),
        )],
        xml,
    )
        .into_response()
}

// -- Handlers -----------------------------------------------------------------

/// `POST /{bucket}/{key}?uploads` -- Initiate a multipart upload.
#[utoipa::path(
    post,
    path = "/{bucket}/{key}?uploads",
    tag = "Multipart",
    operation_id = "CreateMultipartUpload",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Object key"),
    ),
    responses(
        (status = 200, description = "Multipart upload initiated"),
        (status = 404, description = "Bucket not found")
    )
)]
pub async fn create_multipart_upload(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
) -> Result<Response, StorageError> {
    let user_metadata = extract_user_metadata(headers);
    let upload_id = state
        .objects
        .new_multipart_upload(bucket, key, user_metadata)
        .await?;

    metrics::counter!(crate::metrics::S3_OPERATIONS_TOTAL, "operation" => "CreateMultipartUpload")
        .increment(1);

    let xml = crate::xml::render_initiate_multipart_upload_result(bucket, key, &upload_id);
    Ok(xml_response(xml))
}

/// `PUT /{bucket}/{key}?partNumber={n}&uploadId={id}` -- Upload a single part.
#[utoipa::path(
    put,
    path = "/{bucket}/{key}?partNumber&uploadId",
    tag = "Multipart",
    operation_id = "UploadPart",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Object key"),
        ("partNumber" = i32, Query, description = "Part number"),
        ("uploadId" = String, Query, description = "Upload ID"),
    ),
    responses(
        (status = 200, description = "Part uploaded"),
        (status = 404, description = "Upload not found")
    )
)]
pub async fn upload_part(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, StorageError> {
    let upload_id = query.get("uploadId").cloned().unwrap_or_default();
    let part_number: i32 = query
        .get("partNumber")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let expected_md5 = content_md5_hex(headers)?;

    let mut reader = body;
    let etag = state
        .objects
        .put_object_part(
            bucket,
            key,
            &upload_id,
            part_number,
            body.len() as i64,
            &mut reader,
            &expected_md5,
        )
        .await?;

    metrics::counter!(crate::metrics::S3_OPERATIONS_TOTAL, "operation" => "UploadPart")
        .increment(1);

    let mut response = StatusCode::OK.into_response();
    response.headers_mut().insert(
        "etag",
        HeaderValue::from_str(&format!("\"{etag}\"")).expect("hex etag is a valid header"),
    );
    Ok(response)
}

/// `POST /{bucket}/{key}?uploadId={id}` -- Complete a multipart upload.
#[utoipa::path(
    post,
    path = "/{bucket}/{key}?uploadId",
    tag = "Multipart",
    operation_id = "CompleteMultipartUpload",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Object key"),
        ("uploadId" = String, Query, description = "Upload ID"),
    ),
    responses(
        (status = 200, description = "Multipart upload completed"),
        (status = 400, description = "Invalid part or malformed XML"),
        (status = 404, description = "Upload not found")
    )
)]
pub async fn complete_multipart_upload(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
    query: &HashMap<String, String>,
    body: &[u8],
) -> Result<Response, StorageError> {
    let upload_id = query.get("uploadId").cloned().unwrap_or_default();

    let parts: Vec<CompletedPart> = crate::xml::parse_complete_multipart_upload(body)?
        .into_iter()
        .map(|(part_number, etag)| CompletedPart { part_number, etag })
        .collect();

    let etag = state
        .objects
        .complete_multipart_upload(bucket, key, &upload_id, parts)
        .await?;

    metrics::counter!(crate::metrics::S3_OPERATIONS_TOTAL, "operation" => "CompleteMultipartUpload")
        .increment(1);

    let location = format!("/{bucket}/{key}");
    let xml = crate::xml::render_complete_multipart_upload_result(
        &location,
        bucket,
        key,
        &format!("\"{etag}\""),
    );
    Ok(xml_response(xml))
}

/// `DELETE /{bucket}/{key}?uploadId={id}` -- Abort a multipart upload.
#[utoipa::path(
    delete,
    path = "/{bucket}/{key}?uploadId",
    tag = "Multipart",
    operation_id = "AbortMultipartUpload",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Object key"),
        ("uploadId" = String, Query, description = "Upload ID"),
    ),
    responses(
        (status = 204, description = "Multipart upload aborted"),
        (status = 404, description = "Upload not found")
    )
)]
pub async fn abort_multipart_upload(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
    query: &HashMap<String, String>,
) -> Result<Response, StorageError> {
    let upload_id = query.get("uploadId").cloned().unwrap_or_default();

    state
        .objects
        .abort_multipart_upload(bucket, key, &upload_id)
        .await?;

    metrics::counter!(crate::metrics::S3_OPERATIONS_TOTAL, "operation" => "AbortMultipartUpload")
        .increment(1);

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `GET /{bucket}?uploads` -- List in-progress multipart uploads.
#[utoipa::path(
    get,
    path = "/{bucket}?uploads",
    tag = "Multipart",
    operation_id = "ListMultipartUploads",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 200, description = "Multipart uploads list"),
        (status = 404, description = "Bucket not found")
    )
)]
pub async fn list_multipart_uploads(
    state: Arc<AppState>,
    bucket: &str,
    query: &HashMap<String, String>,
) -> Result<Response, StorageError> {
    let prefix = query.get("prefix").map(String::as_str).unwrap_or("");
    let key_marker = query.get("key-marker").map(String::as_str).unwrap_or("");
    let upload_id_marker = query
        .get("upload-id-marker")
        .map(String::as_str)
        .unwrap_or("");
    let delimiter = query.get("delimiter").map(String::as_str).unwrap_or("");
    let max_uploads: i32 = query
        .get("max-uploads")
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    let info = state
        .objects
        .list_multipart_uploads(
            bucket,
            prefix,
            key_marker,
            upload_id_marker,
            delimiter,
            max_uploads,
        )
        .await?;

    metrics::counter!(crate::metrics::S3_OPERATIONS_TOTAL, "operation" => "ListMultipartUploads")
        .increment(1);

    let xml = crate::xml::render_list_multipart_uploads_result(bucket, &info);
    Ok(xml_response(xml))
}

/// `GET /{bucket}/{key}?uploadId={id}` -- List parts of an in-progress upload.
#[utoipa::path(
    get,
    path = "/{bucket}/{key}?uploadId",
    tag = "Multipart",
    operation_id = "ListParts",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Object key"),
        ("uploadId" = String, Query, description = "Upload ID"),
    ),
    responses(
        (status = 200, description = "Parts list"),
        (status = 404, description = "Upload not found")
    )
)]
pub async fn list_parts(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
    query: &HashMap<String, String>,
) -> Result<Response, StorageError> {
    let upload_id = query.get("uploadId").cloned().unwrap_or_default();
    let part_number_marker: i32 = query
        .get("part-number-marker")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let max_parts: i32 = query
        .get("max-parts")
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    let info = state
        .objects
        .list_object_parts(bucket, key, &upload_id, part_number_marker, max_parts)
        .await?;

    metrics::counter!(crate::metrics::S3_OPERATIONS_TOTAL, "operation" => "ListParts")
        .increment(1);

    let xml = crate::xml::render_list_parts_result(&info);
    Ok(xml_response(xml))
}

// -- Unit tests ---------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_user_metadata() {
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-meta-author", HeaderValue::from_static("tester"));
        headers.insert("x-amz-meta-version", HeaderValue::from_static("1.0"));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));

        let meta = extract_user_metadata(&headers);
        assert_eq!(meta.len(), 2);
        assert_eq!(meta.get("x-amz-meta-author").unwrap(), "tester");
    }

    #[test]
    fn test_content_md5_hex_roundtrip() {
        let mut headers = HeaderMap::new();
        // base64 of the raw MD5 of "abcd".
        let raw = hex::decode("e2fc714c4727ee9395f324cd2e7f331f").unwrap();
        let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, raw);
        headers.insert("content-md5", HeaderValue::from_str(&encoded).unwrap());

        assert_eq!(
            content_md5_hex(&headers).unwrap(),
            "e2fc714c4727ee9395f324cd2e7f331f"
        );
    }

    #[test]
    fn test_content_md5_hex_absent_and_invalid() {
        assert_eq!(content_md5_hex(&HeaderMap::new()).unwrap(), "");

        let mut headers = HeaderMap::new();
        headers.insert("content-md5", HeaderValue::from_static("!!not-base64!!"));
        assert!(content_md5_hex(&headers).is_err());

        let mut headers = HeaderMap::new();
        // Valid base64, wrong length for an MD5 digest.
        headers.insert("content-md5", HeaderValue::from_static("YWJjZA=="));
        assert!(content_md5_hex(&headers).is_err());
    }
}
