//! Axum router construction and S3 route mapping.
//!
//! The [`app`] function wires every exposed endpoint to its handler and
//! returns a ready-to-serve [`axum::Router`].
//!
//! S3 distinguishes operations by query parameters, not just path+method.
//! For example, `GET /:bucket` could be a listing or `?uploads` for
//! ListMultipartUploads.  We use a single handler per method+path that
//! dispatches internally based on query params.  The `tidestore` path
//! segment is reserved for the operator debug channel; static routes take
//! precedence over the `:bucket` capture.

use axum::{
    extract::{DefaultBodyLimit, Path, RawQuery, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::{generate_request_id, StorageError};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the TideStore S3-compatible API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "TideStore S3-Compatible API",
        version = "0.1.0",
        description = "S3-compatible object storage server: multipart core"
    ),
    paths(
        health_check,
        crate::handlers::object::create_bucket,
        crate::handlers::object::put_object,
        crate::handlers::object::get_object,
        crate::handlers::multipart::create_multipart_upload,
        crate::handlers::multipart::upload_part,
        crate::handlers::multipart::complete_multipart_upload,
        crate::handlers::multipart::abort_multipart_upload,
        crate::handlers::multipart::list_multipart_uploads,
        crate::handlers::multipart::list_parts,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Bucket", description = "S3 bucket operations"),
        (name = "Object", description = "S3 object operations"),
        (name = "Multipart", description = "S3 multipart upload operations"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with all routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let openapi = ApiDoc::openapi();

    Router::new()
        // Health check endpoint (not part of S3 API).
        .route("/health", get(health_check))
        // Prometheus metrics endpoint.
        .route("/metrics", get(metrics_handler))
        // Operator debug channel: lock-state snapshot and force unlock.
        .route("/tidestore/debug/locks", get(handle_debug_locks))
        .route("/tidestore/debug/locks", delete(handle_debug_force_unlock))
        // Bucket-level routes.
        .route("/:bucket", put(handle_put_bucket))
        .route("/:bucket", get(handle_get_bucket))
        // Object-level routes (wildcard key captures slashes).
        .route("/:bucket/*key", get(handle_get_object))
        .route("/:bucket/*key", put(handle_put_object))
        .route("/:bucket/*key", post(handle_post_object))
        .route("/:bucket/*key", delete(handle_delete_object))
        // Swagger UI at /docs, OpenAPI spec at /openapi.json.
        .merge(SwaggerUi::new("/docs").url("/openapi.json", openapi))
        // Application state shared across all handlers.
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        // Disable the default 2MB body size limit (parts can be large).
        .layer(DefaultBodyLimit::disable())
}

// -- Common headers middleware -----------------------------------------------

/// Tower middleware that adds common S3 response headers to every response:
/// - `x-amz-request-id`: 16-character uppercase hex string
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `TideStore`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    // Only set x-amz-request-id if not already present (the error
    // renderer sets it).
    if !headers.contains_key("x-amz-request-id") {
        let request_id = generate_request_id();
        headers.insert(
            "x-amz-request-id",
            HeaderValue::from_str(&request_id).expect("hex request id is a valid header"),
        );
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    headers.insert(
        "date",
        HeaderValue::from_str(&date).expect("http date is a valid header"),
    );
    headers.insert("server", HeaderValue::from_static("TideStore"));

    response
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

// -- Query parameter parsing helper ------------------------------------------

/// Parse raw query string into a HashMap.
fn parse_query(raw: Option<String>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(qs) = raw {
        for part in qs.split('&') {
            if let Some((k, v)) = part.split_once('=') {
                let decoded_k = percent_encoding::percent_decode_str(k)
                    .decode_utf8_lossy()
                    .into_owned();
                let decoded_v = percent_encoding::percent_decode_str(v)
                    .decode_utf8_lossy()
                    .into_owned();
                map.insert(decoded_k, decoded_v);
            } else if !part.is_empty() {
                // Query params without value (e.g., `?uploads`).
                let decoded = percent_encoding::percent_decode_str(part)
                    .decode_utf8_lossy()
                    .into_owned();
                map.insert(decoded, String::new());
            }
        }
    }
    map
}

// -- Debug dispatch ----------------------------------------------------------

/// `GET /tidestore/debug/locks` -- lock-state snapshot.
async fn handle_debug_locks(State(state): State<Arc<AppState>>) -> Result<Response, StorageError> {
    crate::handlers::debug::lock_state(state).await
}

/// `DELETE /tidestore/debug/locks?bucket&object` -- force unlock.
async fn handle_debug_force_unlock(
    State(state): State<Arc<AppState>>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, StorageError> {
    let query = parse_query(raw_query);
    crate::handlers::debug::force_unlock(state, &query).await
}

// -- Bucket-level dispatch ---------------------------------------------------

/// `PUT /:bucket` -- CreateBucket
async fn handle_put_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, StorageError> {
    crate::handlers::object::create_bucket(state, &bucket).await
}

/// `GET /:bucket` -- dispatches based on query params:
/// - `?uploads` -> ListMultipartUploads
async fn handle_get_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, StorageError> {
    let query = parse_query(raw_query);

    if query.contains_key("uploads") {
        crate::handlers::multipart::list_multipart_uploads(state, &bucket, &query).await
    } else {
        Err(StorageError::NotImplemented)
    }
}

// -- Object-level dispatch ---------------------------------------------------

/// `GET /:bucket/*key` -- dispatches based on query params:
/// - `?uploadId=...` -> ListParts
/// - default -> GetObject
async fn handle_get_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, StorageError> {
    let query = parse_query(raw_query);

    if query.contains_key("uploadId") {
        crate::handlers::multipart::list_parts(state, &bucket, &key, &query).await
    } else {
        crate::handlers::object::get_object(state, &bucket, &key).await
    }
}

/// `PUT /:bucket/*key` -- dispatches based on query params:
/// - `?partNumber=...&uploadId=...` -> UploadPart
/// - default -> PutObject
async fn handle_put_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, StorageError> {
    let query = parse_query(raw_query);

    if query.contains_key("partNumber") && query.contains_key("uploadId") {
        crate::handlers::multipart::upload_part(state, &bucket, &key, &query, &headers, &body).await
    } else {
        crate::handlers::object::put_object(state, &bucket, &key, &headers, &body).await
    }
}

/// `POST /:bucket/*key` -- dispatches based on query params:
/// - `?uploads` -> CreateMultipartUpload
/// - `?uploadId=...` -> CompleteMultipartUpload
async fn handle_post_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, StorageError> {
    let query = parse_query(raw_query);

    if query.contains_key("uploads") {
        crate::handlers::multipart::create_multipart_upload(state, &bucket, &key, &headers).await
    } else if query.contains_key("uploadId") {
        crate::handlers::multipart::complete_multipart_upload(state, &bucket, &key, &query, &body)
            .await
    } else {
        Err(StorageError::NotImplemented)
    }
}

/// `DELETE /:bucket/*key` -- dispatches based on query params:
/// - `?uploadId=...` -> AbortMultipartUpload
async fn handle_delete_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, StorageError> {
    let query = parse_query(raw_query);

    if query.contains_key("uploadId") {
        crate::handlers::multipart::abort_multipart_upload(state, &bucket, &key, &query).await
    } else {
        Err(StorageError::NotImplemented)
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_pairs_and_flags() {
        let query = parse_query(Some(
            "uploads&max-uploads=10&prefix=photos%2F2016".to_string(),
        ));
        assert_eq!(query.get("uploads").unwrap(), "");
        assert_eq!(query.get("max-uploads").unwrap(), "10");
        assert_eq!(query.get("prefix").unwrap(), "photos/2016");
    }

    #[test]
    fn test_parse_query_empty() {
        assert!(parse_query(None).is_empty());
        assert!(parse_query(Some(String::new())).is_empty());
    }
}
