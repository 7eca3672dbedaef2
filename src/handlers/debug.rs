//! Operator debug handlers for the namespace lock map.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::errors::StorageError;
use crate::AppState;

/// `GET /tidestore/debug/locks` -- Return the lock state of the entire
/// system: total locks held, total calls blocked on locks, and the state
/// of every lock per (bucket, object) pair.
pub async fn lock_state(state: Arc<AppState>) -> Result<Response, StorageError> {
    Ok(Json(state.nslock.snapshot()).into_response())
}

/// `DELETE /tidestore/debug/locks?bucket=...&object=...` -- Operator
/// override: drop the lock entry for (bucket, object) irrespective of its
/// ref count.
pub async fn force_unlock(
    state: Arc<AppState>,
    query: &HashMap<String, String>,
) -> Result<Response, StorageError> {
    let bucket = query.get("bucket").map(String::as_str).unwrap_or("");
    let object = query.get("object").map(String::as_str).unwrap_or("");
    state.nslock.force_unlock(bucket, object);
    Ok(StatusCode::NO_CONTENT.into_response())
}
