//! TideStore library -- S3-compatible object storage core.
//!
//! This crate provides the multipart-upload state machine and listing
//! engine over a pluggable object layer, and the namespace locking
//! subsystem that serializes concurrent object mutations, plus the thin
//! HTTP surfaces that expose them.

use std::sync::Arc;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod nslock;
pub mod object;
pub mod server;
pub mod validate;
pub mod xml;

use crate::config::Config;
use crate::nslock::NsLockMap;
use crate::object::ObjectLayer;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Object layer (filesystem-backed).
    pub objects: Arc<dyn ObjectLayer>,
    /// Namespace lock map, shared with the object layer.
    pub nslock: Arc<NsLockMap>,
}
