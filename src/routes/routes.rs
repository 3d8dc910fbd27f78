//! Defines routes for the host-facing file contract.
//!
//! ## Structure
//! - **File endpoints** (the host application's file-serving route)
//!   - `PUT    /files/{app_id}/{filename}` — upload file
//!   - `GET    /files/{app_id}/{filename}` — download file (full or ranged)
//!   - `HEAD   /files/{app_id}/{filename}` — retrieve metadata only
//!   - `DELETE /files/{app_id}/{filename}` — delete file
//!
//! Proxied file locations produced by the adapter resolve against these
//! routes; direct-access locations bypass them entirely.

use crate::handlers::{
    AppState,
    file_handlers::{delete_file, get_file, head_file, upload_file},
    health_handlers::{healthz, readyz},
};
use axum::{
    Router,
    routing::{get, put},
};

/// Build and return the router for the file-serving contract.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // file-level routes
        .route(
            "/files/{app_id}/{filename}",
            put(upload_file)
                .get(get_file)
                .head(head_file)
                .delete(delete_file),
        )
}
