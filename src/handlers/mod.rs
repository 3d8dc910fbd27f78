//! HTTP handlers for the host-facing file route and health probes.

use crate::services::file_adapter::FileAdapter;

pub mod file_handlers;
pub mod health_handlers;

/// Shared router state: the adapter plus the mount path used when composing
/// proxied file locations.
#[derive(Clone)]
pub struct AppState {
    pub adapter: FileAdapter,
    pub mount: String,
}
