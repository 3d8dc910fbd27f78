//! Host-supplied context for URL composition.

/// Values the host application passes when asking where a file lives.
///
/// Only consulted when direct bucket access is disabled: the proxied URL is
/// scoped to the host's own file-serving route.
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Mount path of the host application (may be empty).
    pub mount: String,

    /// Application identifier segment of the file route.
    pub application_id: String,
}

impl AppContext {
    pub fn new(mount: impl Into<String>, application_id: impl Into<String>) -> Self {
        Self {
            mount: mount.into(),
            application_id: application_id.into(),
        }
    }
}
