use std::sync::Arc;
use crate::adapters::http::upload::UploadPolicy;
use crate::application::services::DetectionService;

/// Shared state for the axum handlers: the use cases plus upload limits.
/// Built once at startup and injected; no handler reaches for a global.
#[derive(Clone)]
pub struct HttpState {
    /// Detection use case, holding the detector loaded at startup.
    pub detection: Arc<DetectionService>,
    pub upload: Arc<UploadPolicy>,
}
