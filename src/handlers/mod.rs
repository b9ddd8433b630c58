//! HTTP and websocket handlers.

use crate::services::upload_coordinator::UploadCoordinator;

pub mod health_handlers;
pub mod upload_handlers;
pub mod ws_handlers;

/// Shared router state.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: UploadCoordinator,
    /// Largest accepted request body or websocket message.
    pub max_upload_bytes: usize,
}
