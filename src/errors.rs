use crate::services::upload_coordinator::UploadError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Structured payload shown to the client instead of `message`.
    pub detail: Option<Value>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error = self.detail.unwrap_or(Value::String(self.message));
        let body = Json(json!({
            "error": error,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        let status = match &err {
            UploadError::NotInitialized | UploadError::EmptyUpload => StatusCode::BAD_REQUEST,
            UploadError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            UploadError::RotationStateMissing | UploadError::RecordWriteFailed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            UploadError::RemoteUploadFailed(_) => StatusCode::BAD_GATEWAY,
        };
        let detail = err.client_message();
        AppError::new(status, err.to_string()).with_detail(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::object_store::{RemoteErrorBody, RemoteStoreError};

    async fn body_json(err: AppError) -> (StatusCode, Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn protocol_misuse_is_bad_request() {
        let (status, body) = body_json(UploadError::EmptyUpload.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Upload contains no data", "status": 400}));
    }

    #[tokio::test]
    async fn remote_failure_surfaces_remote_body() {
        let err = UploadError::RemoteUploadFailed(RemoteStoreError::Rejected {
            status: 422,
            body: RemoteErrorBody::Structured(json!({"message": "Invalid request"})),
        });
        let (status, body) = body_json(err.into()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], json!({"message": "Invalid request"}));
    }
}
