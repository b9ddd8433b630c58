//! Single-shot HTTP upload and the record listing.
//!
//! The multipart body is streamed part by part into a per-request session,
//! so both transports share the same finalize path.

use crate::{
    errors::AppError,
    handlers::AppState,
    models::{upload_record::UploadRecord, upload_session::SessionId},
    services::session_buffer::SessionBuffer,
};
use axum::{
    Json,
    extract::{
        Query, State,
        multipart::{Multipart, MultipartError},
    },
};
use serde::{Deserialize, Serialize};

/// Name of the multipart field carrying the file.
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ListUploadsQuery {
    pub limit: Option<i64>,
}

/// `POST /upload` — upload one file, respond with its public URL.
///
/// No progress events are emitted; the response is the only outcome.
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let session_id = SessionId::new();
    let sessions = state.coordinator.sessions();

    let filename = match receive_file(sessions, session_id, multipart).await {
        Ok(filename) => filename,
        Err(err) => {
            sessions.discard(session_id);
            return Err(AppError::new(err.status(), err.body_text()));
        }
    };

    let outcome = state
        .coordinator
        .complete_session(session_id, filename, None)
        .await?;

    Ok(Json(UploadResponse { url: outcome.url }))
}

/// Append the `file` part's chunks to the session. Other parts are skipped.
/// Returns the part's filename; the session is left absent if no file part
/// was sent.
async fn receive_file(
    sessions: &SessionBuffer,
    session_id: SessionId,
    mut multipart: Multipart,
) -> Result<Option<String>, MultipartError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        sessions.begin(session_id, filename.as_deref());
        while let Some(chunk) = field.chunk().await? {
            sessions.append_chunk(session_id, filename.as_deref(), chunk);
        }
        return Ok(filename);
    }
    Ok(None)
}

/// `GET /uploads?limit=` — most recent upload records.
pub async fn list_uploads(
    State(state): State<AppState>,
    Query(q): Query<ListUploadsQuery>,
) -> Result<Json<Vec<UploadRecord>>, AppError> {
    let rows = state
        .coordinator
        .records()
        .list_recent(q.limit.unwrap_or(20))
        .await?;
    Ok(Json(rows))
}
