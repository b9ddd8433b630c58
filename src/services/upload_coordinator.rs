//! UploadCoordinator — drives one upload from a finalized session to a
//! recorded, publicly reachable object.
//!
//! ```text
//! Idle -> Receiving -> Finalizing -> Allocating -> Uploading -> Recording -> Done
//!                          \______________\______________\___________\----> Failed
//! ```
//!
//! Every failure is terminal and reported once. Nothing is retried, and an
//! object that reached the remote store but could not be recorded stays
//! where it is.

use crate::{
    config::UploadConfig,
    models::{
        messages::UploadStatus,
        upload_record::NewUploadRecord,
        upload_session::{FinalizedUpload, SessionId},
    },
    services::{
        object_store::{ContentPut, ObjectStore, RemoteStoreError},
        record_store::RecordStore,
        repository_allocator::{AllocationError, RepositoryAllocator},
        session_buffer::{SessionBuffer, SessionError},
    },
};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use std::{fmt, sync::Arc};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Channel for asynchronous progress, present only on streaming transports.
pub type StatusSender = mpsc::UnboundedSender<UploadStatus>;

const FALLBACK_FILENAME: &str = "unnamed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Idle,
    Receiving,
    Finalizing,
    Allocating,
    Uploading,
    Recording,
    Done,
    Failed,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload not initialized")]
    NotInitialized,
    #[error("Upload contains no data")]
    EmptyUpload,
    #[error("metadata store unavailable: {0}")]
    StorageUnavailable(sqlx::Error),
    #[error("repository rotation state is missing")]
    RotationStateMissing,
    #[error(transparent)]
    RemoteUploadFailed(#[from] RemoteStoreError),
    #[error("uploaded to {url} but recording it failed: {source}")]
    RecordWriteFailed { url: String, source: sqlx::Error },
}

impl From<SessionError> for UploadError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotInitialized => Self::NotInitialized,
            SessionError::EmptyUpload => Self::EmptyUpload,
        }
    }
}

impl From<AllocationError> for UploadError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::StorageUnavailable(e) => Self::StorageUnavailable(e),
            AllocationError::RotationStateMissing => Self::RotationStateMissing,
        }
    }
}

impl UploadError {
    /// The state the upload was in when it failed.
    pub fn stage(&self) -> UploadStage {
        match self {
            Self::NotInitialized | Self::EmptyUpload => UploadStage::Finalizing,
            Self::StorageUnavailable(_) | Self::RotationStateMissing => UploadStage::Allocating,
            Self::RemoteUploadFailed(_) => UploadStage::Uploading,
            Self::RecordWriteFailed { .. } => UploadStage::Recording,
        }
    }

    /// Message surfaced to the client; the remote API's own body when it
    /// sent one.
    pub fn client_message(&self) -> Value {
        match self {
            Self::RemoteUploadFailed(err) => err.client_detail(),
            other => Value::String(other.to_string()),
        }
    }
}

/// Successful end state of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub url: String,
    pub repository: String,
    /// Timestamped object name, as recorded.
    pub filename: String,
}

#[derive(Clone)]
pub struct UploadCoordinator {
    sessions: SessionBuffer,
    allocator: RepositoryAllocator,
    records: RecordStore,
    store: Arc<dyn ObjectStore>,
    branch: String,
}

impl UploadCoordinator {
    pub fn new(
        cfg: &UploadConfig,
        db: Arc<SqlitePool>,
        sessions: SessionBuffer,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            sessions,
            allocator: RepositoryAllocator::new(db.clone(), cfg.repositories.clone()),
            records: RecordStore::new(db),
            store,
            branch: cfg.branch.clone(),
        }
    }

    pub fn sessions(&self) -> &SessionBuffer {
        &self.sessions
    }

    pub fn allocator(&self) -> &RepositoryAllocator {
        &self.allocator
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Finalize `session_id` and run the rest of the pipeline on it.
    pub async fn complete_session(
        &self,
        session_id: SessionId,
        filename: Option<String>,
        progress: Option<&StatusSender>,
    ) -> Result<UploadOutcome, UploadError> {
        debug!("session {}: {}", session_id, UploadStage::Finalizing);
        let upload = match self.sessions.finalize(session_id, filename) {
            Ok(upload) => upload,
            Err(err) => {
                let err = UploadError::from(err);
                warn!(
                    "session {}: {} in {}: {}",
                    session_id,
                    UploadStage::Failed,
                    err.stage(),
                    err
                );
                return Err(err);
            }
        };
        self.upload_payload(session_id, upload, progress).await
    }

    /// Allocate, upload, and record an already finalized payload.
    pub async fn upload_payload(
        &self,
        session_id: SessionId,
        upload: FinalizedUpload,
        progress: Option<&StatusSender>,
    ) -> Result<UploadOutcome, UploadError> {
        match self.run(session_id, upload, progress).await {
            Ok(outcome) => {
                info!(
                    "session {}: {} {} -> {} ({})",
                    session_id,
                    UploadStage::Done,
                    outcome.filename,
                    outcome.url,
                    outcome.repository
                );
                Ok(outcome)
            }
            Err(err @ UploadError::RecordWriteFailed { .. }) => {
                error!("session {}: object left unrecorded: {}", session_id, err);
                Err(err)
            }
            Err(err) => {
                warn!(
                    "session {}: {} in {}: {}",
                    session_id,
                    UploadStage::Failed,
                    err.stage(),
                    err
                );
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        session_id: SessionId,
        upload: FinalizedUpload,
        progress: Option<&StatusSender>,
    ) -> Result<UploadOutcome, UploadError> {
        debug!("session {}: {}", session_id, UploadStage::Allocating);
        let repository = self.allocator.allocate_repository().await?;

        if let Some(tx) = progress {
            // A closed channel only means the client went away.
            let _ = tx.send(UploadStatus::Started);
        }

        debug!(
            "session {}: {} {} bytes to {}",
            session_id,
            UploadStage::Uploading,
            upload.payload.len(),
            repository
        );
        let object = ObjectName::new(
            Utc::now(),
            upload.filename.as_deref().unwrap_or(FALLBACK_FILENAME),
        );
        let request = ContentPut {
            repository: repository.clone(),
            path: object.path.clone(),
            message: format!("Upload {}", object.name),
            content: general_purpose::STANDARD.encode(&upload.payload),
            branch: self.branch.clone(),
        };
        self.store.put_contents(&request).await?;
        let url = self.store.raw_url(&repository, &self.branch, &object.path);

        debug!("session {}: {} {}", session_id, UploadStage::Recording, url);
        let record = NewUploadRecord {
            filename: object.name.clone(),
            url: url.clone(),
            repo: repository.clone(),
        };
        if let Err(source) = self.records.insert(&record).await {
            return Err(UploadError::RecordWriteFailed { url, source });
        }

        Ok(UploadOutcome {
            url,
            repository,
            filename: object.name,
        })
    }
}

/// Destination name and path of an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ObjectName {
    /// `{YYYYmmddHHMMSS}_{filename}`
    name: String,
    /// `uploads/{name}`
    path: String,
}

impl ObjectName {
    fn new(now: DateTime<Utc>, filename: &str) -> Self {
        let base = filename
            .rsplit(['/', '\\'])
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .unwrap_or(FALLBACK_FILENAME);
        let name = format!("{}_{}", now.format("%Y%m%d%H%M%S"), base);
        let path = format!("uploads/{}", name);
        Self { name, path }
    }
}
