//! SessionBuffer — per-session chunk accumulation.
//!
//! Sessions are keyed by [`SessionId`] and removed the moment they are
//! finalized, so each session can be drained at most once. Nothing bounds
//! how much a session may hold; abandoned sessions are only reclaimed by
//! [`SessionBuffer::sweep_expired`].

use crate::models::upload_session::{FinalizedUpload, SessionId, UploadSession};
use bytes::{Bytes, BytesMut};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Upload not initialized")]
    NotInitialized,
    #[error("Upload contains no data")]
    EmptyUpload,
}

#[derive(Clone, Default)]
pub struct SessionBuffer {
    sessions: Arc<Mutex<HashMap<SessionId, UploadSession>>>,
}

impl SessionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a session half-written,
    // so a poisoned map is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, UploadSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open an empty session ahead of its first chunk. Transports that
    /// know an upload has started before any bytes arrive use this so an
    /// empty file is reported as empty rather than as never started.
    pub fn begin(&self, session_id: SessionId, filename: Option<&str>) {
        let filename = filename.filter(|f| !f.is_empty()).map(str::to_string);
        self.lock()
            .entry(session_id)
            .or_insert_with(|| UploadSession::new(filename));
    }

    /// Append `chunk` to the session, creating it on first use. The first
    /// non-empty filename seen becomes the session's declared filename.
    pub fn append_chunk(&self, session_id: SessionId, filename: Option<&str>, chunk: Bytes) {
        let filename = filename.filter(|f| !f.is_empty());
        let mut sessions = self.lock();
        let session = sessions
            .entry(session_id)
            .or_insert_with(|| UploadSession::new(filename.map(str::to_string)));
        if session.declared_filename.is_none() {
            session.declared_filename = filename.map(str::to_string);
        }
        session.chunks.push(chunk);
        session.last_activity = Instant::now();
    }

    /// Drain the session into one contiguous payload.
    ///
    /// A filename given here takes precedence over the one declared with
    /// the chunks. The session entry is removed even when it turns out to
    /// be empty.
    pub fn finalize(
        &self,
        session_id: SessionId,
        filename: Option<String>,
    ) -> Result<FinalizedUpload, SessionError> {
        let session = self
            .lock()
            .remove(&session_id)
            .ok_or(SessionError::NotInitialized)?;

        if session.chunks.is_empty() {
            return Err(SessionError::EmptyUpload);
        }

        let mut payload = BytesMut::with_capacity(session.total_bytes());
        for chunk in &session.chunks {
            payload.extend_from_slice(chunk);
        }

        Ok(FinalizedUpload {
            filename: filename
                .filter(|f| !f.is_empty())
                .or(session.declared_filename),
            payload: payload.freeze(),
        })
    }

    /// Drop a session without uploading it. Returns whether it existed.
    pub fn discard(&self, session_id: SessionId) -> bool {
        self.lock().remove(&session_id).is_some()
    }

    /// Remove sessions idle for longer than `ttl`, returning how many.
    pub fn sweep_expired(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| now.duration_since(s.last_activity) <= ttl);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}
