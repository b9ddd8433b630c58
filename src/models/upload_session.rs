//! In-memory state for one logical upload while its chunks arrive.

use bytes::Bytes;
use std::{fmt, time::Instant};
use uuid::Uuid;

/// Identity of one upload session: a websocket connection or a single
/// HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Chunks accumulated for one session, in arrival order.
#[derive(Debug)]
pub struct UploadSession {
    /// Filename announced alongside the chunks, if the transport sends one.
    pub declared_filename: Option<String>,

    pub chunks: Vec<Bytes>,

    /// Refreshed on every append; drives the idle sweep.
    pub last_activity: Instant,
}

impl UploadSession {
    pub fn new(declared_filename: Option<String>) -> Self {
        Self {
            declared_filename,
            chunks: Vec::new(),
            last_activity: Instant::now(),
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }
}

/// A drained session: the concatenated payload and the filename that was
/// in effect when it was finalized.
#[derive(Debug, Clone)]
pub struct FinalizedUpload {
    pub filename: Option<String>,
    pub payload: Bytes,
}
