//! Wire messages exchanged over the streaming (websocket) transport.
//!
//! Inbound frames are validated into [`ClientEvent`] before they reach the
//! session buffer; outbound progress is always an [`UploadStatus`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A validated client frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Append bytes to the connection's session.
    #[serde(rename = "chunk", alias = "start_upload_chunk")]
    ChunkAppend {
        #[serde(default)]
        filename: Option<String>,
        chunk: Vec<u8>,
    },

    /// Finalize the session and run the upload.
    #[serde(rename = "complete", alias = "start_upload_complete")]
    Complete {
        #[serde(default)]
        filename: Option<String>,
    },
}

/// Status pushed back to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum UploadStatus {
    /// The remote upload is about to start.
    Started,
    Error { message: Value },
    Done { url: String },
}

impl UploadStatus {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: Value::String(message.into()),
        }
    }
}

/// Envelope for an outbound status frame.
#[derive(Debug, Serialize)]
pub struct StatusFrame<'a> {
    pub event: &'static str,
    #[serde(flatten)]
    pub status: &'a UploadStatus,
}

impl<'a> StatusFrame<'a> {
    pub fn new(status: &'a UploadStatus) -> Self {
        Self {
            event: "upload_status",
            status,
        }
    }
}
