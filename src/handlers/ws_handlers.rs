//! Streaming upload over a websocket.
//!
//! One connection is one session. Text frames carry [`ClientEvent`] JSON,
//! binary frames are raw chunk appends, and every reply is an
//! `upload_status` frame. Frames on a connection are handled strictly in
//! order, so a completion always sees every chunk sent before it.

use crate::{
    handlers::AppState,
    models::{
        messages::{ClientEvent, StatusFrame, UploadStatus},
        upload_session::SessionId,
    },
    services::upload_coordinator::{StatusSender, UploadCoordinator, UploadStage},
};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// `GET /ws` — upgrade to the streaming upload protocol.
pub async fn upload_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(state.max_upload_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state.coordinator))
}

async fn handle_socket(socket: WebSocket, coordinator: UploadCoordinator) {
    let session_id = SessionId::new();
    debug!("session {}: connection opened", session_id);

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<UploadStatus>();

    let writer = tokio::spawn(async move {
        while let Some(status) = rx.recv().await {
            let text = match serde_json::to_string(&StatusFrame::new(&status)) {
                Ok(text) => text,
                Err(err) => {
                    warn!("failed to encode status frame: {}", err);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut connection = UploadConnection::new(session_id, coordinator, tx);
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => connection.handle_event(event).await,
                Err(err) => connection.reject(format!("invalid event: {}", err)),
            },
            Ok(Message::Binary(data)) => connection.append(None, data),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!("session {}: socket error: {}", session_id, err);
                break;
            }
        }
    }

    debug!(
        "session {}: connection closed while {}",
        session_id,
        connection.stage()
    );
    // Dropping the sender lets the writer drain and exit.
    drop(connection);
    let _ = writer.await;
}

/// Per-connection protocol state, independent of the socket itself.
pub struct UploadConnection {
    session_id: SessionId,
    coordinator: UploadCoordinator,
    tx: StatusSender,
    stage: UploadStage,
}

impl UploadConnection {
    pub fn new(session_id: SessionId, coordinator: UploadCoordinator, tx: StatusSender) -> Self {
        Self {
            session_id,
            coordinator,
            tx,
            stage: UploadStage::Idle,
        }
    }

    pub fn stage(&self) -> UploadStage {
        self.stage
    }

    pub async fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::ChunkAppend { filename, chunk } => {
                self.append(filename.as_deref(), Bytes::from(chunk))
            }
            ClientEvent::Complete { filename } => self.complete(filename).await,
        }
    }

    pub fn append(&mut self, filename: Option<&str>, chunk: Bytes) {
        if self.stage == UploadStage::Idle {
            debug!("session {}: {}", self.session_id, UploadStage::Receiving);
            self.stage = UploadStage::Receiving;
        }
        self.coordinator
            .sessions()
            .append_chunk(self.session_id, filename, chunk);
    }

    async fn complete(&mut self, filename: Option<String>) {
        self.stage = UploadStage::Finalizing;
        let status = match self
            .coordinator
            .complete_session(self.session_id, filename, Some(&self.tx))
            .await
        {
            Ok(outcome) => UploadStatus::Done { url: outcome.url },
            Err(err) => UploadStatus::Error {
                message: err.client_message(),
            },
        };
        let _ = self.tx.send(status);
        // The connection may start another upload.
        self.stage = UploadStage::Idle;
    }

    /// Report a frame that could not be understood. The session, if any,
    /// is left as it was.
    pub fn reject(&self, message: String) {
        debug!("session {}: {}", self.session_id, message);
        let _ = self.tx.send(UploadStatus::error(message));
    }
}
