use conclave_core::ErrorReply;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("signaling channel closed")]
    ChannelClosed,

    /// The server answered the request with an error.
    #[error("request rejected: {0}")]
    Rejected(ErrorReply),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("media device error: {0}")]
    Device(String),

    #[error("not joined to a room")]
    NotJoined,
}

impl ClientError {
    pub(crate) fn unexpected(op: &str, body: impl std::fmt::Debug) -> Self {
        Self::Protocol(format!("unexpected reply to {}: {:?}", op, body))
    }
}
