use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure categories reported back to the requesting peer.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RoomNotFound,
    PeerNotFound,
    DuplicatePeer,
    TransportNotFound,
    NoSendTransport,
    IncompatibleCapabilities,
    ConsumerNotFound,
    ProducerNotFound,
    EngineUnavailable,
    EngineFailure,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorReply {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorReply {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}
