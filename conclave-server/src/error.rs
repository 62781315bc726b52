use crate::engine::EngineError;
use conclave_core::{
    ConsumerId, Direction, ErrorKind, ErrorReply, PeerId, ProducerId, RoomId,
};
use thiserror::Error;

/// Per-request failure. None of these is fatal: the requesting peer gets an
/// error reply and everyone else carries on.
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    #[error("peer {0} not found")]
    PeerNotFound(PeerId),

    #[error("peer {0} is already in the room")]
    DuplicatePeer(PeerId),

    #[error("peer has no {0} transport")]
    TransportNotFound(Direction),

    #[error("peer has no send transport")]
    NoSendTransport,

    #[error("capabilities do not allow consuming producer {0}")]
    IncompatibleCapabilities(ProducerId),

    #[error("consumer {0} not found")]
    ConsumerNotFound(ConsumerId),

    #[error("producer {0} not found")]
    ProducerNotFound(ProducerId),

    #[error("media engine unavailable, new rooms are refused")]
    EngineUnavailable,

    #[error("media engine failure: {0}")]
    Engine(EngineError),
}

impl From<EngineError> for SignalingError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Unavailable => Self::EngineUnavailable,
            other => Self::Engine(other),
        }
    }
}

impl SignalingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RoomNotFound(_) => ErrorKind::RoomNotFound,
            Self::PeerNotFound(_) => ErrorKind::PeerNotFound,
            Self::DuplicatePeer(_) => ErrorKind::DuplicatePeer,
            Self::TransportNotFound(_) => ErrorKind::TransportNotFound,
            Self::NoSendTransport => ErrorKind::NoSendTransport,
            Self::IncompatibleCapabilities(_) => ErrorKind::IncompatibleCapabilities,
            Self::ConsumerNotFound(_) => ErrorKind::ConsumerNotFound,
            Self::ProducerNotFound(_) => ErrorKind::ProducerNotFound,
            Self::EngineUnavailable => ErrorKind::EngineUnavailable,
            Self::Engine(_) => ErrorKind::EngineFailure,
        }
    }
}

impl From<SignalingError> for ErrorReply {
    fn from(e: SignalingError) -> Self {
        ErrorReply::new(e.kind(), e.to_string())
    }
}
