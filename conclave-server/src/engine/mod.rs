mod local_engine;

pub use local_engine::*;

use crate::config::RouterConfig;
use async_trait::async_trait;
use conclave_core::{
    ConsumerId, Direction, DtlsParameters, MediaKind, ProducerId, RtpCapabilities, RtpParameters,
    TransportId, TransportParams,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("media engine is not reachable")]
    Unavailable,

    #[error("router is closed")]
    RouterClosed,

    #[error("transport {0} is closed")]
    TransportClosed(TransportId),

    #[error("operation not allowed on a {0} transport")]
    WrongDirection(Direction),

    #[error("transport {0} is already connected")]
    AlreadyConnected(TransportId),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("codec {0} is not supported by the router")]
    UnsupportedCodec(String),

    #[error("unknown producer {0}")]
    UnknownProducer(ProducerId),

    #[error("unknown consumer {0}")]
    UnknownConsumer(ConsumerId),
}

/// Consumer as handed back by the engine. Always starts paused.
#[derive(Debug, Clone)]
pub struct EngineConsumer {
    pub id: ConsumerId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

/// Entry point into the media engine: one router per room.
#[async_trait]
pub trait SfuEngine: Send + Sync + 'static {
    async fn create_router(&self, config: &RouterConfig)
    -> Result<Arc<dyn SfuRouter>, EngineError>;
}

#[async_trait]
pub trait SfuRouter: Send + Sync + 'static {
    fn rtp_capabilities(&self) -> RtpCapabilities;

    async fn create_transport(
        &self,
        direction: Direction,
    ) -> Result<Arc<dyn SfuTransport>, EngineError>;

    /// Whether a consumer with `capabilities` could receive `producer_id`.
    async fn can_consume(&self, producer_id: &ProducerId, capabilities: &RtpCapabilities) -> bool;

    async fn close(&self);
}

#[async_trait]
pub trait SfuTransport: Send + Sync + 'static {
    fn params(&self) -> &TransportParams;

    fn id(&self) -> &TransportId {
        &self.params().id
    }

    async fn connect(&self, dtls_parameters: DtlsParameters) -> Result<(), EngineError>;

    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId, EngineError>;

    async fn consume(
        &self,
        producer_id: &ProducerId,
        capabilities: &RtpCapabilities,
    ) -> Result<EngineConsumer, EngineError>;

    async fn resume_consumer(&self, consumer_id: &ConsumerId) -> Result<(), EngineError>;

    async fn close_producer(&self, producer_id: &ProducerId);

    async fn close_consumer(&self, consumer_id: &ConsumerId);

    /// Closes the transport together with every producer and consumer on it.
    async fn close(&self);
}
