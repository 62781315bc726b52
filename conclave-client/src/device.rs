use crate::error::ClientError;
use async_trait::async_trait;
use conclave_core::{
    ConsumerDescriptor, ConsumerId, Direction, DtlsFingerprint, DtlsParameters, DtlsRole,
    MediaKind, ProducerId, RtpCapabilities, RtpCodecParameters, RtpEncoding, RtpParameters,
    TransportParams,
};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// A track captured locally and offered to the room.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalTrack {
    pub kind: MediaKind,
    pub label: String,
}

impl LocalTrack {
    pub fn new(kind: MediaKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
        }
    }
}

/// A track received through a consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTrack {
    pub consumer_id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

/// The peer's media stack: whatever turns negotiated parameters into
/// capture and playback.
#[async_trait]
pub trait MediaDevice: Send + Sync {
    /// Prepares the device for a router's codecs. Called once per join.
    async fn load(&self, router_capabilities: &RtpCapabilities) -> Result<(), ClientError>;

    /// What this device can receive, sent along with every `consume`.
    fn rtp_capabilities(&self) -> RtpCapabilities;

    /// Builds the local end of a transport and returns the DTLS parameters
    /// the server needs to connect it.
    async fn open_transport(
        &self,
        direction: Direction,
        params: &TransportParams,
    ) -> Result<DtlsParameters, ClientError>;

    /// Encoding parameters for sending `track`.
    async fn produce(&self, track: &LocalTrack) -> Result<RtpParameters, ClientError>;

    async fn consume(&self, consumer: &ConsumerDescriptor) -> Result<RemoteTrack, ClientError>;
}

/// A device without real capture or playback. It negotiates like a browser
/// would: it receives whatever the router offers and sends the router's
/// preferred codec for each kind.
#[derive(Default)]
pub struct SimulatedDevice {
    capabilities: Mutex<Option<RtpCapabilities>>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn loaded(&self) -> MutexGuard<'_, Option<RtpCapabilities>> {
        self.capabilities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MediaDevice for SimulatedDevice {
    async fn load(&self, router_capabilities: &RtpCapabilities) -> Result<(), ClientError> {
        if router_capabilities.codecs.is_empty() {
            return Err(ClientError::Device("router offers no codec".to_owned()));
        }
        *self.loaded() = Some(router_capabilities.clone());
        Ok(())
    }

    fn rtp_capabilities(&self) -> RtpCapabilities {
        self.loaded().clone().unwrap_or_default()
    }

    async fn open_transport(
        &self,
        _direction: Direction,
        params: &TransportParams,
    ) -> Result<DtlsParameters, ClientError> {
        if params.dtls_parameters.fingerprints.is_empty() {
            return Err(ClientError::Device(format!(
                "transport {} has no DTLS fingerprint",
                params.id
            )));
        }
        Ok(DtlsParameters {
            role: DtlsRole::Client,
            fingerprints: vec![DtlsFingerprint::random_sha256()],
        })
    }

    async fn produce(&self, track: &LocalTrack) -> Result<RtpParameters, ClientError> {
        let loaded = self.loaded().clone().ok_or_else(|| {
            ClientError::Device("device used before load".to_owned())
        })?;
        let codec = loaded
            .codecs
            .iter()
            .find(|codec| codec.kind == track.kind)
            .ok_or_else(|| ClientError::Device(format!("router has no {} codec", track.kind)))?;

        Ok(RtpParameters {
            mid: None,
            codecs: vec![RtpCodecParameters {
                mime_type: codec.mime_type.clone(),
                payload_type: codec.preferred_payload_type.unwrap_or(96),
                clock_rate: codec.clock_rate,
                channels: codec.channels,
                parameters: codec.parameters.clone(),
            }],
            header_extensions: Vec::new(),
            encodings: vec![RtpEncoding {
                ssrc: Some(Uuid::new_v4().as_u128() as u32),
                rid: None,
            }],
        })
    }

    async fn consume(&self, consumer: &ConsumerDescriptor) -> Result<RemoteTrack, ClientError> {
        if consumer.rtp_parameters.codecs.is_empty() {
            return Err(ClientError::Device(format!(
                "consumer {} carries no codec",
                consumer.id
            )));
        }
        Ok(RemoteTrack {
            consumer_id: consumer.id.clone(),
            producer_id: consumer.producer_id.clone(),
            kind: consumer.kind,
            rtp_parameters: consumer.rtp_parameters.clone(),
        })
    }
}
