use crate::config::{RouterConfig, TransportConfig};
use crate::engine::{EngineConsumer, EngineError, SfuEngine, SfuRouter, SfuTransport};
use async_trait::async_trait;
use conclave_core::{
    ConsumerId, Direction, DtlsFingerprint, DtlsParameters, DtlsRole, IceCandidate,
    IceParameters, IceProtocol, MediaKind, ProducerId, RtpCapabilities, RtpCodecCapability,
    RtpCodecParameters, RtpEncoding, RtpParameters, TransportId, TransportParams,
};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

const FIRST_DYNAMIC_PAYLOAD_TYPE: u8 = 100;
const UDP_PRIORITY: u32 = 1_076_302_079;
const TCP_PRIORITY: u32 = 1_076_276_479;

/// In-process engine. It negotiates nothing on the network and moves no
/// media: it issues ids, ICE credentials, DTLS fingerprints and host
/// candidates, and keeps enough producer bookkeeping to answer
/// `can_consume` the way a real SFU would.
#[derive(Clone)]
pub struct LocalEngine {
    shared: Arc<EngineShared>,
}

struct EngineShared {
    transport: TransportConfig,
    available: AtomicBool,
    port_cursor: AtomicU32,
}

impl LocalEngine {
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                transport,
                available: AtomicBool::new(true),
                port_cursor: AtomicU32::new(0),
            }),
        }
    }

    /// Simulates losing the engine: every later call fails with
    /// [`EngineError::Unavailable`].
    pub fn shut_down(&self) {
        warn!("Local media engine shutting down");
        self.shared.available.store(false, Ordering::Release);
    }

    pub fn is_available(&self) -> bool {
        self.shared.available.load(Ordering::Acquire)
    }
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl EngineShared {
    fn ensure_available(&self) -> Result<(), EngineError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(EngineError::Unavailable)
        }
    }

    fn next_port(&self) -> u16 {
        let min = u32::from(self.transport.rtc_min_port);
        let max = u32::from(self.transport.rtc_max_port).max(min);
        let span = max - min + 1;
        let offset = self.port_cursor.fetch_add(1, Ordering::Relaxed) % span;
        // min + offset <= max, which came from a u16
        u16::try_from(min + offset).unwrap_or(self.transport.rtc_max_port)
    }

    fn transport_params(&self) -> TransportParams {
        let ip = self
            .transport
            .announced_ip
            .clone()
            .unwrap_or_else(|| self.transport.listen_ip.to_string());
        let port = self.next_port();

        let (udp_priority, tcp_priority) = if self.transport.prefer_udp {
            (UDP_PRIORITY, TCP_PRIORITY)
        } else {
            (TCP_PRIORITY, UDP_PRIORITY)
        };

        let mut ice_candidates = Vec::new();
        if self.transport.enable_udp {
            ice_candidates.push(IceCandidate {
                foundation: "udpcandidate".to_owned(),
                priority: udp_priority,
                ip: ip.clone(),
                protocol: IceProtocol::Udp,
                port,
                candidate_type: "host".to_owned(),
                tcp_type: None,
            });
        }
        if self.transport.enable_tcp {
            ice_candidates.push(IceCandidate {
                foundation: "tcpcandidate".to_owned(),
                priority: tcp_priority,
                ip,
                protocol: IceProtocol::Tcp,
                port,
                candidate_type: "host".to_owned(),
                tcp_type: Some("passive".to_owned()),
            });
        }

        let ufrag = Uuid::new_v4().simple().to_string();
        TransportParams {
            id: TransportId::generate(),
            ice_parameters: IceParameters {
                username_fragment: ufrag[..16].to_owned(),
                password: Uuid::new_v4().simple().to_string(),
                ice_lite: true,
            },
            ice_candidates,
            dtls_parameters: DtlsParameters {
                role: DtlsRole::Auto,
                fingerprints: vec![DtlsFingerprint::random_sha256()],
            },
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl SfuEngine for LocalEngine {
    async fn create_router(
        &self,
        config: &RouterConfig,
    ) -> Result<Arc<dyn SfuRouter>, EngineError> {
        self.shared.ensure_available()?;

        let mut next_payload_type = FIRST_DYNAMIC_PAYLOAD_TYPE;
        let codecs = config
            .media_codecs
            .iter()
            .cloned()
            .map(|mut codec: RtpCodecCapability| {
                if codec.preferred_payload_type.is_none() {
                    codec.preferred_payload_type = Some(next_payload_type);
                    next_payload_type = next_payload_type.saturating_add(1);
                }
                codec
            })
            .collect();

        let router = LocalRouter {
            shared: Arc::new(RouterShared {
                id: Uuid::new_v4().to_string(),
                engine: Arc::clone(&self.shared),
                capabilities: RtpCapabilities {
                    codecs,
                    header_extensions: Vec::new(),
                },
                producers: DashMap::new(),
                closed: AtomicBool::new(false),
            }),
        };
        info!(router_id = %router.shared.id, "Router created");

        Ok(Arc::new(router))
    }
}

struct ProducerRecord {
    kind: MediaKind,
    codecs: Vec<RtpCodecParameters>,
}

struct RouterShared {
    id: String,
    engine: Arc<EngineShared>,
    capabilities: RtpCapabilities,
    producers: DashMap<ProducerId, ProducerRecord>,
    closed: AtomicBool,
}

impl RouterShared {
    fn ensure_open(&self) -> Result<(), EngineError> {
        self.engine.ensure_available()?;
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::RouterClosed);
        }
        Ok(())
    }
}

pub struct LocalRouter {
    shared: Arc<RouterShared>,
}

#[async_trait]
impl SfuRouter for LocalRouter {
    fn rtp_capabilities(&self) -> RtpCapabilities {
        self.shared.capabilities.clone()
    }

    async fn create_transport(
        &self,
        direction: Direction,
    ) -> Result<Arc<dyn SfuTransport>, EngineError> {
        self.shared.ensure_open()?;

        let params = self.shared.engine.transport_params();
        debug!(
            router_id = %self.shared.id,
            transport_id = %params.id,
            %direction,
            "Transport created"
        );

        Ok(Arc::new(LocalTransport {
            params,
            direction,
            router: Arc::clone(&self.shared),
            state: Mutex::new(TransportState::default()),
        }))
    }

    async fn can_consume(&self, producer_id: &ProducerId, capabilities: &RtpCapabilities) -> bool {
        let Some(producer) = self.shared.producers.get(producer_id) else {
            return false;
        };
        producer.codecs.iter().any(|codec| capabilities.supports(codec))
    }

    async fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.producers.clear();
        info!(router_id = %self.shared.id, "Router closed");
    }
}

#[derive(Default)]
struct TransportState {
    connected: bool,
    closed: bool,
    producers: HashSet<ProducerId>,
    consumers: HashMap<ConsumerId, ConsumerRecord>,
    next_mid: u32,
}

struct ConsumerRecord {
    paused: bool,
}

pub struct LocalTransport {
    params: TransportParams,
    direction: Direction,
    router: Arc<RouterShared>,
    state: Mutex<TransportState>,
}

impl LocalTransport {
    fn usable(&self, state: &TransportState) -> Result<(), EngineError> {
        self.router.ensure_open()?;
        if state.closed {
            return Err(EngineError::TransportClosed(self.params.id.clone()));
        }
        Ok(())
    }

    fn require_direction(&self, direction: Direction) -> Result<(), EngineError> {
        if self.direction == direction {
            Ok(())
        } else {
            Err(EngineError::WrongDirection(self.direction))
        }
    }
}

#[async_trait]
impl SfuTransport for LocalTransport {
    fn params(&self) -> &TransportParams {
        &self.params
    }

    async fn connect(&self, dtls_parameters: DtlsParameters) -> Result<(), EngineError> {
        let mut state = lock(&self.state);
        self.usable(&state)?;

        if state.connected {
            return Err(EngineError::AlreadyConnected(self.params.id.clone()));
        }
        if dtls_parameters.fingerprints.is_empty() {
            return Err(EngineError::InvalidParameters(
                "DTLS parameters carry no fingerprint".to_owned(),
            ));
        }

        state.connected = true;
        Ok(())
    }

    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId, EngineError> {
        self.require_direction(Direction::Send)?;
        let mut state = lock(&self.state);
        self.usable(&state)?;

        if rtp_parameters.codecs.is_empty() {
            return Err(EngineError::InvalidParameters(
                "RTP parameters carry no codec".to_owned(),
            ));
        }
        for codec in &rtp_parameters.codecs {
            if MediaKind::from_mime(&codec.mime_type) != Some(kind) {
                return Err(EngineError::InvalidParameters(format!(
                    "codec {} does not match kind {}",
                    codec.mime_type, kind
                )));
            }
            if !self.router.capabilities.supports(codec) {
                return Err(EngineError::UnsupportedCodec(codec.mime_type.clone()));
            }
        }

        let id = ProducerId::generate();
        state.producers.insert(id.clone());
        self.router.producers.insert(
            id.clone(),
            ProducerRecord {
                kind,
                codecs: rtp_parameters.codecs,
            },
        );

        Ok(id)
    }

    async fn consume(
        &self,
        producer_id: &ProducerId,
        capabilities: &RtpCapabilities,
    ) -> Result<EngineConsumer, EngineError> {
        self.require_direction(Direction::Recv)?;
        let mut state = lock(&self.state);
        self.usable(&state)?;

        let (kind, codecs) = {
            let producer = self
                .router
                .producers
                .get(producer_id)
                .ok_or_else(|| EngineError::UnknownProducer(producer_id.clone()))?;
            let codecs: Vec<RtpCodecParameters> = producer
                .codecs
                .iter()
                .filter(|codec| capabilities.supports(codec))
                .cloned()
                .collect();
            (producer.kind, codecs)
        };

        let Some(first) = codecs.first() else {
            return Err(EngineError::UnsupportedCodec(format!(
                "no codec of producer {} is acceptable",
                producer_id
            )));
        };
        debug!(producer_id = %producer_id, codec = %first.mime_type, "Consumer codec selected");

        let mid = state.next_mid;
        state.next_mid += 1;

        let ssrc = Uuid::new_v4().as_u128() as u32;
        let id = ConsumerId::generate();
        state
            .consumers
            .insert(id.clone(), ConsumerRecord { paused: true });

        Ok(EngineConsumer {
            id,
            kind,
            rtp_parameters: RtpParameters {
                mid: Some(mid.to_string()),
                codecs,
                header_extensions: Vec::new(),
                encodings: vec![RtpEncoding {
                    ssrc: Some(ssrc),
                    rid: None,
                }],
            },
        })
    }

    async fn resume_consumer(&self, consumer_id: &ConsumerId) -> Result<(), EngineError> {
        let mut state = lock(&self.state);
        self.usable(&state)?;

        let consumer = state
            .consumers
            .get_mut(consumer_id)
            .ok_or_else(|| EngineError::UnknownConsumer(consumer_id.clone()))?;
        consumer.paused = false;
        Ok(())
    }

    async fn close_producer(&self, producer_id: &ProducerId) {
        lock(&self.state).producers.remove(producer_id);
        self.router.producers.remove(producer_id);
    }

    async fn close_consumer(&self, consumer_id: &ConsumerId) {
        lock(&self.state).consumers.remove(consumer_id);
    }

    async fn close(&self) {
        let producers = {
            let mut state = lock(&self.state);
            state.closed = true;
            state.consumers.clear();
            std::mem::take(&mut state.producers)
        };
        for producer_id in producers {
            self.router.producers.remove(&producer_id);
        }
    }
}
