use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;

use conclave_core::{
    ClientMessage, ConnectTransportRequest, ConsumeRequest, ConsumerDescriptor, ConsumerId,
    Direction, ErrorKind, JoinRequest, JoinResponse, MediaKind, Outcome, PeerId, PeerInfo,
    ProduceRequest, ProducerAvailable, ProducerClosed, ProducerId, RequestId, ResponseBody,
    ResumeConsumerRequest, RoomId, RoomScopedRequest, RtpCapabilities, RtpParameters,
    ServerMessage, SignalRequest, TransportParams,
};
use conclave_server::{PeerSession, SignalingService};

use super::signal_helpers::client_dtls;

/// A peer driving the signaling service the way a socket reader would,
/// without the socket.
pub struct TestPeer {
    pub peer_id: PeerId,
    service: SignalingService,
    session: PeerSession,
    rx: mpsc::UnboundedReceiver<ServerMessage>,
    next_id: RequestId,
    received: Vec<ServerMessage>,
}

impl TestPeer {
    pub async fn connect(service: &SignalingService) -> Result<Self> {
        let peer_id = PeerId::new();
        let (session, mut rx) = service.connect(peer_id.clone()).await;

        match rx.try_recv() {
            Ok(ServerMessage::Welcome(welcome)) if welcome.peer_id == peer_id => {}
            other => bail!("expected welcome for {}, got {:?}", peer_id, other),
        }

        Ok(Self {
            peer_id,
            service: service.clone(),
            session,
            rx,
            next_id: RequestId(1),
            received: Vec::new(),
        })
    }

    pub fn session(&self) -> &PeerSession {
        &self.session
    }

    fn pump(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            self.received.push(message);
        }
    }

    /// Feeds a raw text frame, exactly as read from a socket.
    pub async fn send_text(&mut self, text: &str) {
        self.service.handle_text(&mut self.session, text).await;
        self.pump();
    }

    pub async fn request(&mut self, request: SignalRequest) -> Result<Outcome> {
        let id = self.next_id;
        self.next_id = id.next();

        let text = serde_json::to_string(&ClientMessage { id, request })
            .context("Failed to encode request")?;
        self.send_text(&text).await;

        self.received
            .iter()
            .rev()
            .find_map(|message| match message {
                ServerMessage::Ack(ack) if ack.id == id => Some(ack.outcome.clone()),
                _ => None,
            })
            .with_context(|| format!("no ack for request {}", id))
    }

    pub async fn call(&mut self, request: SignalRequest) -> Result<ResponseBody> {
        match self.request(request).await? {
            Outcome::Ok(body) => Ok(body),
            Outcome::Error(e) => bail!("request rejected: {}", e),
        }
    }

    /// Sends a request that is expected to fail and returns the error kind.
    pub async fn reject(&mut self, request: SignalRequest) -> Result<ErrorKind> {
        match self.request(request).await? {
            Outcome::Error(e) => Ok(e.kind),
            Outcome::Ok(body) => bail!("request unexpectedly succeeded: {:?}", body),
        }
    }

    /// Everything received so far, acks included, in arrival order.
    pub fn received(&mut self) -> &[ServerMessage] {
        self.pump();
        &self.received
    }

    /// Room notifications only.
    pub fn notifications(&mut self) -> Vec<ServerMessage> {
        self.received()
            .iter()
            .filter(|m| !matches!(m, ServerMessage::Ack(_) | ServerMessage::Welcome(_)))
            .cloned()
            .collect()
    }

    pub fn announcements(&mut self) -> Vec<ProducerAvailable> {
        self.notifications()
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::ProducerAvailable(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn closed_producers(&mut self) -> Vec<ProducerClosed> {
        self.notifications()
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::ProducerClosed(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn joined_peers(&mut self) -> Vec<PeerInfo> {
        self.notifications()
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::PeerJoined(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn left_peers(&mut self) -> Vec<PeerId> {
        self.notifications()
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::PeerLeft(p) => Some(p.peer_id),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.pump();
        self.received.clear();
    }

    pub async fn join(&mut self, room: &str, name: &str) -> Result<JoinResponse> {
        let body = self
            .call(SignalRequest::Join(JoinRequest {
                room_id: RoomId::from(room),
                name: name.to_owned(),
            }))
            .await?;
        match body {
            ResponseBody::Joined(joined) => Ok(joined),
            other => bail!("unexpected join reply: {:?}", other),
        }
    }

    pub async fn create_transport(
        &mut self,
        room: &str,
        direction: Direction,
    ) -> Result<TransportParams> {
        let scoped = RoomScopedRequest {
            room_id: RoomId::from(room),
        };
        let request = match direction {
            Direction::Send => SignalRequest::CreateSendTransport(scoped),
            Direction::Recv => SignalRequest::CreateRecvTransport(scoped),
        };
        match self.call(request).await? {
            ResponseBody::Transport(params) => Ok(params),
            other => bail!("unexpected transport reply: {:?}", other),
        }
    }

    pub async fn connect_transport(&mut self, room: &str, direction: Direction) -> Result<()> {
        let connect = ConnectTransportRequest {
            room_id: RoomId::from(room),
            dtls_parameters: client_dtls(),
        };
        let request = match direction {
            Direction::Send => SignalRequest::ConnectSendTransport(connect),
            Direction::Recv => SignalRequest::ConnectRecvTransport(connect),
        };
        match self.call(request).await? {
            ResponseBody::Done => Ok(()),
            other => bail!("unexpected connect reply: {:?}", other),
        }
    }

    /// Creates and connects both transports.
    pub async fn setup_transports(&mut self, room: &str) -> Result<()> {
        for direction in [Direction::Send, Direction::Recv] {
            self.create_transport(room, direction).await?;
            self.connect_transport(room, direction).await?;
        }
        Ok(())
    }

    pub async fn produce(
        &mut self,
        room: &str,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId> {
        let body = self
            .call(SignalRequest::Produce(ProduceRequest {
                room_id: RoomId::from(room),
                kind,
                rtp_parameters,
            }))
            .await?;
        match body {
            ResponseBody::Produced(produced) => Ok(produced.id),
            other => bail!("unexpected produce reply: {:?}", other),
        }
    }

    pub fn consume_request(
        room: &str,
        producer_id: &ProducerId,
        rtp_capabilities: RtpCapabilities,
    ) -> SignalRequest {
        SignalRequest::Consume(ConsumeRequest {
            room_id: RoomId::from(room),
            producer_id: producer_id.clone(),
            rtp_capabilities,
        })
    }

    pub async fn consume(
        &mut self,
        room: &str,
        producer_id: &ProducerId,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<ConsumerDescriptor> {
        let body = self
            .call(Self::consume_request(room, producer_id, rtp_capabilities))
            .await?;
        match body {
            ResponseBody::Consumed(descriptor) => Ok(descriptor),
            other => bail!("unexpected consume reply: {:?}", other),
        }
    }

    pub async fn resume(&mut self, room: &str, consumer_id: &ConsumerId) -> Result<()> {
        let body = self
            .call(SignalRequest::ResumeConsumer(ResumeConsumerRequest {
                room_id: RoomId::from(room),
                consumer_id: consumer_id.clone(),
            }))
            .await?;
        match body {
            ResponseBody::Done => Ok(()),
            other => bail!("unexpected resume reply: {:?}", other),
        }
    }

    pub async fn disconnect(&mut self) {
        self.service.disconnect(&mut self.session).await;
        self.pump();
    }
}
