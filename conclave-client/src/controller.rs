use crate::channel::SignalingChannel;
use crate::device::{LocalTrack, MediaDevice};
use crate::error::ClientError;
use crate::streams::{RemoteStream, RemoteStreams};
use conclave_core::{
    CloseProducerRequest, ConnectTransportRequest, ConsumeRequest, Direction, JoinRequest,
    JoinResponse, PeerId, PeerInfo, ProduceRequest, ProducerAvailable, ProducerId, ResponseBody,
    ResumeConsumerRequest, RoomId, RoomScopedRequest, ServerMessage, SignalRequest, TransportId,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{OnceCell, mpsc};
use tracing::{debug, info, warn};

/// What the application hears about the room.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PeerJoined(PeerInfo),
    /// The peer's aggregate stream changed. `stream.id()` is the same on
    /// every update for a given peer.
    StreamUpdated {
        peer_id: PeerId,
        stream: RemoteStream,
    },
    PeerLeft(PeerId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinSummary {
    pub room_id: RoomId,
    pub is_host: bool,
    pub peers: Vec<PeerInfo>,
}

/// Peer side of a session: one room, one send transport and one receive
/// transport, and one aggregate stream per remote peer.
pub struct ClientSessionController {
    channel: Arc<dyn SignalingChannel>,
    device: Arc<dyn MediaDevice>,
    room_id: OnceCell<RoomId>,
    /// Server admission whose local setup has not completed yet.
    admission: Mutex<Option<(RoomId, JoinResponse)>>,
    send_transport: OnceCell<TransportId>,
    recv_transport: OnceCell<TransportId>,
    streams: Mutex<RemoteStreams>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl ClientSessionController {
    pub fn new(
        channel: Arc<dyn SignalingChannel>,
        device: Arc<dyn MediaDevice>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let controller = Self {
            channel,
            device,
            room_id: OnceCell::new(),
            admission: Mutex::new(None),
            send_transport: OnceCell::new(),
            recv_transport: OnceCell::new(),
            streams: Mutex::new(RemoteStreams::new()),
            events,
        };
        (controller, rx)
    }

    fn streams(&self) -> MutexGuard<'_, RemoteStreams> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn room(&self) -> Result<RoomId, ClientError> {
        self.room_id.get().cloned().ok_or(ClientError::NotJoined)
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Session event dropped, nobody listening");
        }
    }

    /// Joins `room_id`, loads the device and opens the receive transport.
    ///
    /// The controller counts as joined only once all three succeeded. If the
    /// device or the transport fails after the server admitted the peer, the
    /// admission is kept and a later `join` of the same room resumes from it
    /// instead of asking the server again.
    pub async fn join(
        &self,
        room_id: impl Into<RoomId>,
        name: impl Into<String>,
    ) -> Result<JoinSummary, ClientError> {
        let room_id = room_id.into();
        if let Some(current) = self.room_id.get() {
            return Err(ClientError::Protocol(format!(
                "already joined to {}",
                current
            )));
        }

        let joined = match self.take_admission(&room_id)? {
            Some(joined) => {
                debug!(room_id = %room_id, "Resuming interrupted join");
                joined
            }
            None => {
                let body = self
                    .channel
                    .request(SignalRequest::Join(JoinRequest {
                        room_id: room_id.clone(),
                        name: name.into(),
                    }))
                    .await?;
                let ResponseBody::Joined(joined) = body else {
                    return Err(ClientError::unexpected("join", body));
                };
                joined
            }
        };

        if let Err(e) = self.setup(&room_id, &joined).await {
            warn!(room_id = %room_id, error = %e, "Join setup failed, keeping admission");
            *self.admission() = Some((room_id, joined));
            return Err(e);
        }

        self.room_id
            .set(room_id.clone())
            .map_err(|_| ClientError::Protocol(format!("already joined to {}", room_id)))?;

        info!(room_id = %room_id, is_host = joined.is_host, peers = joined.peers.len(), "Joined room");
        Ok(JoinSummary {
            room_id,
            is_host: joined.is_host,
            peers: joined.peers,
        })
    }

    fn admission(&self) -> MutexGuard<'_, Option<(RoomId, JoinResponse)>> {
        self.admission.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The kept admission for `room_id`, if any. An admission kept for
    /// another room blocks joining elsewhere.
    fn take_admission(&self, room_id: &RoomId) -> Result<Option<JoinResponse>, ClientError> {
        let mut admission = self.admission();
        match admission.take() {
            Some((admitted, joined)) if &admitted == room_id => Ok(Some(joined)),
            Some((admitted, joined)) => {
                let err = ClientError::Protocol(format!(
                    "admitted to {}, finish that join first",
                    admitted
                ));
                *admission = Some((admitted, joined));
                Err(err)
            }
            None => Ok(None),
        }
    }

    async fn setup(&self, room_id: &RoomId, joined: &JoinResponse) -> Result<(), ClientError> {
        self.device.load(&joined.router_capabilities).await?;
        {
            let mut streams = self.streams();
            for peer in &joined.peers {
                streams.stream_for(&peer.id);
            }
        }
        self.recv_transport(room_id).await?;
        Ok(())
    }

    async fn send_transport(&self, room_id: &RoomId) -> Result<&TransportId, ClientError> {
        self.send_transport
            .get_or_try_init(|| self.open_transport(room_id, Direction::Send))
            .await
    }

    async fn recv_transport(&self, room_id: &RoomId) -> Result<&TransportId, ClientError> {
        self.recv_transport
            .get_or_try_init(|| self.open_transport(room_id, Direction::Recv))
            .await
    }

    async fn open_transport(
        &self,
        room_id: &RoomId,
        direction: Direction,
    ) -> Result<TransportId, ClientError> {
        let scoped = RoomScopedRequest {
            room_id: room_id.clone(),
        };
        let create = match direction {
            Direction::Send => SignalRequest::CreateSendTransport(scoped),
            Direction::Recv => SignalRequest::CreateRecvTransport(scoped),
        };
        let ResponseBody::Transport(params) = self.channel.request(create).await? else {
            return Err(ClientError::Protocol(format!(
                "create-{}-transport answered without transport parameters",
                direction
            )));
        };

        let dtls_parameters = self.device.open_transport(direction, &params).await?;
        let connect = ConnectTransportRequest {
            room_id: room_id.clone(),
            dtls_parameters,
        };
        let connect = match direction {
            Direction::Send => SignalRequest::ConnectSendTransport(connect),
            Direction::Recv => SignalRequest::ConnectRecvTransport(connect),
        };
        self.channel.request(connect).await?;

        debug!(transport_id = %params.id, %direction, "Transport connected");
        Ok(params.id)
    }

    /// Starts sending `track` to the room.
    pub async fn publish(&self, track: LocalTrack) -> Result<ProducerId, ClientError> {
        let room_id = self.room()?;
        self.send_transport(&room_id).await?;

        let rtp_parameters = self.device.produce(&track).await?;
        let body = self
            .channel
            .request(SignalRequest::Produce(ProduceRequest {
                room_id,
                kind: track.kind,
                rtp_parameters,
            }))
            .await?;
        let ResponseBody::Produced(produced) = body else {
            return Err(ClientError::unexpected("produce", body));
        };

        info!(producer_id = %produced.id, kind = %track.kind, label = %track.label, "Track published");
        Ok(produced.id)
    }

    pub async fn unpublish(&self, producer_id: &ProducerId) -> Result<(), ClientError> {
        let room_id = self.room()?;
        self.channel
            .request(SignalRequest::CloseProducer(CloseProducerRequest {
                room_id,
                producer_id: producer_id.clone(),
            }))
            .await?;
        Ok(())
    }

    /// Applies one server notification.
    pub async fn handle_notification(&self, message: ServerMessage) -> Result<(), ClientError> {
        match message {
            ServerMessage::ProducerAvailable(announcement) => self.consume(announcement).await,
            ServerMessage::ProducerClosed(closed) => {
                let updated = self.streams().remove_track(&closed.producer_id);
                if let Some(stream) = updated {
                    self.emit(SessionEvent::StreamUpdated {
                        peer_id: closed.peer_id,
                        stream,
                    });
                }
                Ok(())
            }
            ServerMessage::PeerJoined(peer) => {
                self.streams().stream_for(&peer.id);
                self.emit(SessionEvent::PeerJoined(peer));
                Ok(())
            }
            ServerMessage::PeerLeft(left) => {
                self.streams().remove_peer(&left.peer_id);
                self.emit(SessionEvent::PeerLeft(left.peer_id));
                Ok(())
            }
            ServerMessage::Welcome(_) | ServerMessage::Ack(_) => Err(ClientError::Protocol(
                "request traffic on the notification stream".to_owned(),
            )),
        }
    }

    /// Applies notifications until the stream ends. Failures are logged
    /// and do not stop the loop.
    ///
    /// Start it once [`join`](Self::join) has returned: the existing-producer
    /// notices queue up behind the join ack and need the loaded device.
    pub async fn run(&self, mut notifications: mpsc::UnboundedReceiver<ServerMessage>) {
        while let Some(message) = notifications.recv().await {
            if let Err(e) = self.handle_notification(message).await {
                warn!(error = %e, "Notification handling failed");
            }
        }
        debug!("Notification stream ended");
    }

    async fn consume(&self, announcement: ProducerAvailable) -> Result<(), ClientError> {
        let room_id = self.room()?;
        self.recv_transport(&room_id).await?;

        let body = self
            .channel
            .request(SignalRequest::Consume(ConsumeRequest {
                room_id: room_id.clone(),
                producer_id: announcement.producer_id.clone(),
                rtp_capabilities: self.device.rtp_capabilities(),
            }))
            .await?;
        let ResponseBody::Consumed(descriptor) = body else {
            return Err(ClientError::unexpected("consume", body));
        };

        let track = self.device.consume(&descriptor).await?;
        let stream = self.streams().add_track(&announcement.peer_id, track);
        self.emit(SessionEvent::StreamUpdated {
            peer_id: announcement.peer_id.clone(),
            stream,
        });

        self.channel
            .request(SignalRequest::ResumeConsumer(ResumeConsumerRequest {
                room_id,
                consumer_id: descriptor.id.clone(),
            }))
            .await?;

        debug!(consumer_id = %descriptor.id, producer_id = %announcement.producer_id, "Consumer resumed");
        Ok(())
    }

    /// Current aggregate of one remote peer.
    pub fn stream(&self, peer_id: &PeerId) -> Option<RemoteStream> {
        self.streams().get(peer_id).cloned()
    }

    pub fn remote_streams(&self) -> Vec<RemoteStream> {
        self.streams().iter().cloned().collect()
    }

    pub fn room_id(&self) -> Option<&RoomId> {
        self.room_id.get()
    }

    pub fn transports(&self) -> (Option<&TransportId>, Option<&TransportId>) {
        (self.send_transport.get(), self.recv_transport.get())
    }
}
