use crate::error::SignalingError;
use crate::room::{Admission, Room, RoomRegistry, Teardown};
use crate::signaling::SignalingOutput;
use conclave_core::{
    Ack, ClientMessage, Direction, JoinResponse, PeerId, PeerLeft, Produced, ProducerAvailable,
    ProducerClosed, ResponseBody, RoomId, ServerMessage, SignalRequest,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connected,
    Joined,
    /// Has created a transport or exchanged media at least once.
    Active,
    Left,
}

/// Per-connection protocol state, owned by the connection's reader.
#[derive(Debug)]
pub struct PeerSession {
    peer_id: PeerId,
    phase: SessionPhase,
    rooms: BTreeSet<RoomId>,
}

impl PeerSession {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            phase: SessionPhase::Connected,
            rooms: BTreeSet::new(),
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn rooms(&self) -> impl Iterator<Item = &RoomId> {
        self.rooms.iter()
    }

    fn advance(&mut self, to: SessionPhase) {
        let moves = matches!(
            (self.phase, to),
            (SessionPhase::Connected, SessionPhase::Joined)
                | (SessionPhase::Joined, SessionPhase::Active)
                | (_, SessionPhase::Left)
        );
        if moves {
            debug!(peer_id = %self.peer_id, from = ?self.phase, to = ?to, "Session phase");
            self.phase = to;
        }
    }
}

/// Work that has to happen once the ack is on its way.
enum AfterAck {
    Nothing,
    Admitted { room_id: RoomId, admission: Admission },
}

struct Reply {
    body: ResponseBody,
    after: AfterAck,
}

impl Reply {
    fn done() -> Self {
        Self::body(ResponseBody::Done)
    }

    fn body(body: ResponseBody) -> Self {
        Self {
            body,
            after: AfterAck::Nothing,
        }
    }
}

/// Turns decoded requests into room operations, replies and notifications.
#[derive(Clone)]
pub struct SignalingCoordinator {
    registry: RoomRegistry,
    output: Arc<dyn SignalingOutput>,
}

impl SignalingCoordinator {
    pub fn new(registry: RoomRegistry, output: Arc<dyn SignalingOutput>) -> Self {
        Self { registry, output }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Handles one request and answers it with an ack carrying the same id.
    pub async fn handle(&self, session: &mut PeerSession, message: ClientMessage) {
        let ClientMessage { id, request } = message;
        let op = request.op();
        let room_id = request.room_id().clone();

        let result = self.dispatch(session, request).await;

        let (outcome, after) = match result {
            Ok(reply) => (Ok(reply.body), reply.after),
            Err(e) => {
                warn!(peer_id = %session.peer_id, room_id = %room_id, op, error = %e, "Request failed");
                self.registry.observe(&e);
                (Err(e), AfterAck::Nothing)
            }
        };

        self.output
            .send(
                &session.peer_id,
                ServerMessage::Ack(Ack {
                    id,
                    outcome: outcome.into(),
                }),
            )
            .await;

        if let AfterAck::Admitted { room_id, admission } = after {
            self.finish_join(session, &room_id, admission).await;
        }
    }

    async fn dispatch(
        &self,
        session: &mut PeerSession,
        request: SignalRequest,
    ) -> Result<Reply, SignalingError> {
        if session.phase == SessionPhase::Left {
            return Err(SignalingError::PeerNotFound(session.peer_id.clone()));
        }
        let peer_id = session.peer_id.clone();

        match request {
            SignalRequest::Join(join) => {
                let (room, admission) = self
                    .registry
                    .join(&join.room_id, peer_id, join.name)
                    .await?;
                session.rooms.insert(join.room_id.clone());
                session.advance(SessionPhase::Joined);

                Ok(Reply {
                    body: ResponseBody::Joined(JoinResponse {
                        router_capabilities: room.rtp_capabilities(),
                        peers: admission.others.clone(),
                        is_host: admission.peer.is_host,
                    }),
                    after: AfterAck::Admitted {
                        room_id: join.room_id,
                        admission,
                    },
                })
            }
            SignalRequest::CreateSendTransport(r) => {
                self.create_transport(session, &r.room_id, Direction::Send)
                    .await
            }
            SignalRequest::CreateRecvTransport(r) => {
                self.create_transport(session, &r.room_id, Direction::Recv)
                    .await
            }
            SignalRequest::ConnectSendTransport(r) => {
                let room = self.room(&r.room_id)?;
                room.connect_transport(&peer_id, Direction::Send, r.dtls_parameters)
                    .await?;
                Ok(Reply::done())
            }
            SignalRequest::ConnectRecvTransport(r) => {
                let room = self.room(&r.room_id)?;
                room.connect_transport(&peer_id, Direction::Recv, r.dtls_parameters)
                    .await?;
                Ok(Reply::done())
            }
            SignalRequest::Produce(r) => {
                let room = self.room(&r.room_id)?;
                let (producer_id, recipients) =
                    room.produce(&peer_id, r.kind, r.rtp_parameters).await?;
                session.advance(SessionPhase::Active);

                self.output
                    .broadcast(
                        room.id(),
                        &recipients,
                        ServerMessage::ProducerAvailable(ProducerAvailable {
                            producer_id: producer_id.clone(),
                            peer_id,
                            kind: r.kind,
                        }),
                    )
                    .await;

                Ok(Reply::body(ResponseBody::Produced(Produced {
                    id: producer_id,
                })))
            }
            SignalRequest::Consume(r) => {
                let room = self.room(&r.room_id)?;
                let descriptor = room
                    .consume(&peer_id, &r.producer_id, r.rtp_capabilities)
                    .await?;
                session.advance(SessionPhase::Active);
                Ok(Reply::body(ResponseBody::Consumed(descriptor)))
            }
            SignalRequest::ResumeConsumer(r) => {
                let room = self.room(&r.room_id)?;
                room.resume_consumer(&peer_id, &r.consumer_id).await?;
                Ok(Reply::done())
            }
            SignalRequest::CloseProducer(r) => {
                let room = self.room(&r.room_id)?;
                let teardown = room.close_producer(&peer_id, &r.producer_id)?;
                self.finish_teardown(&room, teardown).await;
                Ok(Reply::done())
            }
        }
    }

    async fn create_transport(
        &self,
        session: &mut PeerSession,
        room_id: &RoomId,
        direction: Direction,
    ) -> Result<Reply, SignalingError> {
        let room = self.room(room_id)?;
        let (params, teardown) = room.create_transport(&session.peer_id, direction).await?;
        session.advance(SessionPhase::Active);
        self.finish_teardown(&room, teardown).await;
        Ok(Reply::body(ResponseBody::Transport(params)))
    }

    fn room(&self, room_id: &RoomId) -> Result<Arc<Room>, SignalingError> {
        self.registry
            .get(room_id)
            .ok_or_else(|| SignalingError::RoomNotFound(room_id.clone()))
    }

    /// Closes what a commit removed, then tells the room which producers went
    /// away.
    async fn finish_teardown(&self, room: &Room, mut teardown: Teardown) {
        teardown.release().await;
        for producer in &teardown.producers {
            self.output
                .broadcast(
                    room.id(),
                    &teardown.recipients,
                    ServerMessage::ProducerClosed(ProducerClosed {
                        producer_id: producer.id.clone(),
                        peer_id: producer.peer_id.clone(),
                    }),
                )
                .await;
        }
    }

    async fn finish_join(&self, session: &PeerSession, room_id: &RoomId, admission: Admission) {
        let peer_id = &session.peer_id;

        for announcement in &admission.existing_producers {
            self.output
                .send(
                    peer_id,
                    ServerMessage::ProducerAvailable(announcement.clone()),
                )
                .await;
        }
        self.output.open(peer_id, room_id).await;

        self.output
            .broadcast(
                room_id,
                &admission.recipients(),
                ServerMessage::PeerJoined(admission.peer.clone()),
            )
            .await;

        info!(
            peer_id = %peer_id,
            room_id = %room_id,
            is_host = admission.peer.is_host,
            peers = admission.others.len() + 1,
            "Peer joined"
        );
    }

    /// Leaves every room of the session. Safe to call more than once.
    pub async fn disconnect(&self, session: &mut PeerSession) {
        if session.phase == SessionPhase::Left {
            return;
        }
        session.advance(SessionPhase::Left);
        let peer_id = session.peer_id.clone();

        for room_id in std::mem::take(&mut session.rooms) {
            match self.registry.leave(&room_id, &peer_id).await {
                Ok(teardown) => {
                    self.output
                        .broadcast(
                            &room_id,
                            &teardown.recipients,
                            ServerMessage::PeerLeft(PeerLeft {
                                peer_id: peer_id.clone(),
                            }),
                        )
                        .await;
                    info!(peer_id = %peer_id, room_id = %room_id, "Peer left");
                }
                Err(e) => {
                    debug!(peer_id = %peer_id, room_id = %room_id, error = %e, "Nothing to leave");
                }
            }
            self.output.close(&peer_id, &room_id).await;
        }
    }
}
