use crate::engine::{SfuRouter, SfuTransport};
use crate::error::SignalingError;
use crate::room::peer::{Consumer, Peer, Producer, TransportSession};
use conclave_core::{
    ConsumerDescriptor, ConsumerId, Direction, DtlsParameters, MediaKind, PeerId, PeerInfo,
    ProducerAvailable, ProducerId, RoomId, RtpCapabilities, RtpParameters, TransportParams,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// What a joining peer learns, captured atomically with its insertion.
#[derive(Debug, Clone)]
pub struct Admission {
    pub peer: PeerInfo,
    /// Everyone who was already there. They get `peer-joined`.
    pub others: Vec<PeerInfo>,
    /// Producers the joiner has to be told about directly, since it was not
    /// around for their broadcast.
    pub existing_producers: Vec<ProducerAvailable>,
}

impl Admission {
    pub fn recipients(&self) -> Vec<PeerId> {
        self.others.iter().map(|p| p.id.clone()).collect()
    }
}

enum Release {
    Transport(Arc<dyn SfuTransport>),
    Producer(Arc<dyn SfuTransport>, ProducerId),
    Consumer(Arc<dyn SfuTransport>, ConsumerId),
}

/// State already removed from a room whose engine objects still have to be
/// closed. Produced under the room lock, released outside of it.
#[derive(Default)]
pub struct Teardown {
    /// Producers that are gone.
    pub producers: Vec<Producer>,
    /// Every consumer that is gone, including other peers' consumers of
    /// the removed producers.
    pub consumers: Vec<Consumer>,
    /// Peers still in the room at commit time.
    pub recipients: Vec<PeerId>,
    /// The last peer left; the room is closed and must leave the registry.
    pub room_emptied: bool,
    releases: Vec<Release>,
}

impl Teardown {
    pub async fn release(&mut self) {
        for release in self.releases.drain(..) {
            match release {
                Release::Consumer(transport, id) => transport.close_consumer(&id).await,
                Release::Producer(transport, id) => transport.close_producer(&id).await,
                Release::Transport(transport) => transport.close().await,
            }
        }
    }
}

#[derive(Default)]
struct RoomState {
    peers: HashMap<PeerId, Peer>,
    closed: bool,
}

impl RoomState {
    fn peer(&self, id: &PeerId) -> Result<&Peer, SignalingError> {
        self.peers
            .get(id)
            .ok_or_else(|| SignalingError::PeerNotFound(id.clone()))
    }

    fn peer_mut(&mut self, id: &PeerId) -> Result<&mut Peer, SignalingError> {
        self.peers
            .get_mut(id)
            .ok_or_else(|| SignalingError::PeerNotFound(id.clone()))
    }

    fn others(&self, except: &PeerId) -> Vec<PeerId> {
        self.peers.keys().filter(|id| *id != except).cloned().collect()
    }

    fn producer(&self, id: &ProducerId) -> Option<&Producer> {
        self.peers.values().find_map(|peer| peer.producer(id))
    }

    fn detach_consumers_of(&mut self, producer_ids: &[ProducerId], teardown: &mut Teardown) {
        if producer_ids.is_empty() {
            return;
        }
        for peer in self.peers.values_mut() {
            for (consumer, handle) in peer.detach_consumers_of(producer_ids) {
                if let Some(handle) = handle {
                    teardown
                        .releases
                        .push(Release::Consumer(handle, consumer.id.clone()));
                }
                teardown.consumers.push(consumer);
            }
        }
    }

    fn install_transport(
        &mut self,
        peer_id: &PeerId,
        session: TransportSession,
        teardown: &mut Teardown,
    ) -> Result<TransportParams, SignalingError> {
        let params = session.params.clone();
        let peer = self.peer_mut(peer_id)?;
        let Some(old) = peer.transports_mut().replace(session) else {
            return Ok(params);
        };

        let (producers, consumers) = peer.drain_transport(&old.id);
        debug!(
            peer_id = %peer_id,
            transport_id = %old.id,
            producers = producers.len(),
            consumers = consumers.len(),
            "Retiring replaced transport"
        );

        let producer_ids: Vec<ProducerId> = producers.iter().map(|p| p.id.clone()).collect();
        teardown.recipients = self.others(peer_id);
        self.detach_consumers_of(&producer_ids, teardown);
        teardown.producers.extend(producers);
        teardown.consumers.extend(consumers);
        teardown.releases.push(Release::Transport(old.handle()));

        Ok(params)
    }
}

/// A group of peers sharing one router. Every method locks the room only
/// for the synchronous part of its work; engine calls happen unlocked and
/// the state is checked again once they return.
pub struct Room {
    id: RoomId,
    router: Arc<dyn SfuRouter>,
    state: Mutex<RoomState>,
}

impl Room {
    pub fn new(id: RoomId, router: Arc<dyn SfuRouter>) -> Self {
        Self {
            id,
            router,
            state: Mutex::new(RoomState::default()),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn rtp_capabilities(&self) -> RtpCapabilities {
        self.router.rtp_capabilities()
    }

    fn state(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fails with `RoomNotFound` once the room has been emptied and closed.
    pub fn add_peer(
        &self,
        id: PeerId,
        name: String,
        is_host: bool,
    ) -> Result<Admission, SignalingError> {
        let mut state = self.state();
        if state.closed {
            return Err(SignalingError::RoomNotFound(self.id.clone()));
        }
        if state.peers.contains_key(&id) {
            return Err(SignalingError::DuplicatePeer(id));
        }

        let others = state.peers.values().map(Peer::info).collect();
        let existing_producers = state
            .peers
            .values()
            .flat_map(|peer| peer.producers())
            .map(Producer::announcement)
            .collect();

        let peer = Peer::new(id.clone(), name, is_host);
        let info = peer.info();
        state.peers.insert(id, peer);

        info!(room_id = %self.id, peer_id = %info.id, is_host, "Peer added");

        Ok(Admission {
            peer: info,
            others,
            existing_producers,
        })
    }

    pub fn list_peers(&self) -> Vec<PeerInfo> {
        self.state().peers.values().map(Peer::info).collect()
    }

    pub fn peer_count(&self) -> usize {
        self.state().peers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Runs `f` against a peer under the room lock.
    pub fn with_peer<R>(&self, id: &PeerId, f: impl FnOnce(&Peer) -> R) -> Option<R> {
        self.state().peers.get(id).map(f)
    }

    /// Creates a transport for `direction`, retiring the peer's previous one
    /// in that direction. The returned teardown holds whatever the retired
    /// transport took with it.
    pub async fn create_transport(
        &self,
        peer_id: &PeerId,
        direction: Direction,
    ) -> Result<(TransportParams, Teardown), SignalingError> {
        self.state().peer(peer_id)?;

        let handle = self.router.create_transport(direction).await?;
        let session = TransportSession::new(direction, Arc::clone(&handle));

        let mut teardown = Teardown::default();
        let installed = self
            .state()
            .install_transport(peer_id, session, &mut teardown);

        match installed {
            Ok(params) => {
                debug!(room_id = %self.id, peer_id = %peer_id, %direction, transport_id = %params.id, "Transport ready");
                Ok((params, teardown))
            }
            Err(e) => {
                handle.close().await;
                Err(e)
            }
        }
    }

    pub async fn connect_transport(
        &self,
        peer_id: &PeerId,
        direction: Direction,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), SignalingError> {
        let handle = {
            let state = self.state();
            state
                .peer(peer_id)?
                .transport(direction)
                .map(TransportSession::handle)
                .ok_or(SignalingError::TransportNotFound(direction))?
        };

        handle.connect(dtls_parameters).await?;

        let mut state = self.state();
        if let Some(session) = state
            .peers
            .get_mut(peer_id)
            .and_then(|peer| peer.transports_mut().get_mut(direction))
            .filter(|session| &session.id == handle.id())
        {
            session.connected = true;
        }
        Ok(())
    }

    /// Returns the new producer and the peers that must hear about it.
    pub async fn produce(
        &self,
        peer_id: &PeerId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<(ProducerId, Vec<PeerId>), SignalingError> {
        let handle = {
            let state = self.state();
            state
                .peer(peer_id)?
                .transport(Direction::Send)
                .map(TransportSession::handle)
                .ok_or(SignalingError::NoSendTransport)?
        };

        let producer_id = handle.produce(kind, rtp_parameters).await?;

        let committed = {
            let mut state = self.state();
            let recipients = state.others(peer_id);
            match state.peers.get_mut(peer_id) {
                None => Err(SignalingError::PeerNotFound(peer_id.clone())),
                Some(peer)
                    if peer.transport(Direction::Send).map(|s| &s.id) != Some(handle.id()) =>
                {
                    Err(SignalingError::NoSendTransport)
                }
                Some(peer) => {
                    peer.insert_producer(Producer {
                        id: producer_id.clone(),
                        kind,
                        peer_id: peer_id.clone(),
                        transport_id: handle.id().clone(),
                    });
                    Ok(recipients)
                }
            }
        };

        match committed {
            Ok(recipients) => {
                info!(room_id = %self.id, peer_id = %peer_id, producer_id = %producer_id, %kind, "Producer created");
                Ok((producer_id, recipients))
            }
            Err(e) => {
                handle.close_producer(&producer_id).await;
                Err(e)
            }
        }
    }

    /// Creates a paused consumer on the peer's receive transport.
    pub async fn consume(
        &self,
        peer_id: &PeerId,
        producer_id: &ProducerId,
        capabilities: RtpCapabilities,
    ) -> Result<ConsumerDescriptor, SignalingError> {
        let handle = {
            let state = self.state();
            let handle = state
                .peer(peer_id)?
                .transport(Direction::Recv)
                .map(TransportSession::handle)
                .ok_or(SignalingError::TransportNotFound(Direction::Recv))?;
            if state.producer(producer_id).is_none() {
                return Err(SignalingError::ProducerNotFound(producer_id.clone()));
            }
            handle
        };

        if !self.router.can_consume(producer_id, &capabilities).await {
            return Err(SignalingError::IncompatibleCapabilities(producer_id.clone()));
        }

        let consumer = handle.consume(producer_id, &capabilities).await?;

        let committed = {
            let mut state = self.state();
            let producer_alive = state.producer(producer_id).is_some();
            match state.peers.get_mut(peer_id) {
                None => Err(SignalingError::PeerNotFound(peer_id.clone())),
                Some(_) if !producer_alive => {
                    Err(SignalingError::ProducerNotFound(producer_id.clone()))
                }
                Some(peer)
                    if peer.transport(Direction::Recv).map(|s| &s.id) != Some(handle.id()) =>
                {
                    Err(SignalingError::TransportNotFound(Direction::Recv))
                }
                Some(peer) => {
                    peer.insert_consumer(Consumer {
                        id: consumer.id.clone(),
                        producer_id: producer_id.clone(),
                        peer_id: peer_id.clone(),
                        kind: consumer.kind,
                        paused: true,
                        transport_id: handle.id().clone(),
                    });
                    Ok(())
                }
            }
        };

        if let Err(e) = committed {
            handle.close_consumer(&consumer.id).await;
            return Err(e);
        }

        debug!(room_id = %self.id, peer_id = %peer_id, consumer_id = %consumer.id, producer_id = %producer_id, "Consumer created paused");

        Ok(ConsumerDescriptor {
            id: consumer.id,
            producer_id: producer_id.clone(),
            kind: consumer.kind,
            rtp_parameters: consumer.rtp_parameters,
        })
    }

    pub async fn resume_consumer(
        &self,
        peer_id: &PeerId,
        consumer_id: &ConsumerId,
    ) -> Result<(), SignalingError> {
        let handle = {
            let state = self.state();
            let peer = state.peer(peer_id)?;
            peer.consumer(consumer_id)
                .and_then(|consumer| peer.handle_for(&consumer.transport_id))
                .ok_or_else(|| SignalingError::ConsumerNotFound(consumer_id.clone()))?
        };

        handle.resume_consumer(consumer_id).await?;

        let mut state = self.state();
        if let Some(consumer) = state
            .peers
            .get_mut(peer_id)
            .and_then(|peer| peer.consumer_mut(consumer_id))
        {
            consumer.paused = false;
        }
        Ok(())
    }

    /// Removes one producer of `peer_id` and every consumer fed by it.
    pub fn close_producer(
        &self,
        peer_id: &PeerId,
        producer_id: &ProducerId,
    ) -> Result<Teardown, SignalingError> {
        let mut state = self.state();
        let peer = state.peer_mut(peer_id)?;
        let producer = peer
            .remove_producer(producer_id)
            .ok_or_else(|| SignalingError::ProducerNotFound(producer_id.clone()))?;
        let handle = peer.handle_for(&producer.transport_id);

        let mut teardown = Teardown {
            recipients: state.others(peer_id),
            ..Teardown::default()
        };
        state.detach_consumers_of(std::slice::from_ref(&producer.id), &mut teardown);
        if let Some(handle) = handle {
            teardown
                .releases
                .push(Release::Producer(handle, producer.id.clone()));
        }
        teardown.producers.push(producer);

        info!(room_id = %self.id, peer_id = %peer_id, producer_id = %producer_id, "Producer closed");
        Ok(teardown)
    }

    /// Removes a peer with everything it owns, plus the consumers other
    /// peers held on its producers. Closes the room when it was the last one.
    pub fn remove_peer(&self, peer_id: &PeerId) -> Result<Teardown, SignalingError> {
        let mut state = self.state();
        let mut peer = state
            .peers
            .remove(peer_id)
            .ok_or_else(|| SignalingError::PeerNotFound(peer_id.clone()))?;

        let (transports, producers, consumers) = peer.dismantle();
        let producer_ids: Vec<ProducerId> = producers.iter().map(|p| p.id.clone()).collect();

        let mut teardown = Teardown::default();
        state.detach_consumers_of(&producer_ids, &mut teardown);
        teardown.releases.extend(
            transports
                .iter()
                .map(|session| Release::Transport(session.handle())),
        );
        teardown.producers = producers;
        teardown.consumers.extend(consumers);
        teardown.recipients = state.peers.keys().cloned().collect();

        if state.peers.is_empty() {
            state.closed = true;
            teardown.room_emptied = true;
        }

        info!(
            room_id = %self.id,
            peer_id = %peer_id,
            remaining = state.peers.len(),
            "Peer removed"
        );
        Ok(teardown)
    }

    pub(crate) async fn close_router(&self) {
        self.router.close().await;
    }
}
