use crate::engine::SfuTransport;
use conclave_core::{
    ConsumerId, Direction, MediaKind, PeerId, PeerInfo, ProducerAvailable, ProducerId,
    TransportId, TransportParams,
};
use std::collections::HashMap;
use std::sync::Arc;

/// One negotiated transport of a peer.
pub struct TransportSession {
    pub id: TransportId,
    pub direction: Direction,
    pub params: TransportParams,
    pub connected: bool,
    handle: Arc<dyn SfuTransport>,
}

impl TransportSession {
    pub(crate) fn new(direction: Direction, handle: Arc<dyn SfuTransport>) -> Self {
        let params = handle.params().clone();
        Self {
            id: params.id.clone(),
            direction,
            params,
            connected: false,
            handle,
        }
    }

    pub(crate) fn handle(&self) -> Arc<dyn SfuTransport> {
        Arc::clone(&self.handle)
    }
}

/// The send/recv pair. Setting a direction hands back whatever was there.
#[derive(Default)]
pub struct TransportSlots {
    send: Option<TransportSession>,
    recv: Option<TransportSession>,
}

impl TransportSlots {
    pub fn get(&self, direction: Direction) -> Option<&TransportSession> {
        match direction {
            Direction::Send => self.send.as_ref(),
            Direction::Recv => self.recv.as_ref(),
        }
    }

    pub(crate) fn get_mut(&mut self, direction: Direction) -> Option<&mut TransportSession> {
        match direction {
            Direction::Send => self.send.as_mut(),
            Direction::Recv => self.recv.as_mut(),
        }
    }

    pub(crate) fn replace(&mut self, session: TransportSession) -> Option<TransportSession> {
        let slot = match session.direction {
            Direction::Send => &mut self.send,
            Direction::Recv => &mut self.recv,
        };
        slot.replace(session)
    }

    pub(crate) fn take_all(&mut self) -> Vec<TransportSession> {
        self.send.take().into_iter().chain(self.recv.take()).collect()
    }

    fn by_id(&self, id: &TransportId) -> Option<&TransportSession> {
        self.send
            .iter()
            .chain(self.recv.iter())
            .find(|session| &session.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Producer {
    pub id: ProducerId,
    pub kind: MediaKind,
    pub peer_id: PeerId,
    pub transport_id: TransportId,
}

impl Producer {
    pub fn announcement(&self) -> ProducerAvailable {
        ProducerAvailable {
            producer_id: self.id.clone(),
            peer_id: self.peer_id.clone(),
            kind: self.kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumer {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub peer_id: PeerId,
    pub kind: MediaKind,
    pub paused: bool,
    pub transport_id: TransportId,
}

pub struct Peer {
    pub id: PeerId,
    pub name: String,
    pub is_host: bool,
    transports: TransportSlots,
    producers: HashMap<ProducerId, Producer>,
    consumers: HashMap<ConsumerId, Consumer>,
}

impl Peer {
    pub fn new(id: PeerId, name: String, is_host: bool) -> Self {
        Self {
            id,
            name,
            is_host,
            transports: TransportSlots::default(),
            producers: HashMap::new(),
            consumers: HashMap::new(),
        }
    }

    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            is_host: self.is_host,
        }
    }

    pub fn transport(&self, direction: Direction) -> Option<&TransportSession> {
        self.transports.get(direction)
    }

    pub fn producers(&self) -> impl Iterator<Item = &Producer> {
        self.producers.values()
    }

    pub fn producer(&self, id: &ProducerId) -> Option<&Producer> {
        self.producers.get(id)
    }

    pub fn consumers(&self) -> impl Iterator<Item = &Consumer> {
        self.consumers.values()
    }

    pub fn consumer(&self, id: &ConsumerId) -> Option<&Consumer> {
        self.consumers.get(id)
    }

    pub(crate) fn transports_mut(&mut self) -> &mut TransportSlots {
        &mut self.transports
    }

    /// Handle of the transport a producer or consumer lives on.
    pub(crate) fn handle_for(&self, transport_id: &TransportId) -> Option<Arc<dyn SfuTransport>> {
        self.transports.by_id(transport_id).map(TransportSession::handle)
    }

    pub(crate) fn insert_producer(&mut self, producer: Producer) {
        self.producers.insert(producer.id.clone(), producer);
    }

    pub(crate) fn remove_producer(&mut self, id: &ProducerId) -> Option<Producer> {
        self.producers.remove(id)
    }

    pub(crate) fn insert_consumer(&mut self, consumer: Consumer) {
        self.consumers.insert(consumer.id.clone(), consumer);
    }

    pub(crate) fn consumer_mut(&mut self, id: &ConsumerId) -> Option<&mut Consumer> {
        self.consumers.get_mut(id)
    }

    /// Drops every producer and consumer that lived on `transport_id`.
    pub(crate) fn drain_transport(
        &mut self,
        transport_id: &TransportId,
    ) -> (Vec<Producer>, Vec<Consumer>) {
        let producer_ids: Vec<ProducerId> = self
            .producers
            .values()
            .filter(|p| &p.transport_id == transport_id)
            .map(|p| p.id.clone())
            .collect();
        let consumer_ids: Vec<ConsumerId> = self
            .consumers
            .values()
            .filter(|c| &c.transport_id == transport_id)
            .map(|c| c.id.clone())
            .collect();

        let producers = producer_ids
            .iter()
            .filter_map(|id| self.producers.remove(id))
            .collect();
        let consumers = consumer_ids
            .iter()
            .filter_map(|id| self.consumers.remove(id))
            .collect();
        (producers, consumers)
    }

    /// Removes consumers fed by any of `producer_ids`, paired with the
    /// transport handle needed to close them engine-side.
    pub(crate) fn detach_consumers_of(
        &mut self,
        producer_ids: &[ProducerId],
    ) -> Vec<(Consumer, Option<Arc<dyn SfuTransport>>)> {
        let doomed: Vec<ConsumerId> = self
            .consumers
            .values()
            .filter(|c| producer_ids.contains(&c.producer_id))
            .map(|c| c.id.clone())
            .collect();

        let removed: Vec<Consumer> = doomed
            .iter()
            .filter_map(|id| self.consumers.remove(id))
            .collect();

        removed
            .into_iter()
            .map(|consumer| {
                let handle = self.handle_for(&consumer.transport_id);
                (consumer, handle)
            })
            .collect()
    }

    /// Empties the peer, returning its transports, producers and consumers.
    pub(crate) fn dismantle(&mut self) -> (Vec<TransportSession>, Vec<Producer>, Vec<Consumer>) {
        let transports = self.transports.take_all();
        let producers = self.producers.drain().map(|(_, p)| p).collect();
        let consumers = self.consumers.drain().map(|(_, c)| c).collect();
        (transports, producers, consumers)
    }
}
