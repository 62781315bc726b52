use crate::signaling::SignalingOutput;
use async_trait::async_trait;
use conclave_core::{PeerId, RoomId, ServerMessage};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Default)]
struct Gate {
    open: HashSet<RoomId>,
    held: Vec<(RoomId, ServerMessage)>,
}

struct Connection {
    tx: mpsc::UnboundedSender<ServerMessage>,
    gate: Mutex<Gate>,
}

impl Connection {
    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, peer_id: &PeerId, message: ServerMessage) {
        if self.tx.send(message).is_err() {
            debug!(peer_id = %peer_id, "Connection writer gone, message dropped");
        }
    }
}

/// Outbound queues of every live connection, with a per-room gate that holds
/// room notifications until the peer's join for that room is acknowledged.
#[derive(Clone, Default)]
pub struct ConnectionHub {
    connections: Arc<DashMap<PeerId, Arc<Connection>>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns the stream its writer drains.
    pub fn register(&self, peer_id: PeerId) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Arc::new(Connection {
            tx,
            gate: Mutex::new(Gate::default()),
        });
        if self.connections.insert(peer_id.clone(), connection).is_some() {
            warn!(peer_id = %peer_id, "Connection registered twice, replacing");
        }
        rx
    }

    pub fn unregister(&self, peer_id: &PeerId) {
        self.connections.remove(peer_id);
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.connections.contains_key(peer_id)
    }

    fn connection(&self, peer_id: &PeerId) -> Option<Arc<Connection>> {
        self.connections.get(peer_id).map(|c| Arc::clone(c.value()))
    }
}

#[async_trait]
impl SignalingOutput for ConnectionHub {
    async fn send(&self, peer_id: &PeerId, message: ServerMessage) {
        match self.connection(peer_id) {
            Some(connection) => connection.deliver(peer_id, message),
            None => debug!(peer_id = %peer_id, "Send to unknown connection"),
        }
    }

    async fn broadcast(&self, room_id: &RoomId, recipients: &[PeerId], message: ServerMessage) {
        for peer_id in recipients {
            let Some(connection) = self.connection(peer_id) else {
                continue;
            };
            let mut gate = connection.gate();
            if gate.open.contains(room_id) {
                connection.deliver(peer_id, message.clone());
            } else {
                gate.held.push((room_id.clone(), message.clone()));
            }
        }
    }

    async fn open(&self, peer_id: &PeerId, room_id: &RoomId) {
        let Some(connection) = self.connection(peer_id) else {
            return;
        };
        let mut gate = connection.gate();
        gate.open.insert(room_id.clone());

        let held = std::mem::take(&mut gate.held);
        let (ready, still_held): (Vec<_>, Vec<_>) =
            held.into_iter().partition(|(room, _)| room == room_id);
        gate.held = still_held;

        if !ready.is_empty() {
            debug!(peer_id = %peer_id, room_id = %room_id, count = ready.len(), "Releasing held notifications");
        }
        for (_, message) in ready {
            connection.deliver(peer_id, message);
        }
    }

    async fn close(&self, peer_id: &PeerId, room_id: &RoomId) {
        let Some(connection) = self.connection(peer_id) else {
            return;
        };
        let mut gate = connection.gate();
        gate.open.remove(room_id);
        gate.held.retain(|(room, _)| room != room_id);
    }
}
