use crate::room::RoomRegistry;
use crate::signaling::{ConnectionHub, PeerSession, SignalingCoordinator, SignalingOutput};
use conclave_core::{ClientMessage, PeerId, ServerMessage, Welcome};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

struct SignalingInner {
    hub: ConnectionHub,
    coordinator: SignalingCoordinator,
}

/// Everything a connection handler needs: the outbound hub and the
/// coordinator that writes to it.
#[derive(Clone)]
pub struct SignalingService {
    inner: Arc<SignalingInner>,
}

impl SignalingService {
    pub fn new(registry: RoomRegistry) -> Self {
        let hub = ConnectionHub::new();
        let coordinator = SignalingCoordinator::new(registry, Arc::new(hub.clone()));
        Self {
            inner: Arc::new(SignalingInner { hub, coordinator }),
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        self.inner.coordinator.registry()
    }

    /// Registers a connection and queues its `welcome`. The receiver yields
    /// everything that has to be written to the socket.
    pub async fn connect(
        &self,
        peer_id: PeerId,
    ) -> (PeerSession, mpsc::UnboundedReceiver<ServerMessage>) {
        let rx = self.inner.hub.register(peer_id.clone());
        self.inner
            .hub
            .send(
                &peer_id,
                ServerMessage::Welcome(Welcome {
                    peer_id: peer_id.clone(),
                }),
            )
            .await;
        (PeerSession::new(peer_id), rx)
    }

    /// Decodes and handles one text frame. Frames that do not decode are
    /// logged and dropped.
    pub async fn handle_text(&self, session: &mut PeerSession, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.inner.coordinator.handle(session, message).await,
            Err(e) => warn!(peer_id = %session.peer_id(), error = %e, "Undecodable frame ignored"),
        }
    }

    pub async fn disconnect(&self, session: &mut PeerSession) {
        self.inner.coordinator.disconnect(session).await;
        self.inner.hub.unregister(session.peer_id());
    }
}
