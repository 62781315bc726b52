use async_trait::async_trait;
use conclave_core::{PeerId, RoomId, ServerMessage};

/// Outbound side of signaling: how the coordinator reaches connected peers.
///
/// Room notifications go through [`broadcast`](SignalingOutput::broadcast)
/// and must be held for a peer until [`open`](SignalingOutput::open) has been
/// called for that peer and room. Replies to a peer's own requests use
/// [`send`](SignalingOutput::send), which is never held.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Deliver to one peer immediately.
    async fn send(&self, peer_id: &PeerId, message: ServerMessage);

    /// Deliver a room notification to each of `recipients`.
    async fn broadcast(&self, room_id: &RoomId, recipients: &[PeerId], message: ServerMessage);

    /// The peer's join for `room_id` is acknowledged; release what was held.
    async fn open(&self, peer_id: &PeerId, room_id: &RoomId);

    /// The peer left `room_id`; drop anything still held for it.
    async fn close(&self, peer_id: &PeerId, room_id: &RoomId);
}
