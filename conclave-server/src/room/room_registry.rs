use crate::config::RouterConfig;
use crate::engine::{EngineError, SfuEngine};
use crate::error::SignalingError;
use crate::room::{Admission, Room, Teardown};
use conclave_core::{PeerId, RoomId};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

/// A joiner can lose the race against the last peer leaving; it then starts
/// over with a fresh room.
const JOIN_ATTEMPTS: usize = 3;

type RoomSlot = Arc<OnceCell<Arc<Room>>>;

/// Every live room, keyed by id. Rooms are created on first join and
/// dropped when their last peer leaves.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    engine: Arc<dyn SfuEngine>,
    router_config: RouterConfig,
    rooms: DashMap<RoomId, RoomSlot>,
    degraded: AtomicBool,
}

impl RoomRegistry {
    pub fn new(engine: Arc<dyn SfuEngine>, router_config: RouterConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                engine,
                router_config,
                rooms: DashMap::new(),
                degraded: AtomicBool::new(false),
            }),
        }
    }

    /// Set once the engine reported itself unavailable. No room is created
    /// after that.
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::Acquire)
    }

    pub(crate) fn observe(&self, err: &SignalingError) {
        if matches!(err, SignalingError::EngineUnavailable)
            && !self.inner.degraded.swap(true, Ordering::AcqRel)
        {
            error!("Media engine unavailable, refusing new rooms");
        }
    }

    pub fn get(&self, id: &RoomId) -> Option<Arc<Room>> {
        self.inner
            .rooms
            .get(id)
            .and_then(|slot| slot.get().cloned())
    }

    pub fn contains(&self, id: &RoomId) -> bool {
        self.get(id).is_some()
    }

    /// Number of rooms that finished creation.
    pub fn len(&self) -> usize {
        self.inner
            .rooms
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds `peer_id` to `room_id`, creating the room if needed. Whoever
    /// created the room is its host.
    pub async fn join(
        &self,
        room_id: &RoomId,
        peer_id: PeerId,
        name: String,
    ) -> Result<(Arc<Room>, Admission), SignalingError> {
        for attempt in 1..=JOIN_ATTEMPTS {
            let (room, created) = self.get_or_create(room_id).await?;
            match room.add_peer(peer_id.clone(), name.clone(), created) {
                Ok(admission) => return Ok((room, admission)),
                Err(SignalingError::RoomNotFound(_)) => {
                    debug!(room_id = %room_id, attempt, "Room closed while joining, retrying");
                    self.forget(&room);
                }
                Err(e) => return Err(e),
            }
        }
        Err(SignalingError::RoomNotFound(room_id.clone()))
    }

    /// Removes a peer, closes its engine objects and, if it was the last
    /// one, destroys the room. The returned teardown is already released.
    pub async fn leave(
        &self,
        room_id: &RoomId,
        peer_id: &PeerId,
    ) -> Result<Teardown, SignalingError> {
        let room = self
            .get(room_id)
            .ok_or_else(|| SignalingError::RoomNotFound(room_id.clone()))?;

        let mut teardown = room.remove_peer(peer_id)?;
        teardown.release().await;

        if teardown.room_emptied {
            self.forget(&room);
            room.close_router().await;
            info!(room_id = %room_id, "Room destroyed");
        }
        Ok(teardown)
    }

    async fn get_or_create(&self, room_id: &RoomId) -> Result<(Arc<Room>, bool), SignalingError> {
        let slot = Arc::clone(
            self.inner
                .rooms
                .entry(room_id.clone())
                .or_default()
                .value(),
        );

        let created = AtomicBool::new(false);
        let result = slot
            .get_or_try_init(|| async {
                created.store(true, Ordering::Relaxed);
                self.create_room(room_id).await
            })
            .await;

        match result {
            Ok(room) => Ok((Arc::clone(room), created.load(Ordering::Relaxed))),
            Err(e) => {
                self.inner.rooms.remove_if(room_id, |_, existing| {
                    Arc::ptr_eq(existing, &slot) && !existing.initialized()
                });
                Err(e)
            }
        }
    }

    async fn create_room(&self, room_id: &RoomId) -> Result<Arc<Room>, SignalingError> {
        if self.is_degraded() {
            return Err(SignalingError::EngineUnavailable);
        }

        match self.inner.engine.create_router(&self.inner.router_config).await {
            Ok(router) => {
                info!(room_id = %room_id, "Room created");
                Ok(Arc::new(Room::new(room_id.clone(), router)))
            }
            Err(EngineError::Unavailable) => {
                let err = SignalingError::EngineUnavailable;
                self.observe(&err);
                Err(err)
            }
            Err(e) => {
                error!(room_id = %room_id, error = %e, "Router creation failed");
                Err(e.into())
            }
        }
    }

    /// Drops the registry entry if it still points at `room`.
    fn forget(&self, room: &Arc<Room>) {
        self.inner.rooms.remove_if(room.id(), |_, existing| {
            existing.get().is_some_and(|current| Arc::ptr_eq(current, room))
        });
    }
}
