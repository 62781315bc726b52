use crate::device::RemoteTrack;
use conclave_core::{PeerId, ProducerId};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Identity of an aggregate stream. It stays the same for as long as the
/// remote peer is in the room, however its tracks change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(Uuid);

impl StreamId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Every track received from one remote peer.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStream {
    id: StreamId,
    peer_id: PeerId,
    tracks: Vec<RemoteTrack>,
}

impl RemoteStream {
    fn new(peer_id: PeerId) -> Self {
        Self {
            id: StreamId::new(),
            peer_id,
            tracks: Vec::new(),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn tracks(&self) -> &[RemoteTrack] {
        &self.tracks
    }

    pub fn track(&self, producer_id: &ProducerId) -> Option<&RemoteTrack> {
        self.tracks.iter().find(|t| &t.producer_id == producer_id)
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Remote peer id to its one aggregate stream.
#[derive(Debug, Default)]
pub struct RemoteStreams {
    streams: HashMap<PeerId, RemoteStream>,
}

impl RemoteStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// The peer's stream, created on first use and reused afterwards.
    pub fn stream_for(&mut self, peer_id: &PeerId) -> &RemoteStream {
        self.entry(peer_id)
    }

    fn entry(&mut self, peer_id: &PeerId) -> &mut RemoteStream {
        self.streams
            .entry(peer_id.clone())
            .or_insert_with(|| RemoteStream::new(peer_id.clone()))
    }

    /// Adds a track and returns the updated aggregate. A track for a
    /// producer already present replaces the old one.
    pub fn add_track(&mut self, peer_id: &PeerId, track: RemoteTrack) -> RemoteStream {
        let stream = self.entry(peer_id);
        stream.tracks.retain(|t| t.producer_id != track.producer_id);
        stream.tracks.push(track);
        stream.clone()
    }

    /// Removes the track fed by `producer_id`, wherever it is.
    pub fn remove_track(&mut self, producer_id: &ProducerId) -> Option<RemoteStream> {
        let stream = self
            .streams
            .values_mut()
            .find(|s| s.track(producer_id).is_some())?;
        stream.tracks.retain(|t| &t.producer_id != producer_id);
        Some(stream.clone())
    }

    pub fn remove_peer(&mut self, peer_id: &PeerId) -> Option<RemoteStream> {
        self.streams.remove(peer_id)
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&RemoteStream> {
        self.streams.get(peer_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteStream> {
        self.streams.values()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
