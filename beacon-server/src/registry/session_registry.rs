use crate::registry::Room;
use beacon_core::{PeerId, RoomId, SignalingError};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reverse index entry: which room a peer hosts and which one it watches.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Membership {
    hosting: Option<RoomId>,
    watching: Option<RoomId>,
}

impl Membership {
    fn is_empty(&self) -> bool {
        self.hosting.is_none() && self.watching.is_none()
    }
}

/// Outcome of `create_room`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomCreated {
    pub room_id: RoomId,
    /// Viewers of a room this call displaced (the streamer's previous room,
    /// or the previous holder of the fixed development identifier).
    pub orphaned_viewers: Vec<PeerId>,
}

/// Outcome of a successful `join_room`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAck {
    pub room_id: RoomId,
    pub streamer_id: PeerId,
    /// Streamer of the room the viewer was moved out of, if any.
    pub previous_streamer: Option<PeerId>,
    /// Whether the stream is paused at the time of joining.
    pub paused: bool,
}

struct RegistryInner {
    rooms: DashMap<RoomId, Room>,
    memberships: DashMap<PeerId, Membership>,
    dev_mode: bool,
}

/// Authoritative room table.
///
/// Rooms live in a sharded map, so mutations of one room are serialized by its
/// shard lock while unrelated rooms proceed concurrently. No method holds a
/// `memberships` guard while touching `rooms`; the reverse order is allowed.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(dev_mode: bool) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                rooms: DashMap::new(),
                memberships: DashMap::new(),
                dev_mode,
            }),
        }
    }

    pub fn create_room(&self, streamer_id: &PeerId) -> RoomCreated {
        let room_id = if self.inner.dev_mode {
            RoomId::dev()
        } else {
            RoomId::new()
        };

        let mut orphaned_viewers = Vec::new();

        if let Some(previous) = self.take_hosting(streamer_id) {
            info!(streamer = %streamer_id, room = %previous, "Streamer replaced its room");
            orphaned_viewers.extend(self.evict_room(&previous));
        }

        let room = Room::new(room_id.clone(), streamer_id.clone());
        if let Some(displaced) = self.inner.rooms.insert(room_id.clone(), room) {
            warn!(room = %room_id, old_streamer = %displaced.streamer_id, "Room identifier reused, evicting previous room");
            self.clear_hosting(&displaced.streamer_id, &room_id);
            for viewer_id in displaced.viewer_ids {
                self.clear_watching(&viewer_id, &room_id);
                orphaned_viewers.push(viewer_id);
            }
        }

        self.inner
            .memberships
            .entry(streamer_id.clone())
            .or_default()
            .hosting = Some(room_id.clone());

        info!(streamer = %streamer_id, room = %room_id, "Room created");
        RoomCreated {
            room_id,
            orphaned_viewers,
        }
    }

    /// Adds `viewer_id` to the room. Joining a room the viewer is already in
    /// succeeds without changing anything; joining another room moves it.
    pub fn join_room(&self, room_id: &RoomId, viewer_id: &PeerId) -> Result<JoinAck, SignalingError> {
        if !self.inner.rooms.contains_key(room_id) {
            return Err(SignalingError::RoomNotFound);
        }

        let previous_streamer = match self.watched_room(viewer_id) {
            Some(current) if current != *room_id => self.remove_viewer(viewer_id),
            _ => None,
        };

        let mut room = self
            .inner
            .rooms
            .get_mut(room_id)
            .ok_or(SignalingError::RoomNotFound)?;

        if !room.viewer_ids.insert(viewer_id.clone()) {
            debug!(viewer = %viewer_id, room = %room_id, "Viewer re-joined room");
        }

        self.inner
            .memberships
            .entry(viewer_id.clone())
            .or_default()
            .watching = Some(room_id.clone());

        Ok(JoinAck {
            room_id: room_id.clone(),
            streamer_id: room.streamer_id.clone(),
            previous_streamer,
            paused: room.paused,
        })
    }

    /// Evicts the room hosted by `streamer_id` and returns its viewers.
    pub fn remove_streamer(&self, streamer_id: &PeerId) -> Vec<PeerId> {
        let Some(room_id) = self.take_hosting(streamer_id) else {
            return Vec::new();
        };
        info!(streamer = %streamer_id, room = %room_id, "Removing room of departed streamer");
        self.evict_room(&room_id)
    }

    /// Removes the viewer from whichever room contains it and returns that
    /// room's streamer.
    pub fn remove_viewer(&self, viewer_id: &PeerId) -> Option<PeerId> {
        let room_id = self.take_watching(viewer_id)?;
        let mut room = self.inner.rooms.get_mut(&room_id)?;

        room.viewer_ids
            .remove(viewer_id)
            .then(|| room.streamer_id.clone())
    }

    /// Records the streamer's pause intent and returns the viewers to notify.
    /// Unknown rooms and requests from anyone but the room's streamer change
    /// nothing and yield `None`.
    pub fn set_paused(&self, room_id: &RoomId, streamer_id: &PeerId, paused: bool) -> Option<Vec<PeerId>> {
        let mut room = self.inner.rooms.get_mut(room_id)?;
        if room.streamer_id != *streamer_id {
            return None;
        }
        room.paused = paused;
        Some(room.viewer_ids.iter().cloned().collect())
    }

    pub fn room(&self, room_id: &RoomId) -> Option<Room> {
        self.inner.rooms.get(room_id).map(|room| room.clone())
    }

    pub fn room_count(&self) -> usize {
        self.inner.rooms.len()
    }

    pub fn hosted_room(&self, peer_id: &PeerId) -> Option<RoomId> {
        self.inner
            .memberships
            .get(peer_id)
            .and_then(|m| m.hosting.clone())
    }

    pub fn watched_room(&self, peer_id: &PeerId) -> Option<RoomId> {
        self.inner
            .memberships
            .get(peer_id)
            .and_then(|m| m.watching.clone())
    }

    fn evict_room(&self, room_id: &RoomId) -> Vec<PeerId> {
        let Some((_, room)) = self.inner.rooms.remove(room_id) else {
            return Vec::new();
        };

        let viewers: Vec<PeerId> = room.viewer_ids.into_iter().collect();
        for viewer_id in &viewers {
            self.clear_watching(viewer_id, room_id);
        }
        viewers
    }

    fn take_hosting(&self, peer_id: &PeerId) -> Option<RoomId> {
        let taken = self.inner.memberships.get_mut(peer_id)?.hosting.take();
        self.inner.memberships.remove_if(peer_id, |_, m| m.is_empty());
        taken
    }

    fn take_watching(&self, peer_id: &PeerId) -> Option<RoomId> {
        let taken = self.inner.memberships.get_mut(peer_id)?.watching.take();
        self.inner.memberships.remove_if(peer_id, |_, m| m.is_empty());
        taken
    }

    fn clear_hosting(&self, peer_id: &PeerId, room_id: &RoomId) {
        if let Some(mut m) = self.inner.memberships.get_mut(peer_id) {
            if m.hosting.as_ref() == Some(room_id) {
                m.hosting = None;
            }
        }
        self.inner.memberships.remove_if(peer_id, |_, m| m.is_empty());
    }

    fn clear_watching(&self, peer_id: &PeerId, room_id: &RoomId) {
        if let Some(mut m) = self.inner.memberships.get_mut(peer_id) {
            if m.watching.as_ref() == Some(room_id) {
                m.watching = None;
            }
        }
        self.inner.memberships.remove_if(peer_id, |_, m| m.is_empty());
    }
}
