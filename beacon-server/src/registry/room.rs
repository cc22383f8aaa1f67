use beacon_core::{PeerId, RoomId};
use std::collections::HashSet;

/// One streamer and the viewers currently attached to it.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub streamer_id: PeerId,
    pub viewer_ids: HashSet<PeerId>,
    /// Last pause intent announced by the streamer.
    pub paused: bool,
}

impl Room {
    pub fn new(id: RoomId, streamer_id: PeerId) -> Self {
        Self {
            id,
            streamer_id,
            viewer_ids: HashSet::new(),
            paused: false,
        }
    }
}
