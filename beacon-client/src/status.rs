use beacon_core::{ClientError, ConnectionState, PeerId, RoomId};
use std::fmt;

/// Snapshot published by the streamer actor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamerStatus {
    pub peer_id: Option<PeerId>,
    pub room_id: Option<RoomId>,
    pub connection: ConnectionState,
    pub viewers: Vec<PeerId>,
    pub paused: bool,
    pub live: bool,
    /// The single current error; replaced by the next one, cleared by the
    /// next successful operation.
    pub error: Option<ClientError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewerPhase {
    #[default]
    Idle,
    Joining,
    /// Joined; waiting for the streamer's offer.
    Waiting,
    Connecting,
    Watching,
    Paused,
    Reconnecting {
        attempt: u32,
    },
    Ended,
    Failed,
}

impl fmt::Display for ViewerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Not connected"),
            Self::Joining => write!(f, "Joining room..."),
            Self::Waiting => write!(f, "Waiting for stream..."),
            Self::Connecting => write!(f, "Connecting..."),
            Self::Watching => write!(f, "Watching"),
            Self::Paused => write!(f, "Stream paused"),
            Self::Reconnecting { attempt } => write!(f, "Reconnecting (attempt {attempt})..."),
            Self::Ended => write!(f, "Stream ended"),
            Self::Failed => write!(f, "Connection failed"),
        }
    }
}

/// Snapshot published by the viewer actor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewerStatus {
    pub peer_id: Option<PeerId>,
    pub room_id: Option<RoomId>,
    pub streamer_id: Option<PeerId>,
    pub connection: ConnectionState,
    pub phase: ViewerPhase,
    pub paused: bool,
    pub retry_attempt: u32,
    pub error: Option<ClientError>,
}

impl ViewerStatus {
    /// Human-readable status line.
    pub fn status_text(&self) -> String {
        self.phase.to_string()
    }
}
