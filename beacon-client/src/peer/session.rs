use crate::peer::{PeerConnection, SessionId};
use beacon_core::{ConnectionState, PeerId, SignalingState};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    StreamerSide,
    ViewerSide,
}

pub struct PeerSession {
    pub remote_id: PeerId,
    pub role: Role,
    pub id: SessionId,
    pub connection: Arc<dyn PeerConnection>,
    pub connection_state: ConnectionState,
    /// Whether a remote stream has already been handed to the renderer.
    pub stream_surfaced: bool,
}

impl PeerSession {
    pub fn new(
        remote_id: PeerId,
        role: Role,
        id: SessionId,
        connection: Arc<dyn PeerConnection>,
    ) -> Self {
        Self {
            remote_id,
            role,
            id,
            connection,
            connection_state: ConnectionState::New,
            stream_surfaced: false,
        }
    }

    pub fn signaling_state(&self) -> SignalingState {
        self.connection.signaling_state()
    }

    pub fn is_terminal(&self) -> bool {
        self.connection_state.is_terminal()
    }
}
