use crate::media::{LocalTrack, RemoteStream};
use anyhow::Result;
use async_trait::async_trait;
use beacon_core::{
    ConnectionState, IceCandidate, IceServerConfig, PeerId, SessionDescription, SignalingState,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Generation number of a session. Events tagged with a generation that is no
/// longer current come from a replaced connection and are ignored.
pub type SessionId = u64;

/// Lifecycle callbacks of a peer connection, delivered to the owning actor.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    StateChanged {
        remote: PeerId,
        session: SessionId,
        state: ConnectionState,
    },
    LocalCandidate {
        remote: PeerId,
        session: SessionId,
        candidate: IceCandidate,
    },
    RemoteStream {
        remote: PeerId,
        session: SessionId,
        stream: RemoteStream,
    },
}

impl PeerEvent {
    pub fn remote(&self) -> &PeerId {
        match self {
            Self::StateChanged { remote, .. }
            | Self::LocalCandidate { remote, .. }
            | Self::RemoteStream { remote, .. } => remote,
        }
    }

    pub fn session(&self) -> SessionId {
        match self {
            Self::StateChanged { session, .. }
            | Self::LocalCandidate { session, .. }
            | Self::RemoteStream { session, .. } => *session,
        }
    }
}

/// One peer-to-peer media connection.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Applies a remote candidate immediately; nothing is buffered while the
    /// remote description is still missing.
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn add_track(&self, track: LocalTrack) -> Result<()>;

    /// Points the sender currently carrying `current_id` at `track`. The
    /// kinds must match; no new sender is created.
    async fn replace_track(&self, current_id: &str, track: LocalTrack) -> Result<()>;

    /// Local tracks currently sent on this connection.
    async fn local_tracks(&self) -> Vec<LocalTrack>;

    fn signaling_state(&self) -> SignalingState;

    /// Detaches lifecycle callbacks, then closes the connection.
    async fn close(&self);
}

/// Creates connections wired to emit `PeerEvent`s for `(remote, session)`.
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        remote: PeerId,
        session: SessionId,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>>;

    /// ICE servers announced by the relay, used for connections created
    /// afterwards.
    fn set_ice_servers(&self, _servers: Vec<IceServerConfig>) {}
}
