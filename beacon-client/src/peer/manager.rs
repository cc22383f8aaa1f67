use crate::media::LocalTrack;
use crate::peer::{PeerConnection, PeerConnectionFactory, PeerEvent, PeerSession, Role, SessionId};
use anyhow::Result;
use beacon_core::{ConnectionState, PeerId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Exclusive owner of a client's peer sessions.
///
/// The streamer side keeps one session per viewer; the viewer side keeps at
/// most one, to its current streamer.
pub struct PeerConnectionManager {
    role: Role,
    factory: Arc<dyn PeerConnectionFactory>,
    events: mpsc::UnboundedSender<PeerEvent>,
    sessions: HashMap<PeerId, PeerSession>,
    next_session: SessionId,
}

impl PeerConnectionManager {
    pub fn new(
        role: Role,
        factory: Arc<dyn PeerConnectionFactory>,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        Self {
            role,
            factory,
            events,
            sessions: HashMap::new(),
            next_session: 1,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Creates a fresh session for `remote`, closing any previous one first.
    pub async fn create_session(&mut self, remote: &PeerId) -> Result<Arc<dyn PeerConnection>> {
        if let Some(existing) = self.sessions.remove(remote) {
            info!(remote = %remote, session = existing.id, "Replacing existing session");
            existing.connection.close().await;
        }

        if self.role == Role::ViewerSide {
            self.close_all().await;
        }

        let id = self.next_session;
        self.next_session += 1;

        let connection = self
            .factory
            .create(remote.clone(), id, self.events.clone())
            .await?;

        debug!(remote = %remote, session = id, "Session created");
        self.sessions.insert(
            remote.clone(),
            PeerSession::new(remote.clone(), self.role, id, connection.clone()),
        );
        Ok(connection)
    }

    /// Reuses a live session for `remote`, or replaces a missing or terminal
    /// one.
    pub async fn ensure_session(&mut self, remote: &PeerId) -> Result<Arc<dyn PeerConnection>> {
        match self.sessions.get(remote) {
            Some(session) if !session.is_terminal() => Ok(session.connection.clone()),
            Some(session) => {
                info!(remote = %remote, state = %session.connection_state, "Discarding terminal session");
                self.create_session(remote).await
            }
            None => self.create_session(remote).await,
        }
    }

    pub async fn close_session(&mut self, remote: &PeerId) -> bool {
        let Some(session) = self.sessions.remove(remote) else {
            return false;
        };
        debug!(remote = %remote, session = session.id, "Closing session");
        session.connection.close().await;
        true
    }

    pub async fn close_all(&mut self) {
        for (_, session) in self.sessions.drain() {
            session.connection.close().await;
        }
    }

    pub fn session(&self, remote: &PeerId) -> Option<&PeerSession> {
        self.sessions.get(remote)
    }

    pub fn session_mut(&mut self, remote: &PeerId) -> Option<&mut PeerSession> {
        self.sessions.get_mut(remote)
    }

    pub fn connection(&self, remote: &PeerId) -> Option<Arc<dyn PeerConnection>> {
        self.sessions.get(remote).map(|s| s.connection.clone())
    }

    /// Whether an event tagged `(remote, session)` belongs to a live session.
    pub fn is_current(&self, remote: &PeerId, session: SessionId) -> bool {
        self.sessions.get(remote).is_some_and(|s| s.id == session)
    }

    /// Records a state transition. Returns `false` for stale events.
    pub fn record_state(&mut self, remote: &PeerId, session: SessionId, state: ConnectionState) -> bool {
        match self.sessions.get_mut(remote) {
            Some(s) if s.id == session => {
                s.connection_state = state;
                true
            }
            _ => false,
        }
    }

    pub fn aggregate_state(&self) -> ConnectionState {
        match self.role {
            Role::StreamerSide => {
                ConnectionState::aggregate(self.sessions.values().map(|s| s.connection_state))
            }
            Role::ViewerSide => self
                .sessions
                .values()
                .next()
                .map(|s| s.connection_state)
                .unwrap_or_default(),
        }
    }

    pub fn remote_ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Track changes made by `attach_tracks`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachedTracks {
    pub added: usize,
    pub replaced: usize,
}

/// Sends `tracks` on `connection` without growing its sender list on
/// renegotiation. A track already sent is left alone; a sender whose track is
/// no longer in `tracks` takes the new track of the same kind; only what is
/// left gets a new sender.
pub async fn attach_tracks(
    connection: &dyn PeerConnection,
    tracks: &[LocalTrack],
) -> Result<AttachedTracks> {
    let sent = connection.local_tracks().await;
    let wanted: HashSet<&str> = tracks.iter().map(|t| t.id()).collect();
    let mut stale: Vec<&LocalTrack> = sent.iter().filter(|t| !wanted.contains(t.id())).collect();
    let mut attached = AttachedTracks::default();

    for track in tracks {
        if sent.iter().any(|t| t.id() == track.id()) {
            continue;
        }
        match stale.iter().position(|t| t.kind() == track.kind()) {
            Some(pos) => {
                let previous = stale.remove(pos);
                connection.replace_track(previous.id(), track.clone()).await?;
                attached.replaced += 1;
            }
            None => {
                connection.add_track(track.clone()).await?;
                attached.added += 1;
            }
        }
    }
    Ok(attached)
}
