use crate::registry::SessionRegistry;
use beacon_core::{ClientMessage, IceServerConfig, PeerId, RoomId, ServerMessage};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

struct RelayInner {
    endpoints: DashMap<PeerId, mpsc::UnboundedSender<ServerMessage>>,
    registry: SessionRegistry,
    ice_servers: Vec<IceServerConfig>,
}

/// Forwards negotiation messages between peers and fans out room events.
///
/// Negotiation payloads are never inspected; the relay only rewrites the
/// `target` addressing into a `sender` annotation. Audiences for room events
/// are read from the registry at dispatch time.
#[derive(Clone)]
pub struct SignalingRelay {
    inner: Arc<RelayInner>,
}

impl SignalingRelay {
    pub fn new(registry: SessionRegistry, ice_servers: Vec<IceServerConfig>) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                endpoints: DashMap::new(),
                registry,
                ice_servers,
            }),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn get_ice_servers(&self) -> Vec<IceServerConfig> {
        self.inner.ice_servers.clone()
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.inner.endpoints.contains_key(peer_id)
    }

    /// Registers a live endpoint and greets it with its identity and the ICE
    /// servers it should use.
    pub fn connect(&self, peer_id: PeerId, tx: mpsc::UnboundedSender<ServerMessage>) {
        self.inner.endpoints.insert(peer_id.clone(), tx);

        self.send_signal(
            &peer_id,
            ServerMessage::Welcome {
                peer_id: peer_id.clone(),
            },
        );
        self.send_signal(
            &peer_id,
            ServerMessage::IceConfig {
                ice_servers: self.get_ice_servers(),
            },
        );
    }

    /// Drops the endpoint and cascades the departure through the registry.
    pub fn disconnect(&self, peer_id: &PeerId) {
        if self.inner.endpoints.remove(peer_id).is_none() {
            return;
        }

        for viewer_id in self.inner.registry.remove_streamer(peer_id) {
            self.send_signal(&viewer_id, ServerMessage::StreamerLeft);
        }

        if let Some(streamer_id) = self.inner.registry.remove_viewer(peer_id) {
            self.send_signal(
                &streamer_id,
                ServerMessage::ViewerLeft {
                    viewer_id: peer_id.clone(),
                },
            );
        }
    }

    /// Non-blocking send. Returns `false` when the peer is gone.
    pub fn send_signal(&self, peer_id: &PeerId, msg: ServerMessage) -> bool {
        let Some(endpoint) = self.inner.endpoints.get(peer_id) else {
            debug!(peer = %peer_id, "Dropping signal for disconnected peer");
            return false;
        };

        if endpoint.send(msg).is_err() {
            warn!(peer = %peer_id, "Endpoint channel closed");
            return false;
        }
        true
    }

    pub fn dispatch(&self, sender: &PeerId, msg: ClientMessage) {
        match msg {
            ClientMessage::CreateRoom => self.handle_create_room(sender),

            ClientMessage::JoinRoom { room_id } => self.handle_join_room(sender, &room_id),

            ClientMessage::Offer { offer, target } => {
                self.forward(
                    &target,
                    ServerMessage::Offer {
                        offer,
                        sender: sender.clone(),
                    },
                );
            }

            ClientMessage::Answer { answer, target } => {
                self.forward(
                    &target,
                    ServerMessage::Answer {
                        answer,
                        sender: sender.clone(),
                    },
                );
            }

            ClientMessage::IceCandidate { candidate, target } => {
                self.forward(
                    &target,
                    ServerMessage::IceCandidate {
                        candidate,
                        sender: sender.clone(),
                    },
                );
            }

            ClientMessage::PauseStream { room_id } => {
                self.handle_stream_control(sender, &room_id, true);
            }

            ClientMessage::ResumeStream { room_id } => {
                self.handle_stream_control(sender, &room_id, false);
            }
        }
    }

    fn handle_create_room(&self, sender: &PeerId) {
        let created = self.inner.registry.create_room(sender);

        for viewer_id in &created.orphaned_viewers {
            self.send_signal(viewer_id, ServerMessage::StreamerLeft);
        }

        self.send_signal(
            sender,
            ServerMessage::RoomCreated {
                room_id: created.room_id,
            },
        );
    }

    fn handle_join_room(&self, sender: &PeerId, room_id: &RoomId) {
        match self.inner.registry.join_room(room_id, sender) {
            Ok(ack) => {
                info!(viewer = %sender, room = %room_id, "Viewer joined room");

                if let Some(previous) = ack.previous_streamer {
                    self.send_signal(
                        &previous,
                        ServerMessage::ViewerLeft {
                            viewer_id: sender.clone(),
                        },
                    );
                }

                self.send_signal(
                    sender,
                    ServerMessage::RoomJoined {
                        room_id: ack.room_id,
                        streamer_id: ack.streamer_id.clone(),
                    },
                );
                if ack.paused {
                    self.send_signal(sender, ServerMessage::StreamPaused);
                }
                self.send_signal(
                    &ack.streamer_id,
                    ServerMessage::ViewerJoined {
                        viewer_id: sender.clone(),
                    },
                );
            }
            Err(e) => {
                info!(viewer = %sender, room = %room_id, "Join rejected: {}", e);
                self.send_signal(
                    sender,
                    ServerMessage::JoinFailed {
                        error: e.to_string(),
                    },
                );
            }
        }
    }

    fn forward(&self, target: &PeerId, msg: ServerMessage) {
        if !self.send_signal(target, msg) {
            debug!(target = %target, "Negotiation target gone, message dropped");
        }
    }

    fn handle_stream_control(&self, sender: &PeerId, room_id: &RoomId, paused: bool) {
        let Some(viewers) = self.inner.registry.set_paused(room_id, sender, paused) else {
            warn!(peer = %sender, room = %room_id, "Stream control for a room the sender does not host ignored");
            return;
        };

        let msg = if paused {
            ServerMessage::StreamPaused
        } else {
            ServerMessage::StreamResumed
        };
        for viewer_id in &viewers {
            self.send_signal(viewer_id, msg.clone());
        }
    }
}
