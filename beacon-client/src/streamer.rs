use crate::config::ClientConfig;
use crate::media::{LocalMedia, MediaCapture};
use crate::negotiation::{Applied, NegotiationCoordinator, NegotiationOutcome};
use crate::peer::{PeerConnectionFactory, PeerConnectionManager, PeerEvent, Role};
use crate::reconnect::sleep_until_deadline;
use crate::signaling::{SignalingOutput, TransportEvent};
use crate::status::StreamerStatus;
use beacon_core::{
    ClientError, ConnectionState, ConnectionTerminal, PeerId, RoomId, ServerMessage,
    SignalingError,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

enum StreamerCommand {
    Start {
        reply: oneshot::Sender<Result<RoomId, ClientError>>,
    },
    Pause,
    Resume {
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Stop,
}

struct PendingCreate {
    reply: Option<oneshot::Sender<Result<RoomId, ClientError>>>,
    deadline: Instant,
}

/// Control handle for a running streamer.
pub struct StreamerHandle {
    commands: mpsc::UnboundedSender<StreamerCommand>,
    status: watch::Receiver<StreamerStatus>,
    task: JoinHandle<()>,
}

impl StreamerHandle {
    /// Acquires local media and creates a room. Resolves with the room id
    /// once the relay confirms it.
    pub async fn start(&self) -> Result<RoomId, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(StreamerCommand::Start { reply });
        rx.await.unwrap_or(Err(ConnectionTerminal::Closed.into()))
    }

    /// Stops local media and tells viewers the stream is paused. Sessions
    /// and room membership are kept.
    pub fn pause(&self) {
        self.send(StreamerCommand::Pause);
    }

    /// Re-acquires media and renegotiates with every known viewer.
    pub async fn resume(&self) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(StreamerCommand::Resume { reply });
        rx.await.unwrap_or(Err(ConnectionTerminal::Closed.into()))
    }

    /// Tears everything down and waits for the actor to finish.
    pub async fn stop(self) {
        self.send(StreamerCommand::Stop);
        if let Err(e) = self.task.await {
            error!("Streamer task failed: {e}");
        }
    }

    pub fn status(&self) -> watch::Receiver<StreamerStatus> {
        self.status.clone()
    }

    fn send(&self, cmd: StreamerCommand) {
        if self.commands.send(cmd).is_err() {
            warn!("Streamer is no longer running");
        }
    }
}

/// Streamer-side actor: owns one session per viewer and the local media
/// they share.
pub struct StreamerClient {
    config: ClientConfig,
    signaling: Arc<dyn SignalingOutput>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    factory: Arc<dyn PeerConnectionFactory>,
    capture: Arc<dyn MediaCapture>,
    command_rx: mpsc::UnboundedReceiver<StreamerCommand>,
    peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
    peers: PeerConnectionManager,
    negotiation: NegotiationCoordinator,
    media: LocalMedia,
    status: watch::Sender<StreamerStatus>,
    pending_create: Option<PendingCreate>,
    peer_id: Option<PeerId>,
    room_id: Option<RoomId>,
    paused: bool,
    error: Option<ClientError>,
}

impl StreamerClient {
    pub fn spawn(
        config: ClientConfig,
        signaling: Arc<dyn SignalingOutput>,
        transport_rx: mpsc::Receiver<TransportEvent>,
        factory: Arc<dyn PeerConnectionFactory>,
        capture: Arc<dyn MediaCapture>,
    ) -> StreamerHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(StreamerStatus::default());

        if !config.ice_servers.is_empty() {
            factory.set_ice_servers(config.ice_servers.clone());
        }

        let client = Self {
            peers: PeerConnectionManager::new(Role::StreamerSide, factory.clone(), peer_tx),
            negotiation: NegotiationCoordinator::new(signaling.clone()),
            config,
            signaling,
            transport_rx,
            factory,
            capture,
            command_rx,
            peer_rx,
            media: LocalMedia::default(),
            status: status_tx,
            pending_create: None,
            peer_id: None,
            room_id: None,
            paused: false,
            error: None,
        };

        let task = tokio::spawn(client.run());
        StreamerHandle {
            commands: command_tx,
            status: status_rx,
            task,
        }
    }

    async fn run(mut self) {
        info!("Streamer event loop started");

        loop {
            let create_deadline = self.pending_create.as_ref().map(|p| p.deadline);

            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(StreamerCommand::Stop) | None => break,
                        Some(c) => self.handle_command(c).await,
                    }
                }

                evt = self.transport_rx.recv() => {
                    match evt {
                        Some(e) => self.handle_transport_event(e).await,
                        None => {
                            warn!("Signaling transport closed");
                            break;
                        }
                    }
                }

                Some(evt) = self.peer_rx.recv() => self.handle_peer_event(evt).await,

                Some(outcome) = self.negotiation.next() => self.handle_outcome(outcome),

                _ = sleep_until_deadline(create_deadline) => self.create_timed_out(),
            }
        }

        self.shutdown().await;
        info!("Streamer event loop finished");
    }

    async fn handle_command(&mut self, cmd: StreamerCommand) {
        match cmd {
            StreamerCommand::Start { reply } => self.start(reply).await,
            StreamerCommand::Pause => self.pause().await,
            StreamerCommand::Resume { reply } => {
                let result = self.resume().await;
                let _ = reply.send(result);
            }
            StreamerCommand::Stop => {}
        }
    }

    async fn start(&mut self, reply: oneshot::Sender<Result<RoomId, ClientError>>) {
        if let Some(room_id) = &self.room_id {
            let _ = reply.send(Ok(room_id.clone()));
            return;
        }

        match self.capture.acquire().await {
            Ok(source) => self.media.set(source),
            Err(e) => {
                warn!("Failed to acquire local media: {e}");
                let err = ClientError::from(e);
                self.set_error(err.clone());
                let _ = reply.send(Err(err));
                return;
            }
        }

        self.paused = false;
        self.request_room(Some(reply)).await;
        self.publish();
    }

    async fn request_room(&mut self, reply: Option<oneshot::Sender<Result<RoomId, ClientError>>>) {
        self.signaling.create_room().await;
        self.pending_create = Some(PendingCreate {
            reply,
            deadline: Instant::now() + self.config.create_timeout,
        });
    }

    async fn pause(&mut self) {
        let Some(room_id) = self.room_id.clone() else {
            debug!("Pause ignored, no room");
            return;
        };
        if self.paused {
            return;
        }

        self.media.release();
        self.paused = true;
        self.signaling.pause_stream(room_id.clone()).await;
        info!(room_id = %room_id, viewers = self.peers.len(), "Stream paused");
        self.publish();
    }

    async fn resume(&mut self) -> Result<(), ClientError> {
        let Some(room_id) = self.room_id.clone() else {
            debug!("Resume ignored, no room");
            return Ok(());
        };
        if !self.paused {
            return Ok(());
        }

        match self.capture.acquire().await {
            Ok(source) => self.media.set(source),
            Err(e) => {
                warn!("Failed to re-acquire local media: {e}");
                let err = ClientError::from(e);
                self.set_error(err.clone());
                return Err(err);
            }
        }
        self.paused = false;
        self.error = None;

        self.signaling.resume_stream(room_id.clone()).await;

        let viewers = self.peers.remote_ids();
        info!(room_id = %room_id, viewers = viewers.len(), "Stream resumed, renegotiating");
        for viewer in viewers {
            self.offer_to(viewer);
        }

        self.publish();
        Ok(())
    }

    fn offer_to(&mut self, viewer: PeerId) {
        let Some(connection) = self.peers.connection(&viewer) else {
            return;
        };
        if let Err(e) = self
            .negotiation
            .create_offer(viewer.clone(), connection, self.media.tracks())
        {
            debug!(viewer = %viewer, "Offer deferred: {e}");
        }
    }

    async fn handle_transport_event(&mut self, evt: TransportEvent) {
        match evt {
            TransportEvent::Message(msg) => self.handle_message(msg).await,
            TransportEvent::Reconnected => {
                let Some(room_id) = self.room_id.take() else {
                    return;
                };
                // The relay dropped the old room with our old identity.
                info!(room_id = %room_id, "Signaling reconnected, recreating room");
                self.peers.close_all().await;
                self.negotiation.reset();
                self.request_room(None).await;
                self.publish();
            }
            TransportEvent::Closed => warn!("Signaling connection lost"),
        }
    }

    async fn handle_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Welcome { peer_id } => {
                debug!(peer_id = %peer_id, "Assigned identity");
                self.peer_id = Some(peer_id);
                self.publish();
            }
            ServerMessage::IceConfig { ice_servers } => {
                self.factory.set_ice_servers(ice_servers);
            }
            ServerMessage::RoomCreated { room_id } => {
                info!(room_id = %room_id, "Room created");
                if let Some(pending) = self.pending_create.take()
                    && let Some(reply) = pending.reply
                {
                    let _ = reply.send(Ok(room_id.clone()));
                }
                if self.paused {
                    // A recreated room starts unpaused on the relay.
                    self.signaling.pause_stream(room_id.clone()).await;
                }
                self.room_id = Some(room_id);
                self.error = None;
                self.publish();
            }
            ServerMessage::ViewerJoined { viewer_id } => {
                if self.room_id.is_none() {
                    return;
                }
                info!(viewer = %viewer_id, "Viewer joined");

                if let Err(e) = self.peers.create_session(&viewer_id).await {
                    error!(viewer = %viewer_id, "Failed to create session: {e:#}");
                    return;
                }
                self.offer_to(viewer_id);
                self.publish();
            }
            ServerMessage::ViewerLeft { viewer_id } => {
                info!(viewer = %viewer_id, "Viewer left");
                self.peers.close_session(&viewer_id).await;
                self.publish();
            }
            ServerMessage::Answer { answer, sender } => {
                let Some(connection) = self.peers.connection(&sender) else {
                    debug!(viewer = %sender, "Answer for unknown session dropped");
                    return;
                };
                if !self.negotiation.begin(&sender) {
                    debug!(viewer = %sender, "Answer already being applied, dropped");
                    return;
                }
                self.negotiation.handle_answer(sender, connection, answer);
            }
            ServerMessage::IceCandidate { candidate, sender } => {
                let Some(connection) = self.peers.connection(&sender) else {
                    return;
                };
                self.negotiation
                    .handle_ice_candidate(sender, connection, candidate);
            }
            other => debug!("Ignoring {other:?}"),
        }
    }

    async fn handle_peer_event(&mut self, evt: PeerEvent) {
        match evt {
            PeerEvent::StateChanged {
                remote,
                session,
                state,
            } => {
                if !self.peers.record_state(&remote, session, state) {
                    return;
                }
                info!(viewer = %remote, %state, "Viewer connection state changed");

                if matches!(state, ConnectionState::Failed | ConnectionState::Closed) {
                    self.peers.close_session(&remote).await;
                }
                if self.peers.aggregate_state() == ConnectionState::Connected {
                    self.error = None;
                }
                self.publish();
            }
            PeerEvent::LocalCandidate {
                remote,
                session,
                candidate,
            } => {
                if self.peers.is_current(&remote, session) {
                    self.signaling.send_ice(remote, candidate).await;
                }
            }
            PeerEvent::RemoteStream { remote, .. } => {
                debug!(viewer = %remote, "Ignoring remote stream from viewer");
            }
        }
    }

    fn handle_outcome(&mut self, outcome: NegotiationOutcome) {
        match outcome.result {
            Ok(Applied::Done) => debug!(viewer = %outcome.remote, kind = ?outcome.kind, "Negotiation step done"),
            Ok(Applied::Skipped) => debug!(viewer = %outcome.remote, kind = ?outcome.kind, "Negotiation step skipped"),
            Err(e) => {
                warn!(viewer = %outcome.remote, kind = ?outcome.kind, "Negotiation failed: {e}");
                self.set_error(e);
            }
        }
    }

    fn create_timed_out(&mut self) {
        let Some(pending) = self.pending_create.take() else {
            return;
        };
        warn!("Room creation timed out");
        let err = ClientError::from(SignalingError::CreateTimeout);
        if let Some(reply) = pending.reply {
            let _ = reply.send(Err(err.clone()));
        }
        self.set_error(err);
    }

    async fn shutdown(&mut self) {
        self.peers.close_all().await;
        self.negotiation.reset();
        self.media.release();
        self.pending_create = None;
        self.room_id = None;
        self.paused = false;
        self.publish();
    }

    fn set_error(&mut self, err: ClientError) {
        self.error = Some(err);
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(StreamerStatus {
            peer_id: self.peer_id.clone(),
            room_id: self.room_id.clone(),
            connection: self.peers.aggregate_state(),
            viewers: self.peers.remote_ids(),
            paused: self.paused,
            live: self.room_id.is_some() && self.media.is_ready(),
            error: self.error.clone(),
        });
    }
}
