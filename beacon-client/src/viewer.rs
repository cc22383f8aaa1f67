use crate::config::ClientConfig;
use crate::media::RenderSurface;
use crate::negotiation::{Applied, NegotiationCoordinator, NegotiationOutcome};
use crate::peer::{PeerConnectionFactory, PeerConnectionManager, PeerEvent, Role};
use crate::reconnect::{ReconnectionController, RetryDecision, sleep_until_deadline};
use crate::signaling::{SignalingOutput, TransportEvent};
use crate::status::{ViewerPhase, ViewerStatus};
use beacon_core::{
    ClientError, ConnectionState, ConnectionTerminal, NegotiationError, PeerId, RoomId,
    ServerMessage, SessionDescription, SignalingError,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

type JoinReply = oneshot::Sender<Result<PeerId, ClientError>>;

enum ViewerCommand {
    Join { room_id: RoomId, reply: JoinReply },
    Reconnect,
    Leave,
}

struct PendingJoin {
    reply: Option<JoinReply>,
    /// Issued by the retry timer or the transport rather than by the user.
    automatic: bool,
    deadline: Instant,
}

/// Control handle for a running viewer.
pub struct ViewerHandle {
    commands: mpsc::UnboundedSender<ViewerCommand>,
    status: watch::Receiver<ViewerStatus>,
    task: JoinHandle<()>,
}

impl ViewerHandle {
    /// Joins `room_id`. Resolves with the streamer's identity.
    pub async fn join(&self, room_id: RoomId) -> Result<PeerId, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(ViewerCommand::Join { room_id, reply });
        rx.await.unwrap_or(Err(ConnectionTerminal::Closed.into()))
    }

    /// Drops the current session and rejoins right away, starting the retry
    /// count over.
    pub fn reconnect(&self) {
        self.send(ViewerCommand::Reconnect);
    }

    /// Tears everything down and waits for the actor to finish.
    pub async fn leave(self) {
        self.send(ViewerCommand::Leave);
        if let Err(e) = self.task.await {
            error!("Viewer task failed: {e}");
        }
    }

    pub fn status(&self) -> watch::Receiver<ViewerStatus> {
        self.status.clone()
    }

    fn send(&self, cmd: ViewerCommand) {
        if self.commands.send(cmd).is_err() {
            warn!("Viewer is no longer running");
        }
    }
}

/// Viewer-side actor: at most one session, to the room's streamer, plus
/// bounded automatic recovery.
pub struct ViewerClient {
    config: ClientConfig,
    signaling: Arc<dyn SignalingOutput>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    factory: Arc<dyn PeerConnectionFactory>,
    surface: Arc<dyn RenderSurface>,
    command_rx: mpsc::UnboundedReceiver<ViewerCommand>,
    peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
    peers: PeerConnectionManager,
    negotiation: NegotiationCoordinator,
    retry: ReconnectionController,
    status: watch::Sender<ViewerStatus>,
    pending_join: Option<PendingJoin>,
    peer_id: Option<PeerId>,
    room_id: Option<RoomId>,
    streamer_id: Option<PeerId>,
    phase: ViewerPhase,
    paused: bool,
    surface_attached: bool,
    error: Option<ClientError>,
}

impl ViewerClient {
    pub fn spawn(
        config: ClientConfig,
        signaling: Arc<dyn SignalingOutput>,
        transport_rx: mpsc::Receiver<TransportEvent>,
        factory: Arc<dyn PeerConnectionFactory>,
        surface: Arc<dyn RenderSurface>,
    ) -> ViewerHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ViewerStatus::default());

        if !config.ice_servers.is_empty() {
            factory.set_ice_servers(config.ice_servers.clone());
        }

        let client = Self {
            peers: PeerConnectionManager::new(Role::ViewerSide, factory.clone(), peer_tx),
            negotiation: NegotiationCoordinator::new(signaling.clone()),
            retry: ReconnectionController::new(config.reconnect),
            config,
            signaling,
            transport_rx,
            factory,
            surface,
            command_rx,
            peer_rx,
            status: status_tx,
            pending_join: None,
            peer_id: None,
            room_id: None,
            streamer_id: None,
            phase: ViewerPhase::Idle,
            paused: false,
            surface_attached: false,
            error: None,
        };

        let task = tokio::spawn(client.run());
        ViewerHandle {
            commands: command_tx,
            status: status_rx,
            task,
        }
    }

    async fn run(mut self) {
        info!("Viewer event loop started");

        loop {
            let join_deadline = self.pending_join.as_ref().map(|p| p.deadline);
            let retry_deadline = self.retry.deadline();

            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ViewerCommand::Leave) | None => break,
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

                _ = sleep_until_deadline(join_deadline) => self.join_timed_out(),

                _ = sleep_until_deadline(retry_deadline) => self.retry_due().await,
            }
        }

        self.shutdown().await;
        info!("Viewer event loop finished");
    }

    async fn handle_command(&mut self, cmd: ViewerCommand) {
        match cmd {
            ViewerCommand::Join { room_id, reply } => {
                info!(room_id = %room_id, "Joining room");
                self.discard_session().await;
                self.retry.reset();
                self.room_id = Some(room_id);
                self.streamer_id = None;
                self.join(Some(reply), false).await;
            }
            ViewerCommand::Reconnect => {
                info!("Manual reconnect");
                self.retry.reset();
                self.reconnect(false).await;
            }
            ViewerCommand::Leave => {}
        }
    }

    async fn join(&mut self, reply: Option<JoinReply>, automatic: bool) {
        let Some(room_id) = self.room_id.clone() else {
            return;
        };
        self.signaling.join_room(room_id).await;
        self.pending_join = Some(PendingJoin {
            reply,
            automatic,
            deadline: Instant::now() + self.config.join_timeout,
        });
        self.phase = ViewerPhase::Joining;
        self.publish();
    }

    /// Drops the session and its rendering, clears negotiation and playback
    /// flags, and rejoins the current room.
    async fn reconnect(&mut self, automatic: bool) {
        self.retry.cancel();
        self.discard_session().await;
        self.join(None, automatic).await;
    }

    async fn discard_session(&mut self) {
        self.peers.close_all().await;
        self.negotiation.reset();
        self.detach_surface();
        self.paused = false;
    }

    fn detach_surface(&mut self) {
        if self.surface_attached {
            self.surface.detach();
            self.surface_attached = false;
        }
    }

    async fn handle_transport_event(&mut self, evt: TransportEvent) {
        match evt {
            TransportEvent::Message(msg) => self.handle_message(msg).await,
            TransportEvent::Reconnected => {
                if self.room_id.is_some() {
                    info!("Signaling reconnected, rejoining");
                    self.reconnect(true).await;
                }
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
            ServerMessage::RoomJoined {
                room_id,
                streamer_id,
            } => {
                info!(room_id = %room_id, streamer = %streamer_id, "Joined room");
                if let Some(pending) = self.pending_join.take() {
                    // An automatic rejoin only counts as recovered once media
                    // flows again.
                    if !pending.automatic {
                        self.retry.reset();
                    }
                    if let Some(reply) = pending.reply {
                        let _ = reply.send(Ok(streamer_id.clone()));
                    }
                }
                self.room_id = Some(room_id);
                self.streamer_id = Some(streamer_id);
                self.error = None;
                if self.phase == ViewerPhase::Joining {
                    self.phase = ViewerPhase::Waiting;
                }
                self.publish();
            }
            ServerMessage::JoinFailed { error } => {
                warn!("Join failed: {error}");
                let err = ClientError::from(SignalingError::RoomNotFound);
                if let Some(reply) = self.pending_join.take().and_then(|p| p.reply) {
                    let _ = reply.send(Err(err.clone()));
                }
                self.retry.cancel();
                self.phase = ViewerPhase::Failed;
                self.set_error(err);
            }
            ServerMessage::Offer { offer, sender } => self.handle_offer(offer, sender).await,
            ServerMessage::IceCandidate { candidate, sender } => {
                let Some(connection) = self.peers.connection(&sender) else {
                    debug!(sender = %sender, "Candidate for unknown session dropped");
                    return;
                };
                self.negotiation
                    .handle_ice_candidate(sender, connection, candidate);
            }
            ServerMessage::StreamPaused => {
                info!("Stream paused by streamer");
                self.paused = true;
                self.phase = ViewerPhase::Paused;
                self.publish();
            }
            ServerMessage::StreamResumed => {
                info!("Stream resumed, awaiting offer");
                self.paused = false;
                self.negotiation.clear_guard();
                self.phase = ViewerPhase::Connecting;
                self.publish();
            }
            ServerMessage::StreamerLeft => {
                info!("Streamer left");
                self.retry.cancel();
                self.discard_session().await;
                self.streamer_id = None;
                self.phase = ViewerPhase::Ended;
                self.set_error(ConnectionTerminal::Closed.into());
            }
            other => debug!("Ignoring {other:?}"),
        }
    }

    async fn handle_offer(&mut self, offer: SessionDescription, sender: PeerId) {
        if !self.negotiation.begin(&sender) {
            debug!(sender = %sender, "Already processing an offer, dropped");
            return;
        }

        let previous = self.peers.session(&sender).map(|s| s.id);
        let connection = match self.peers.ensure_session(&sender).await {
            Ok(connection) => connection,
            Err(e) => {
                self.negotiation.release(&sender);
                error!(sender = %sender, "Failed to create session: {e:#}");
                self.set_error(NegotiationError::SdpFailure(format!("{e:#}")).into());
                return;
            }
        };
        if self.peers.session(&sender).map(|s| s.id) != previous {
            self.detach_surface();
        }

        self.streamer_id = Some(sender.clone());
        if !self.paused && self.phase != ViewerPhase::Watching {
            self.phase = ViewerPhase::Connecting;
        }
        self.negotiation.create_answer(sender, connection, offer);
        self.publish();
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
                info!(streamer = %remote, %state, "Connection state changed");

                match state {
                    ConnectionState::Connected => {
                        self.retry.reset();
                        self.error = None;
                        self.phase = if self.paused {
                            ViewerPhase::Paused
                        } else {
                            ViewerPhase::Watching
                        };
                    }
                    ConnectionState::Connecting => {
                        if !self.paused {
                            self.phase = ViewerPhase::Connecting;
                        }
                    }
                    ConnectionState::Disconnected | ConnectionState::Failed => {
                        self.connection_lost();
                    }
                    ConnectionState::New | ConnectionState::Closed => {}
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
            PeerEvent::RemoteStream {
                remote,
                session,
                stream,
            } => {
                let Some(s) = self.peers.session_mut(&remote) else {
                    return;
                };
                if s.id != session || s.stream_surfaced {
                    return;
                }
                s.stream_surfaced = true;
                debug!(streamer = %remote, stream = %stream.stream_id, "Surfacing remote stream");
                self.surface.attach(stream);
                self.surface_attached = true;
            }
        }
    }

    fn connection_lost(&mut self) {
        if self.room_id.is_none() {
            return;
        }
        match self.retry.on_connection_lost(Instant::now()) {
            RetryDecision::Scheduled { attempt, .. } => {
                self.phase = ViewerPhase::Reconnecting { attempt };
            }
            RetryDecision::Exhausted { .. } => {
                self.phase = ViewerPhase::Failed;
                self.error = Some(ConnectionTerminal::Failed.into());
            }
        }
    }

    async fn retry_due(&mut self) {
        if !self.retry.take_due(Instant::now()) {
            return;
        }
        if self.peers.aggregate_state() == ConnectionState::Connected {
            debug!("Recovered before retry, skipping");
            return;
        }
        if self.pending_join.is_some() {
            debug!("Join already in progress, skipping retry");
            return;
        }
        info!(attempt = self.retry.attempts(), "Running reconnect");
        self.reconnect(true).await;
    }

    fn join_timed_out(&mut self) {
        let Some(pending) = self.pending_join.take() else {
            return;
        };
        warn!("Join timed out");

        if pending.automatic {
            self.connection_lost();
            self.publish();
            return;
        }

        let err = ClientError::from(SignalingError::JoinTimeout);
        if let Some(reply) = pending.reply {
            let _ = reply.send(Err(err.clone()));
        }
        self.phase = ViewerPhase::Failed;
        self.set_error(err);
    }

    fn handle_outcome(&mut self, outcome: NegotiationOutcome) {
        match outcome.result {
            Ok(Applied::Done) => debug!(streamer = %outcome.remote, kind = ?outcome.kind, "Negotiation step done"),
            Ok(Applied::Skipped) => debug!(streamer = %outcome.remote, kind = ?outcome.kind, "Negotiation step skipped"),
            Err(e) => {
                warn!(streamer = %outcome.remote, kind = ?outcome.kind, "Negotiation failed: {e}");
                self.set_error(e);
            }
        }
    }

    async fn shutdown(&mut self) {
        self.retry.reset();
        self.pending_join = None;
        self.discard_session().await;
        self.room_id = None;
        self.streamer_id = None;
        self.phase = ViewerPhase::Idle;
        self.publish();
    }

    fn set_error(&mut self, err: ClientError) {
        self.error = Some(err);
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(ViewerStatus {
            peer_id: self.peer_id.clone(),
            room_id: self.room_id.clone(),
            streamer_id: self.streamer_id.clone(),
            connection: self.peers.aggregate_state(),
            phase: self.phase,
            paused: self.paused,
            retry_attempt: self.retry.attempts(),
            error: self.error.clone(),
        });
    }
}
