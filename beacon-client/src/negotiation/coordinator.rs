use crate::media::LocalTrack;
use crate::negotiation::OfferProcessingGuard;
use crate::peer::{PeerConnection, attach_tracks};
use crate::signaling::SignalingOutput;
use beacon_core::{
    ClientError, IceCandidate, IceError, NegotiationError, PeerId, SessionDescription,
    SignalingState,
};
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationKind {
    Offer,
    Answer,
    RemoteAnswer,
    RemoteCandidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Done,
    /// The session was not in a state that accepts the payload; nothing was
    /// changed. Colliding offers (glare) end up here.
    Skipped,
}

#[derive(Debug)]
pub struct NegotiationOutcome {
    pub remote: PeerId,
    pub kind: NegotiationKind,
    pub result: Result<Applied, ClientError>,
    guarded: bool,
}

/// Runs offer/answer/candidate exchanges as in-flight futures polled by the
/// owning actor, so that new signaling messages are handled while an
/// exchange is suspended.
///
/// Offer glare is resolved by dropping the colliding offer when the session
/// is not `stable`; the receiver never rolls back or retries.
pub struct NegotiationCoordinator {
    signaling: Arc<dyn SignalingOutput>,
    guard: OfferProcessingGuard,
    in_flight: FuturesUnordered<BoxFuture<'static, NegotiationOutcome>>,
}

impl NegotiationCoordinator {
    pub fn new(signaling: Arc<dyn SignalingOutput>) -> Self {
        Self {
            signaling,
            guard: OfferProcessingGuard::default(),
            in_flight: FuturesUnordered::new(),
        }
    }

    pub fn guard(&self) -> &OfferProcessingGuard {
        &self.guard
    }

    /// Claims the guard for `remote`. Must be paired with a guarded
    /// exchange or with `release`.
    pub fn begin(&mut self, remote: &PeerId) -> bool {
        self.guard.try_begin(remote)
    }

    pub fn release(&mut self, remote: &PeerId) {
        self.guard.finish(remote);
    }

    pub fn clear_guard(&mut self) {
        self.guard.clear();
    }

    /// Drops every in-flight exchange and clears the guard.
    pub fn reset(&mut self) {
        self.in_flight = FuturesUnordered::new();
        self.guard.clear();
    }

    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Streamer side: attaches missing tracks, creates an offer and sends it.
    pub fn create_offer(
        &mut self,
        remote: PeerId,
        connection: Arc<dyn PeerConnection>,
        tracks: Option<Vec<LocalTrack>>,
    ) -> Result<(), NegotiationError> {
        let tracks = tracks.ok_or(NegotiationError::LocalMediaNotReady)?;
        let signaling = self.signaling.clone();

        self.in_flight.push(Box::pin(async move {
            let result = run_offer(signaling.as_ref(), &remote, connection.as_ref(), &tracks)
                .await
                .map_err(ClientError::from);
            NegotiationOutcome {
                remote,
                kind: NegotiationKind::Offer,
                result,
                guarded: false,
            }
        }));
        Ok(())
    }

    /// Viewer side: applies `offer` and answers it. The caller must hold the
    /// guard for `remote`; it is released when the exchange completes.
    pub fn create_answer(
        &mut self,
        remote: PeerId,
        connection: Arc<dyn PeerConnection>,
        offer: SessionDescription,
    ) {
        let signaling = self.signaling.clone();

        self.in_flight.push(Box::pin(async move {
            let result = run_answer(signaling.as_ref(), &remote, connection.as_ref(), offer)
                .await
                .map_err(ClientError::from);
            NegotiationOutcome {
                remote,
                kind: NegotiationKind::Answer,
                result,
                guarded: true,
            }
        }));
    }

    /// Streamer side: applies a viewer's answer. The caller must hold the
    /// guard for `remote`, which serializes answers from one viewer the same
    /// way it serializes offers on the viewer side.
    pub fn handle_answer(
        &mut self,
        remote: PeerId,
        connection: Arc<dyn PeerConnection>,
        answer: SessionDescription,
    ) {
        self.in_flight.push(Box::pin(async move {
            let result = run_remote_answer(connection.as_ref(), answer)
                .await
                .map_err(ClientError::from);
            NegotiationOutcome {
                remote,
                kind: NegotiationKind::RemoteAnswer,
                result,
                guarded: true,
            }
        }));
    }

    /// Applies a remote candidate right away.
    pub fn handle_ice_candidate(
        &mut self,
        remote: PeerId,
        connection: Arc<dyn PeerConnection>,
        candidate: IceCandidate,
    ) {
        self.in_flight.push(Box::pin(async move {
            let result = connection
                .add_ice_candidate(candidate)
                .await
                .map(|_| Applied::Done)
                .map_err(|e| ClientError::from(IceError::AddCandidateFailure(format!("{e:#}"))));
            NegotiationOutcome {
                remote,
                kind: NegotiationKind::RemoteCandidate,
                result,
                guarded: false,
            }
        }));
    }

    /// Waits for the next exchange to finish. Guarded exchanges release their
    /// guard entry here whatever the result. Returns `None` when idle.
    pub async fn next(&mut self) -> Option<NegotiationOutcome> {
        let outcome = self.in_flight.next().await?;
        if outcome.guarded {
            self.guard.finish(&outcome.remote);
        }
        Some(outcome)
    }
}

fn sdp_failure(e: anyhow::Error) -> NegotiationError {
    NegotiationError::SdpFailure(format!("{e:#}"))
}

async fn run_offer(
    signaling: &dyn SignalingOutput,
    remote: &PeerId,
    connection: &dyn PeerConnection,
    tracks: &[LocalTrack],
) -> Result<Applied, NegotiationError> {
    let attached = attach_tracks(connection, tracks).await.map_err(sdp_failure)?;
    debug!(
        remote = %remote,
        added = attached.added,
        replaced = attached.replaced,
        "Tracks attached"
    );

    let offer = connection.create_offer().await.map_err(sdp_failure)?;
    connection
        .set_local_description(offer.clone())
        .await
        .map_err(sdp_failure)?;

    signaling.send_offer(remote.clone(), offer).await;
    Ok(Applied::Done)
}

async fn run_answer(
    signaling: &dyn SignalingOutput,
    remote: &PeerId,
    connection: &dyn PeerConnection,
    offer: SessionDescription,
) -> Result<Applied, NegotiationError> {
    if connection.signaling_state() != SignalingState::Stable {
        debug!(remote = %remote, "Session not stable, dropping colliding offer");
        return Ok(Applied::Skipped);
    }

    connection
        .set_remote_description(offer)
        .await
        .map_err(sdp_failure)?;
    let answer = connection.create_answer().await.map_err(sdp_failure)?;
    connection
        .set_local_description(answer.clone())
        .await
        .map_err(sdp_failure)?;

    signaling.send_answer(remote.clone(), answer).await;
    Ok(Applied::Done)
}

async fn run_remote_answer(
    connection: &dyn PeerConnection,
    answer: SessionDescription,
) -> Result<Applied, NegotiationError> {
    if connection.signaling_state() != SignalingState::HaveLocalOffer {
        return Ok(Applied::Skipped);
    }

    connection
        .set_remote_description(answer)
        .await
        .map_err(sdp_failure)?;
    Ok(Applied::Done)
}
