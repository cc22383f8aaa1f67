use beacon_client::{
    MediaCapture, NegotiationCoordinator, PeerConnection, PeerConnectionFactory,
    SampleTrackCapture,
};
use beacon_core::{
    ClientError, ClientMessage, IceError, PeerId, RoomId, ServerMessage, SessionDescription,
    SignalingState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::integration::init_tracing;
use crate::utils::{MockConnectionFactory, MockSignalingOutput, StreamerHarness, candidate_json};

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn test_answer_is_applied_to_matching_session() {
    init_tracing();
    let mut h = StreamerHarness::spawn();
    h.start(&RoomId::from("room-1")).await;

    let v1 = PeerId::from("v1");
    let conn = h.viewer_joins(&v1).await;

    h.deliver(ServerMessage::Answer {
        answer: SessionDescription::answer("answer-v1"),
        sender: v1.clone(),
    })
    .await;
    settle().await;

    assert_eq!(conn.signaling_state(), SignalingState::Stable);
    assert_eq!(
        conn.remote_description(),
        Some(SessionDescription::answer("answer-v1"))
    );

    // A stale repeat is a no-op, not an error.
    h.deliver(ServerMessage::Answer {
        answer: SessionDescription::answer("answer-v1"),
        sender: v1,
    })
    .await;
    settle().await;
    assert!(h.handle.status().borrow().error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_answers_apply_only_the_first() {
    init_tracing();
    let mut h = StreamerHarness::spawn();
    h.start(&RoomId::from("room-1")).await;

    let v1 = PeerId::from("v1");
    let conn = h.viewer_joins(&v1).await;

    for sdp in ["answer-1", "answer-2"] {
        h.deliver(ServerMessage::Answer {
            answer: SessionDescription::answer(sdp),
            sender: v1.clone(),
        })
        .await;
    }
    settle().await;

    assert_eq!(conn.signaling_state(), SignalingState::Stable);
    assert_eq!(
        conn.remote_description(),
        Some(SessionDescription::answer("answer-1"))
    );
    assert!(h.handle.status().borrow().error.is_none());
}

#[tokio::test]
async fn test_reoffer_with_same_media_adds_no_tracks() {
    init_tracing();
    let (signaling, _outbox) = MockSignalingOutput::new();
    let mut negotiation = NegotiationCoordinator::new(Arc::new(signaling.clone()));
    let factory = MockConnectionFactory::new();
    let (events, _events_rx) = mpsc::unbounded_channel();

    let v1 = PeerId::from("v1");
    let connection = factory.create(v1.clone(), 1, events).await.unwrap();
    let conn = factory.latest(&v1).unwrap();
    let tracks = SampleTrackCapture::new("cam")
        .acquire()
        .await
        .unwrap()
        .tracks();

    negotiation
        .create_offer(v1.clone(), connection.clone(), Some(tracks.clone()))
        .unwrap();
    assert!(negotiation.next().await.unwrap().result.is_ok());
    let first = conn.tracks();
    assert_eq!(first.len(), 2);

    conn.set_remote_description(SessionDescription::answer("answer-1"))
        .await
        .unwrap();
    negotiation
        .create_offer(v1.clone(), connection, Some(tracks))
        .unwrap();
    assert!(negotiation.next().await.unwrap().result.is_ok());

    assert_eq!(conn.tracks(), first);
    assert_eq!(signaling.offer_targets().await, vec![v1.clone(), v1]);
}

#[tokio::test(start_paused = true)]
async fn test_payloads_for_unknown_viewer_are_ignored() {
    init_tracing();
    let mut h = StreamerHarness::spawn();
    h.start(&RoomId::from("room-1")).await;

    h.deliver(ServerMessage::Answer {
        answer: SessionDescription::answer("x"),
        sender: PeerId::from("ghost"),
    })
    .await;
    h.deliver(ServerMessage::IceCandidate {
        candidate: candidate_json("candidate:1"),
        sender: PeerId::from("ghost"),
    })
    .await;

    h.expect_silence(Duration::from_millis(500)).await;
    let status = h.handle.status().borrow().clone();
    assert!(status.error.is_none());
    assert_eq!(h.factory.created_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_local_candidates_are_forwarded_to_viewer() {
    init_tracing();
    let mut h = StreamerHarness::spawn();
    h.start(&RoomId::from("room-1")).await;

    let v1 = PeerId::from("v1");
    let conn = h.viewer_joins(&v1).await;
    conn.emit_candidate("candidate:host");

    assert_eq!(
        h.next_sent().await,
        ClientMessage::IceCandidate {
            candidate: candidate_json("candidate:host"),
            target: v1,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_remote_candidate_applied_after_answer() {
    init_tracing();
    let mut h = StreamerHarness::spawn();
    h.start(&RoomId::from("room-1")).await;

    let v1 = PeerId::from("v1");
    let conn = h.viewer_joins(&v1).await;
    h.deliver(ServerMessage::Answer {
        answer: SessionDescription::answer("answer-v1"),
        sender: v1.clone(),
    })
    .await;
    h.deliver(ServerMessage::IceCandidate {
        candidate: candidate_json("candidate:srflx"),
        sender: v1,
    })
    .await;
    settle().await;

    assert_eq!(
        conn.applied_candidates(),
        vec![candidate_json("candidate:srflx")]
    );
}

/// Known edge case: candidates are applied on arrival with no buffering, so
/// one that beats the answer is rejected by the connection and lost.
#[tokio::test(start_paused = true)]
async fn test_candidate_before_remote_description_is_lost() {
    init_tracing();
    let mut h = StreamerHarness::spawn();
    h.start(&RoomId::from("room-1")).await;

    let v1 = PeerId::from("v1");
    let conn = h.viewer_joins(&v1).await;

    h.deliver(ServerMessage::IceCandidate {
        candidate: candidate_json("candidate:early"),
        sender: v1.clone(),
    })
    .await;
    let status = h.status_where(|s| s.error.is_some()).await;
    assert!(matches!(
        status.error,
        Some(ClientError::Ice(IceError::AddCandidateFailure(_)))
    ));

    h.deliver(ServerMessage::Answer {
        answer: SessionDescription::answer("answer-v1"),
        sender: v1,
    })
    .await;
    settle().await;

    assert_eq!(conn.signaling_state(), SignalingState::Stable);
    assert!(conn.applied_candidates().is_empty());
}
