use beacon_core::{
    ClientError, ClientMessage, MediaAcquisitionError, PeerId, RoomId, ServerMessage,
    SessionDescription,
};
use std::time::Duration;

use crate::integration::init_tracing;
use crate::utils::StreamerHarness;

async fn collect_offer_targets(h: &mut StreamerHarness, count: usize) -> Vec<PeerId> {
    let mut targets = Vec::new();
    while targets.len() < count {
        match h.next_sent().await {
            ClientMessage::Offer { target, .. } => targets.push(target),
            other => panic!("expected offer, got {other:?}"),
        }
    }
    targets.sort();
    targets
}

#[tokio::test(start_paused = true)]
async fn test_pause_keeps_sessions_and_resume_offers_each_viewer_once() {
    init_tracing();
    let mut h = StreamerHarness::spawn();
    let room_id = RoomId::from("room-1");
    h.start(&room_id).await;

    let v1 = PeerId::from("v1");
    let v2 = PeerId::from("v2");
    let c1 = h.viewer_joins(&v1).await;
    let c2 = h.viewer_joins(&v2).await;
    for viewer in [&v1, &v2] {
        h.deliver(ServerMessage::Answer {
            answer: SessionDescription::answer(format!("answer-{viewer}")),
            sender: viewer.clone(),
        })
        .await;
    }

    h.handle.pause();
    assert_eq!(
        h.next_sent().await,
        ClientMessage::PauseStream {
            room_id: room_id.clone()
        }
    );
    let status = h.status_where(|s| s.paused).await;
    assert_eq!(status.viewers, vec![v1.clone(), v2.clone()]);
    assert_eq!(h.capture.stops(), 1);
    assert!(!c1.is_closed() && !c2.is_closed());

    h.handle.resume().await.unwrap();
    assert_eq!(
        h.next_sent().await,
        ClientMessage::ResumeStream {
            room_id: room_id.clone()
        }
    );
    assert_eq!(collect_offer_targets(&mut h, 2).await, vec![v1, v2]);
    h.expect_silence(Duration::from_millis(500)).await;

    assert_eq!(h.factory.created_count(), 2);
    assert!(!c1.is_closed() && !c2.is_closed());
    assert_eq!(h.capture.acquisitions(), 2);

    let status = h.status_where(|s| !s.paused).await;
    assert_eq!(status.room_id, Some(room_id));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_resume_reuses_senders() {
    init_tracing();
    let mut h = StreamerHarness::spawn();
    h.start(&RoomId::from("room-1")).await;

    let v1 = PeerId::from("v1");
    let conn = h.viewer_joins(&v1).await;
    let mut previous = conn.tracks();
    assert_eq!(previous.len(), 2);

    for _ in 0..3 {
        h.deliver(ServerMessage::Answer {
            answer: SessionDescription::answer("answer-v1"),
            sender: v1.clone(),
        })
        .await;

        h.handle.pause();
        assert!(matches!(
            h.next_sent().await,
            ClientMessage::PauseStream { .. }
        ));
        h.handle.resume().await.unwrap();
        assert!(matches!(
            h.next_sent().await,
            ClientMessage::ResumeStream { .. }
        ));
        assert_eq!(collect_offer_targets(&mut h, 1).await, vec![v1.clone()]);

        let current = conn.tracks();
        assert_eq!(current.len(), 2);
        assert!(current.iter().all(|id| !previous.contains(id)));
        previous = current;
    }

    assert_eq!(h.factory.created_count(), 1);
    assert_eq!(h.capture.stops(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_viewer_joining_while_paused_is_offered_on_resume() {
    init_tracing();
    let mut h = StreamerHarness::spawn();
    h.start(&RoomId::from("room-1")).await;

    let v1 = PeerId::from("v1");
    h.viewer_joins(&v1).await;

    h.handle.pause();
    assert!(matches!(
        h.next_sent().await,
        ClientMessage::PauseStream { .. }
    ));

    let v2 = PeerId::from("v2");
    h.deliver(ServerMessage::ViewerJoined {
        viewer_id: v2.clone(),
    })
    .await;
    h.status_where(|s| s.viewers.len() == 2).await;
    h.expect_silence(Duration::from_millis(500)).await;

    h.handle.resume().await.unwrap();
    assert!(matches!(
        h.next_sent().await,
        ClientMessage::ResumeStream { .. }
    ));
    assert_eq!(collect_offer_targets(&mut h, 2).await, vec![v1, v2]);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_pause_is_sent_once() {
    init_tracing();
    let mut h = StreamerHarness::spawn();
    h.start(&RoomId::from("room-1")).await;

    h.handle.pause();
    h.handle.pause();

    assert!(matches!(
        h.next_sent().await,
        ClientMessage::PauseStream { .. }
    ));
    h.expect_silence(Duration::from_millis(500)).await;
    assert_eq!(h.capture.stops(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_resume_reports_media_failure_and_stays_paused() {
    init_tracing();
    let mut h = StreamerHarness::spawn();
    h.start(&RoomId::from("room-1")).await;
    h.viewer_joins(&PeerId::from("v1")).await;

    h.handle.pause();
    h.status_where(|s| s.paused).await;

    h.capture.fail_with(Some(MediaAcquisitionError::DeviceBusy));
    let err = h.handle.resume().await.unwrap_err();
    assert_eq!(err, ClientError::Media(MediaAcquisitionError::DeviceBusy));

    let status = h.status_where(|s| s.error.is_some()).await;
    assert!(status.paused);
    assert_eq!(status.viewers.len(), 1);
}
