use beacon_client::{
    ClientConfig, PeerConnection, StreamerClient, ViewerClient, ViewerPhase, WsSignaling,
};
use beacon_core::{ClientError, ConnectionTerminal, SignalingState};
use std::time::Duration;

use crate::integration::init_tracing;
use crate::utils::{MockCapture, MockConnectionFactory, RecordingSurface, TestServer, wait_until};

#[tokio::test]
async fn test_streamer_and_viewer_negotiate_through_relay() {
    init_tracing();
    let server = TestServer::start().await.unwrap();

    let (streamer_ws, streamer_events) = WsSignaling::connect(&server.ws_url()).await.unwrap();
    let streamer_factory = MockConnectionFactory::new();
    let streamer = StreamerClient::spawn(
        ClientConfig::default(),
        streamer_ws.clone(),
        streamer_events,
        streamer_factory.clone(),
        MockCapture::new(),
    );
    let room_id = streamer.start().await.unwrap();
    assert!(server.relay.registry().room(&room_id).is_some());

    let (viewer_ws, viewer_events) = WsSignaling::connect(&server.ws_url()).await.unwrap();
    let viewer_factory = MockConnectionFactory::new();
    let viewer = ViewerClient::spawn(
        ClientConfig::default(),
        viewer_ws.clone(),
        viewer_events,
        viewer_factory.clone(),
        RecordingSurface::new(),
    );
    let streamer_id = viewer.join(room_id.clone()).await.unwrap();

    let streamer_status = wait_until(&mut streamer.status(), |s| s.viewers.len() == 1).await;
    assert_eq!(streamer_status.peer_id, Some(streamer_id.clone()));
    let viewer_id = streamer_status.viewers[0].clone();

    // Offer and answer both crossed the relay once the streamer side is stable.
    let answered = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(conn) = streamer_factory.latest(&viewer_id)
                && conn.remote_description().is_some()
            {
                return conn;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("answer never reached the streamer");
    assert_eq!(answered.signaling_state(), SignalingState::Stable);
    assert!(viewer_factory.latest(&streamer_id).is_some());

    streamer.pause();
    wait_until(&mut viewer.status(), |s| s.paused).await;
    streamer.resume().await.unwrap();
    wait_until(&mut viewer.status(), |s| !s.paused).await;

    streamer.stop().await;
    streamer_ws.disconnect();

    let ended = wait_until(&mut viewer.status(), |s| s.phase == ViewerPhase::Ended).await;
    assert_eq!(
        ended.error,
        Some(ClientError::Terminal(ConnectionTerminal::Closed))
    );

    viewer.leave().await;
    viewer_ws.disconnect();
}

#[tokio::test]
async fn test_viewer_joining_paused_stream_sees_it_paused() {
    init_tracing();
    let server = TestServer::start().await.unwrap();

    let (streamer_ws, streamer_events) = WsSignaling::connect(&server.ws_url()).await.unwrap();
    let streamer = StreamerClient::spawn(
        ClientConfig::default(),
        streamer_ws.clone(),
        streamer_events,
        MockConnectionFactory::new(),
        MockCapture::new(),
    );
    let room_id = streamer.start().await.unwrap();
    streamer.pause();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !server.relay.registry().room(&room_id).is_some_and(|r| r.paused) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("pause never reached the relay");

    let (viewer_ws, viewer_events) = WsSignaling::connect(&server.ws_url()).await.unwrap();
    let viewer = ViewerClient::spawn(
        ClientConfig::default(),
        viewer_ws.clone(),
        viewer_events,
        MockConnectionFactory::new(),
        RecordingSurface::new(),
    );
    viewer.join(room_id).await.unwrap();

    let status = wait_until(&mut viewer.status(), |s| s.paused).await;
    assert_eq!(status.phase, ViewerPhase::Paused);

    streamer.resume().await.unwrap();
    wait_until(&mut viewer.status(), |s| !s.paused).await;

    viewer.leave().await;
    viewer_ws.disconnect();
    streamer.stop().await;
    streamer_ws.disconnect();
}
