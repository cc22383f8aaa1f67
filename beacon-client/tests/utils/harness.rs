use crate::utils::{MockCapture, MockConnectionFactory, MockPeerConnection, MockSignalingOutput, RecordingSurface};
use beacon_client::{
    ClientConfig, StreamerClient, StreamerHandle, StreamerStatus, TransportEvent, ViewerClient,
    ViewerHandle, ViewerStatus,
};
use beacon_core::{ClientMessage, PeerId, RoomId, ServerMessage, SessionDescription};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const RECV_TIMEOUT: Duration = Duration::from_secs(60);

async fn next_sent(outbox: &mut mpsc::UnboundedReceiver<ClientMessage>) -> ClientMessage {
    tokio::time::timeout(RECV_TIMEOUT, outbox.recv())
        .await
        .expect("timed out waiting for an outgoing message")
        .expect("signaling output dropped")
}

async fn expect_silence(outbox: &mut mpsc::UnboundedReceiver<ClientMessage>, window: Duration) {
    if let Ok(Some(msg)) = tokio::time::timeout(window, outbox.recv()).await {
        panic!("expected no outgoing message, got {msg:?}");
    }
}

pub async fn wait_until<T: Clone>(rx: &mut watch::Receiver<T>, pred: impl FnMut(&T) -> bool) -> T {
    tokio::time::timeout(RECV_TIMEOUT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed")
        .clone()
}

/// A streamer actor wired to mocks, with the test playing the relay.
pub struct StreamerHarness {
    pub handle: StreamerHandle,
    pub transport: mpsc::Sender<TransportEvent>,
    pub outbox: mpsc::UnboundedReceiver<ClientMessage>,
    pub signaling: MockSignalingOutput,
    pub factory: Arc<MockConnectionFactory>,
    pub capture: Arc<MockCapture>,
}

impl StreamerHarness {
    pub fn spawn() -> Self {
        let (signaling, outbox) = MockSignalingOutput::new();
        let (transport, transport_rx) = mpsc::channel(64);
        let factory = MockConnectionFactory::new();
        let capture = MockCapture::new();

        let handle = StreamerClient::spawn(
            ClientConfig::default(),
            Arc::new(signaling.clone()),
            transport_rx,
            factory.clone(),
            capture.clone(),
        );

        Self {
            handle,
            transport,
            outbox,
            signaling,
            factory,
            capture,
        }
    }

    pub async fn deliver(&self, msg: ServerMessage) {
        self.transport
            .send(TransportEvent::Message(msg))
            .await
            .expect("streamer stopped");
    }

    pub async fn next_sent(&mut self) -> ClientMessage {
        next_sent(&mut self.outbox).await
    }

    pub async fn expect_silence(&mut self, window: Duration) {
        expect_silence(&mut self.outbox, window).await;
    }

    pub async fn status_where(&self, pred: impl FnMut(&StreamerStatus) -> bool) -> StreamerStatus {
        wait_until(&mut self.handle.status(), pred).await
    }

    /// Starts the stream and answers the room request as the relay would.
    pub async fn start(&mut self, room_id: &RoomId) {
        let Self {
            handle,
            transport,
            outbox,
            ..
        } = self;

        let relay = async {
            assert_eq!(next_sent(outbox).await, ClientMessage::CreateRoom);
            transport
                .send(TransportEvent::Message(ServerMessage::RoomCreated {
                    room_id: room_id.clone(),
                }))
                .await
                .expect("streamer stopped");
        };

        let (result, ()) = tokio::join!(handle.start(), relay);
        assert_eq!(result.expect("start failed"), *room_id);
    }

    /// Announces `viewer` and returns its session once the offer went out.
    pub async fn viewer_joins(&mut self, viewer: &PeerId) -> Arc<MockPeerConnection> {
        self.deliver(ServerMessage::ViewerJoined {
            viewer_id: viewer.clone(),
        })
        .await;

        match self.next_sent().await {
            ClientMessage::Offer { target, .. } => assert_eq!(&target, viewer),
            other => panic!("expected offer to {viewer}, got {other:?}"),
        }
        self.factory.latest(viewer).expect("no session created")
    }
}

/// A viewer actor wired to mocks, with the test playing the relay.
pub struct ViewerHarness {
    pub handle: ViewerHandle,
    pub transport: mpsc::Sender<TransportEvent>,
    pub outbox: mpsc::UnboundedReceiver<ClientMessage>,
    pub signaling: MockSignalingOutput,
    pub factory: Arc<MockConnectionFactory>,
    pub surface: Arc<RecordingSurface>,
}

impl ViewerHarness {
    pub fn spawn() -> Self {
        Self::with_factory(MockConnectionFactory::new())
    }

    pub fn with_factory(factory: Arc<MockConnectionFactory>) -> Self {
        let (signaling, outbox) = MockSignalingOutput::new();
        let (transport, transport_rx) = mpsc::channel(64);
        let surface = RecordingSurface::new();

        let handle = ViewerClient::spawn(
            ClientConfig::default(),
            Arc::new(signaling.clone()),
            transport_rx,
            factory.clone(),
            surface.clone(),
        );

        Self {
            handle,
            transport,
            outbox,
            signaling,
            factory,
            surface,
        }
    }

    pub async fn deliver(&self, msg: ServerMessage) {
        self.transport
            .send(TransportEvent::Message(msg))
            .await
            .expect("viewer stopped");
    }

    pub async fn next_sent(&mut self) -> ClientMessage {
        next_sent(&mut self.outbox).await
    }

    pub async fn expect_silence(&mut self, window: Duration) {
        expect_silence(&mut self.outbox, window).await;
    }

    pub async fn status_where(&self, pred: impl FnMut(&ViewerStatus) -> bool) -> ViewerStatus {
        wait_until(&mut self.handle.status(), pred).await
    }

    /// Joins `room_id` and acknowledges it as the relay would.
    pub async fn join(&mut self, room_id: &RoomId, streamer: &PeerId) {
        let Self {
            handle,
            transport,
            outbox,
            ..
        } = self;

        let relay = async {
            assert_eq!(
                next_sent(outbox).await,
                ClientMessage::JoinRoom {
                    room_id: room_id.clone()
                }
            );
            transport
                .send(TransportEvent::Message(ServerMessage::RoomJoined {
                    room_id: room_id.clone(),
                    streamer_id: streamer.clone(),
                }))
                .await
                .expect("viewer stopped");
        };

        let (result, ()) = tokio::join!(handle.join(room_id.clone()), relay);
        assert_eq!(result.expect("join failed"), *streamer);
    }

    /// Waits for the next automatic or manual rejoin and acknowledges it.
    pub async fn ack_rejoin(&mut self, room_id: &RoomId, streamer: &PeerId) {
        assert!(matches!(
            self.next_sent().await,
            ClientMessage::JoinRoom { .. }
        ));
        self.deliver(ServerMessage::RoomJoined {
            room_id: room_id.clone(),
            streamer_id: streamer.clone(),
        })
        .await;
    }

    /// Sends an offer from `streamer` and returns the session once answered.
    pub async fn offer_from(&mut self, streamer: &PeerId, sdp: &str) -> Arc<MockPeerConnection> {
        self.deliver(ServerMessage::Offer {
            offer: SessionDescription::offer(sdp),
            sender: streamer.clone(),
        })
        .await;

        match self.next_sent().await {
            ClientMessage::Answer { target, .. } => assert_eq!(&target, streamer),
            other => panic!("expected answer to {streamer}, got {other:?}"),
        }
        self.factory.latest(streamer).expect("no session created")
    }
}
