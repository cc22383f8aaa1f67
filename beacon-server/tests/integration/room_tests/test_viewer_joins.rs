use beacon_core::{ClientMessage, RoomId, ServerMessage};

use crate::integration::init_tracing;
use crate::utils::{TestClient, TestServer};

#[tokio::test]
async fn test_viewer_joins_room() {
    init_tracing();
    let server = TestServer::start(false).await.expect("server");

    let mut streamer = TestClient::connect(server.addr).await.unwrap();
    let mut viewer = TestClient::connect(server.addr).await.unwrap();

    streamer.send(ClientMessage::CreateRoom).await.unwrap();
    let ServerMessage::RoomCreated { room_id } = streamer.recv().await.unwrap() else {
        panic!("expected room-created");
    };

    // Joining twice must succeed both times and keep one membership.
    for _ in 0..2 {
        viewer
            .send(ClientMessage::JoinRoom {
                room_id: room_id.clone(),
            })
            .await
            .unwrap();

        assert_eq!(
            viewer.recv().await.unwrap(),
            ServerMessage::RoomJoined {
                room_id: room_id.clone(),
                streamer_id: streamer.peer_id.clone(),
            }
        );
        assert_eq!(
            streamer.recv().await.unwrap(),
            ServerMessage::ViewerJoined {
                viewer_id: viewer.peer_id.clone()
            }
        );
    }

    let room = server.relay.registry().room(&room_id).unwrap();
    assert_eq!(room.viewer_ids.len(), 1);

    let viewer_id = viewer.peer_id.clone();
    viewer.close().await.unwrap();
    assert_eq!(
        streamer.recv().await.unwrap(),
        ServerMessage::ViewerLeft { viewer_id }
    );
}

#[tokio::test]
async fn test_join_missing_room_fails() {
    init_tracing();
    let server = TestServer::start(false).await.expect("server");
    let mut viewer = TestClient::connect(server.addr).await.unwrap();

    viewer
        .send(ClientMessage::JoinRoom {
            room_id: RoomId::from("no-such-room"),
        })
        .await
        .unwrap();

    assert_eq!(
        viewer.recv().await.unwrap(),
        ServerMessage::JoinFailed {
            error: "Room does not exist".to_owned()
        }
    );
}
