use async_trait::async_trait;
use beacon_core::{ClientMessage, IceCandidate, PeerId, RoomId, SessionDescription};

/// Emit side of the signaling transport.
///
/// Sends are fire-and-forget: a message that cannot be delivered is dropped
/// by the transport, never reported back to the negotiation that produced it.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    async fn send(&self, msg: ClientMessage);

    async fn create_room(&self) {
        self.send(ClientMessage::CreateRoom).await;
    }

    async fn join_room(&self, room_id: RoomId) {
        self.send(ClientMessage::JoinRoom { room_id }).await;
    }

    async fn send_offer(&self, target: PeerId, offer: SessionDescription) {
        self.send(ClientMessage::Offer { offer, target }).await;
    }

    async fn send_answer(&self, target: PeerId, answer: SessionDescription) {
        self.send(ClientMessage::Answer { answer, target }).await;
    }

    async fn send_ice(&self, target: PeerId, candidate: IceCandidate) {
        self.send(ClientMessage::IceCandidate { candidate, target })
            .await;
    }

    async fn pause_stream(&self, room_id: RoomId) {
        self.send(ClientMessage::PauseStream { room_id }).await;
    }

    async fn resume_stream(&self, room_id: RoomId) {
        self.send(ClientMessage::ResumeStream { room_id }).await;
    }
}
