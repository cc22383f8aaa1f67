mod peer;
mod room;
mod signaling;
mod state;

pub use peer::PeerId;
pub use room::RoomId;
pub use signaling::{
    ClientMessage, IceCandidate, IceServerConfig, SdpType, ServerMessage, SessionDescription,
};
pub use state::{ConnectionState, SignalingState};
