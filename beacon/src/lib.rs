//! One streamer, many viewers: WebRTC session orchestration.
//!
//! `model` is always available. Enable `server` for the signaling relay and
//! `client` for the streamer/viewer session actors.

pub use beacon_core::{ClientError, PeerId, RoomId};

pub mod model {
    pub use beacon_core::model::*;
}

pub mod error {
    pub use beacon_core::error::*;
}

#[cfg(feature = "server")]
pub mod server {
    pub use beacon_server::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use beacon_client::*;
}
