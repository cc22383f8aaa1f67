mod config;
mod media;
mod negotiation;
mod peer;
mod reconnect;
mod signaling;
mod status;
mod streamer;
mod viewer;

pub use config::*;
pub use media::*;
pub use negotiation::*;
pub use peer::*;
pub use reconnect::*;
pub use signaling::*;
pub use status::*;
pub use streamer::*;
pub use viewer::*;
