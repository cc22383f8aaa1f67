mod connection;
mod manager;
mod session;
mod webrtc_connection;

pub use connection::*;
pub use manager::*;
pub use session::*;
pub use webrtc_connection::*;
