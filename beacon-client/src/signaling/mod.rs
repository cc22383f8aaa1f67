mod signaling_output;
mod transport_event;
mod ws_signaling;

pub use signaling_output::*;
pub use transport_event::*;
pub use ws_signaling::*;
