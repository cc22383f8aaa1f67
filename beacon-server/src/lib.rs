mod config;
mod registry;
mod signaling;

pub use config::*;
pub use registry::*;
pub use signaling::*;
