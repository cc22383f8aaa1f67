mod coordinator;
mod guard;

pub use coordinator::*;
pub use guard::*;
