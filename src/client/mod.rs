//! Chat client module
//!
//! The connection manager and the pieces it is built from: listener registry,
//! reconnect bookkeeping and the heartbeat task.

mod heartbeat;
mod manager;
mod reconnect;
mod registry;

pub use heartbeat::*;
pub use manager::*;
pub use reconnect::*;
pub use registry::*;
