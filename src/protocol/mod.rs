//! Wire protocol module
//!
//! JSON envelopes with a `type` discriminator, and the typed payloads built on them.

mod envelope;
mod messages;

pub use envelope::*;
pub use messages::*;
