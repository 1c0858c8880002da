//! Configuration module
//!
//! Handles loading client settings: endpoint, reconnect policy and heartbeat.

mod client;

pub use client::*;
