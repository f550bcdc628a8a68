//! mavbridge
//!
//! Bridges a publish/subscribe command channel to a single vehicle's MAVLink
//! flight controller: commands in, acknowledgments, telemetry and heartbeats
//! out, with the operator's liveness watched on the side.

pub mod bridge;
pub mod channel;
pub mod command;
pub mod config;
pub mod liveness;
pub mod mavlink;
pub mod periodic;
pub mod vehicle;

pub use bridge::{Bridge, BridgeExit};
pub use config::BridgeConfig;
