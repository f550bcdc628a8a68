//! Liveness Module
//!
//! Watches the operator's heartbeat and reports when it goes silent.

mod monitor;

pub use mavbridge_shared::{LivenessEvent, Verdict};
pub use monitor::{LivenessMonitor, LivenessSettings};
