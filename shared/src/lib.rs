//! mavbridge Shared Types
//!
//! Channel message types, their JSON codec and the liveness state machine,
//! shared by the bridge and by anything that talks to it over the channel.

pub mod codec;
pub mod liveness;
pub mod message;

// Re-export commonly used types at crate root
pub use codec::CodecError;
pub use liveness::{LivenessEvent, LivenessStateMachine, Verdict};
pub use message::*;

/// Timing and threshold parameters for the bridge
pub mod timing {
    /// Acknowledgment attempts before a command is reported as failed
    pub const ACK_RETRIES: u32 = 10;

    /// Wait per acknowledgment attempt
    pub const ACK_TIMEOUT_MS: u64 = 1000;

    /// Liveness self-check period
    pub const LIVENESS_CHECK_INTERVAL_MS: u64 = 1000;

    /// Operator silence before it is declared dead
    pub const LIVENESS_DIE_TIME_MS: u64 = 10_000;

    /// Vehicle heartbeat wait when opening the link
    pub const VEHICLE_HEARTBEAT_TIMEOUT_MS: u64 = 10_000;

    /// GLOBAL_POSITION_INT stream rate requested on initialization
    pub const POSITION_STREAM_RATE_HZ: u16 = 10;

    /// Single position read used by the telemetry publisher
    pub const TELEMETRY_READ_TIMEOUT_MS: u64 = 500;

    /// Poll period of takeoff/landing monitors
    pub const FLIGHT_MONITOR_INTERVAL_MS: u64 = 1000;

    /// Takeoff is complete at this fraction of the target altitude
    pub const TAKEOFF_COMPLETE_RATIO: f32 = 0.85;

    /// At or below this relative altitude the vehicle counts as landed
    pub const LANDED_ALTITUDE_M: f32 = 0.3;

    /// Time given to in-flight publishes on end_connection
    pub const SHUTDOWN_GRACE_MS: u64 = 500;
}

/// Inbound and outbound topics of one vehicle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub inbound: String,
    pub outbound: String,
}

impl Topics {
    /// `<prefix>/<device_id>/cmd` and `<prefix>/<device_id>/state`
    pub fn for_device(prefix: &str, device_id: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            inbound: format!("{}/{}/cmd", prefix, device_id),
            outbound: format!("{}/{}/state", prefix, device_id),
        }
    }
}
