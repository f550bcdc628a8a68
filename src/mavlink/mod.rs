//! MAVLink Bridge Module
//!
//! Provides integration with ArduPilot flight controllers via MAVLink protocol.
//! Supports serial, UDP and TCP connections.

mod commands;
mod connection;
mod modes;
mod telemetry;

pub use commands::{MavCommandSender, FORCE_ARM_MAGIC, FORCE_DISARM_MAGIC};
pub use connection::{FcConfig, FcConnectionType, MavlinkConnector, MavlinkLink};
pub use modes::ArduPilotMode;
pub use telemetry::{ack_from_mavlink, sample_from_global_position};
