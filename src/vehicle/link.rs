//! Vehicle link abstraction for pluggable flight-controller backends

use async_trait::async_trait;
use mavbridge_shared::{MoveArgs, TelemetrySample};
use std::time::Duration;

use super::error::LinkError;
use crate::mavlink::ArduPilotMode;

/// Vehicle commands whose acknowledgments the bridge tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleCommand {
    ArmDisarm,
    Takeoff,
    Land,
    SetMode,
    SetMessageInterval,
}

/// Result carried by a command acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckResult {
    Accepted,
    TemporarilyRejected,
    Denied,
    Unsupported,
    Failed,
    InProgress,
    Cancelled,
}

impl AckResult {
    /// A final answer; `InProgress` means another ack will follow
    pub fn is_final(self) -> bool {
        !matches!(self, AckResult::InProgress)
    }

    pub fn describe(self) -> &'static str {
        match self {
            AckResult::Accepted => "accepted",
            AckResult::TemporarilyRejected => "temporarily rejected",
            AckResult::Denied => "denied",
            AckResult::Unsupported => "unsupported",
            AckResult::Failed => "failed",
            AckResult::InProgress => "in progress",
            AckResult::Cancelled => "cancelled",
        }
    }
}

/// An acknowledgment read from the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandAck {
    pub command: VehicleCommand,
    pub result: AckResult,
}

/// Heartbeat seen while opening the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleHeartbeat {
    pub system_id: u8,
    pub component_id: u8,
    pub custom_mode: u32,
    pub armed: bool,
}

/// Target for `move`: global position with relative altitude, plus velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionTarget {
    pub lat: f64,
    pub lon: f64,
    pub alt: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
}

impl From<MoveArgs> for PositionTarget {
    fn from(args: MoveArgs) -> Self {
        Self {
            lat: args.lat,
            lon: args.lon,
            alt: args.alt,
            vx: args.vx,
            vy: args.vy,
            vz: args.vz,
        }
    }
}

/// Typed operations against one flight controller
///
/// Implementations are used behind the session's lock, so they never see
/// concurrent calls.
#[async_trait]
pub trait VehicleLink: Send {
    /// Wait for the vehicle's heartbeat; adopts its system id as the target
    async fn wait_heartbeat(&mut self, timeout: Duration) -> Result<VehicleHeartbeat, LinkError>;

    /// Answered by a `SetMessageInterval` acknowledgment
    async fn request_position_stream(&mut self, rate_hz: u16) -> Result<(), LinkError>;

    async fn send_arm(&mut self, force: bool) -> Result<(), LinkError>;

    async fn send_disarm(&mut self, force: bool) -> Result<(), LinkError>;

    async fn send_takeoff(&mut self, altitude_m: f32) -> Result<(), LinkError>;

    async fn send_land(&mut self) -> Result<(), LinkError>;

    async fn send_position_target(&mut self, target: &PositionTarget) -> Result<(), LinkError>;

    async fn send_mode(&mut self, mode: ArduPilotMode) -> Result<(), LinkError>;

    /// Next position report, or `None` when no fix arrives within `timeout`
    async fn read_global_position(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<TelemetrySample>, LinkError>;

    /// Next acknowledgment, or `None` when nothing arrives within `timeout`
    async fn read_command_ack(&mut self, timeout: Duration)
        -> Result<Option<CommandAck>, LinkError>;

    /// Release the underlying transport
    async fn close(&mut self) {}
}

/// Factory for vehicle links
#[async_trait]
pub trait LinkConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn VehicleLink>, LinkError>;

    /// Human-readable address for logs
    fn describe(&self) -> String;
}
