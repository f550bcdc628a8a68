//! Channel message types
//!
//! Every payload on the channel is a JSON object with two fields:
//! ```text
//! { "msg_type": "<tag>", "args": { ...tag specific... } }
//! ```
//! Inbound messages are [`CommandMessage`]s, outbound ones are
//! [`OutboundMessage`]s.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of inbound command tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    InitConnection,
    Arm,
    Disarm,
    Takeoff,
    Land,
    Move,
    SetMode,
    Heartbeat,
    EndConnection,
}

impl MessageKind {
    /// All recognized tags, in routing-table order
    pub const ALL: [MessageKind; 9] = [
        MessageKind::InitConnection,
        MessageKind::Arm,
        MessageKind::Disarm,
        MessageKind::Takeoff,
        MessageKind::Land,
        MessageKind::Move,
        MessageKind::SetMode,
        MessageKind::Heartbeat,
        MessageKind::EndConnection,
    ];

    /// Wire tag for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::InitConnection => "init_connection",
            MessageKind::Arm => "arm",
            MessageKind::Disarm => "disarm",
            MessageKind::Takeoff => "takeoff",
            MessageKind::Land => "land",
            MessageKind::Move => "move",
            MessageKind::SetMode => "set_mode",
            MessageKind::Heartbeat => "heartbeat",
            MessageKind::EndConnection => "end_connection",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == tag)
            .ok_or_else(|| tag.to_string())
    }
}

/// Arguments of `init_connection`; both intervals are milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitConnectionArgs {
    pub heartbeat_interval: u64,
    pub state_interval: u64,
}

/// Arguments of `arm` and `disarm`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArmArgs {
    #[serde(default)]
    pub force: bool,
}

/// Arguments of `takeoff`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TakeoffArgs {
    /// Target altitude above home in metres
    pub altitude: f32,
}

/// Arguments of `move`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveArgs {
    pub lat: f64,
    pub lon: f64,
    /// Altitude relative to home in metres
    pub alt: f32,
    #[serde(default)]
    pub vx: f32,
    #[serde(default)]
    pub vy: f32,
    #[serde(default)]
    pub vz: f32,
}

impl MoveArgs {
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.alt.is_finite()
            && self.vx.is_finite()
            && self.vy.is_finite()
            && self.vz.is_finite()
    }
}

/// Arguments of `set_mode`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetModeArgs {
    pub mode: String,
}

/// A classified inbound command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "msg_type", content = "args", rename_all = "snake_case")]
pub enum CommandMessage {
    InitConnection(InitConnectionArgs),
    Arm(ArmArgs),
    Disarm(ArmArgs),
    Takeoff(TakeoffArgs),
    Land,
    Move(MoveArgs),
    SetMode(SetModeArgs),
    Heartbeat,
    EndConnection,
}

impl CommandMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            CommandMessage::InitConnection(_) => MessageKind::InitConnection,
            CommandMessage::Arm(_) => MessageKind::Arm,
            CommandMessage::Disarm(_) => MessageKind::Disarm,
            CommandMessage::Takeoff(_) => MessageKind::Takeoff,
            CommandMessage::Land => MessageKind::Land,
            CommandMessage::Move(_) => MessageKind::Move,
            CommandMessage::SetMode(_) => MessageKind::SetMode,
            CommandMessage::Heartbeat => MessageKind::Heartbeat,
            CommandMessage::EndConnection => MessageKind::EndConnection,
        }
    }
}

/// A position fix read from the vehicle
///
/// Construct through [`TelemetrySample::new`], which refuses non-finite values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub lat: f64,
    pub lon: f64,
    /// Altitude relative to home in metres
    pub alt: f32,
}

impl TelemetrySample {
    pub fn new(lat: f64, lon: f64, alt: f32) -> Option<Self> {
        if lat.is_finite() && lon.is_finite() && alt.is_finite() {
            Some(Self { lat, lon, alt })
        } else {
            None
        }
    }
}

/// Status carried by a `command_result` report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// Vehicle acknowledged, or the command needed no acknowledgment
    Completed,
    /// Accepted and being monitored in the background
    Started,
    /// Valid but nothing to do
    Skipped,
    /// Refused by the vehicle or by classification
    Rejected,
    /// No acknowledgment, or the session could not run it
    Failed,
}

/// Messages the bridge publishes on its outbound topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg_type", content = "args", rename_all = "snake_case")]
pub enum OutboundMessage {
    Heartbeat {
        device_id: String,
        seq: u64,
        uptime_ms: u64,
    },
    State(TelemetrySample),
    CommandResult {
        /// Command tag, or the raw tag when classification failed
        command: String,
        status: CommandStatus,
        message: String,
    },
    Liveness {
        alive: bool,
    },
}

impl OutboundMessage {
    pub fn tag(&self) -> &'static str {
        match self {
            OutboundMessage::Heartbeat { .. } => "heartbeat",
            OutboundMessage::State(_) => "state",
            OutboundMessage::CommandResult { .. } => "command_result",
            OutboundMessage::Liveness { .. } => "liveness",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_tag() {
        for kind in MessageKind::ALL {
            assert_eq!(kind.as_str().parse::<MessageKind>(), Ok(kind));
        }
        assert_eq!("fly".parse::<MessageKind>(), Err("fly".to_string()));
    }

    #[test]
    fn test_telemetry_sample_rejects_non_finite() {
        assert!(TelemetrySample::new(47.1, 8.5, 12.0).is_some());
        assert!(TelemetrySample::new(f64::NAN, 8.5, 12.0).is_none());
        assert!(TelemetrySample::new(47.1, f64::INFINITY, 12.0).is_none());
        assert!(TelemetrySample::new(47.1, 8.5, f32::NAN).is_none());
    }

    #[test]
    fn test_outbound_state_shape() {
        let msg = OutboundMessage::State(TelemetrySample {
            lat: 1.5,
            lon: 2.5,
            alt: 3.0,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["msg_type"], "state");
        assert_eq!(value["args"]["lat"], 1.5);
        assert_eq!(value["args"]["alt"], 3.0);
    }
}
