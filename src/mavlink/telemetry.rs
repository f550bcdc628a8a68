//! MAVLink Telemetry Conversion
//!
//! Converts the flight-controller messages the bridge consumes into link types.

use mavbridge_shared::TelemetrySample;
use mavlink::ardupilotmega::{
    MavCmd, MavModeFlag, MavResult, COMMAND_ACK_DATA, GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA,
};

use crate::vehicle::{AckResult, CommandAck, VehicleCommand, VehicleHeartbeat};

/// Position from GLOBAL_POSITION_INT; altitude is relative to home
///
/// A report at exactly 0,0 is the autopilot's "no fix" placeholder.
pub fn sample_from_global_position(pos: &GLOBAL_POSITION_INT_DATA) -> Option<TelemetrySample> {
    if pos.lat == 0 && pos.lon == 0 {
        return None;
    }

    TelemetrySample::new(
        pos.lat as f64 / 1e7,
        pos.lon as f64 / 1e7,
        pos.relative_alt as f32 / 1000.0, // mm to m
    )
}

/// Commands the bridge tracks acknowledgments for
pub fn vehicle_command(command: MavCmd) -> Option<VehicleCommand> {
    match command {
        MavCmd::MAV_CMD_COMPONENT_ARM_DISARM => Some(VehicleCommand::ArmDisarm),
        MavCmd::MAV_CMD_NAV_TAKEOFF => Some(VehicleCommand::Takeoff),
        MavCmd::MAV_CMD_NAV_LAND => Some(VehicleCommand::Land),
        MavCmd::MAV_CMD_DO_SET_MODE => Some(VehicleCommand::SetMode),
        MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL => Some(VehicleCommand::SetMessageInterval),
        _ => None,
    }
}

pub fn ack_result(result: MavResult) -> AckResult {
    match result {
        MavResult::MAV_RESULT_ACCEPTED => AckResult::Accepted,
        MavResult::MAV_RESULT_TEMPORARILY_REJECTED => AckResult::TemporarilyRejected,
        MavResult::MAV_RESULT_DENIED => AckResult::Denied,
        MavResult::MAV_RESULT_UNSUPPORTED => AckResult::Unsupported,
        MavResult::MAV_RESULT_FAILED => AckResult::Failed,
        MavResult::MAV_RESULT_IN_PROGRESS => AckResult::InProgress,
        MavResult::MAV_RESULT_CANCELLED => AckResult::Cancelled,
        #[allow(unreachable_patterns)]
        _ => AckResult::Unsupported,
    }
}

/// COMMAND_ACK for a tracked command; other acks are dropped
pub fn ack_from_mavlink(ack: &COMMAND_ACK_DATA) -> Option<CommandAck> {
    vehicle_command(ack.command).map(|command| CommandAck {
        command,
        result: ack_result(ack.result),
    })
}

pub fn heartbeat_from_mavlink(system_id: u8, component_id: u8, hb: &HEARTBEAT_DATA) -> VehicleHeartbeat {
    VehicleHeartbeat {
        system_id,
        component_id,
        custom_mode: hb.custom_mode,
        armed: hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(lat: i32, lon: i32, relative_alt: i32) -> GLOBAL_POSITION_INT_DATA {
        GLOBAL_POSITION_INT_DATA {
            lat,
            lon,
            relative_alt,
            ..Default::default()
        }
    }

    #[test]
    fn test_position_scaling() {
        let sample = sample_from_global_position(&position(-353632610, 1491652300, 12500)).unwrap();
        assert!((sample.lat - -35.363261).abs() < 1e-9);
        assert!((sample.lon - 149.16523).abs() < 1e-9);
        assert_eq!(sample.alt, 12.5);
    }

    #[test]
    fn test_zero_position_is_no_fix() {
        assert_eq!(sample_from_global_position(&position(0, 0, 0)), None);
        // Only both-zero is the placeholder
        assert!(sample_from_global_position(&position(0, 10, 0)).is_some());
    }

    #[test]
    fn test_ack_conversion() {
        let ack = COMMAND_ACK_DATA {
            command: MavCmd::MAV_CMD_DO_SET_MODE,
            result: MavResult::MAV_RESULT_DENIED,
            ..Default::default()
        };
        assert_eq!(
            ack_from_mavlink(&ack),
            Some(CommandAck {
                command: VehicleCommand::SetMode,
                result: AckResult::Denied
            })
        );

        let foreign = COMMAND_ACK_DATA {
            command: MavCmd::MAV_CMD_DO_SET_HOME,
            ..Default::default()
        };
        assert_eq!(ack_from_mavlink(&foreign), None);
    }

    #[test]
    fn test_heartbeat_armed_flag() {
        let hb = HEARTBEAT_DATA {
            custom_mode: 4,
            base_mode: MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED
                | MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            ..Default::default()
        };
        let beat = heartbeat_from_mavlink(1, 1, &hb);
        assert!(beat.armed);
        assert_eq!(beat.custom_mode, 4);
    }
}
