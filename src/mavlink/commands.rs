//! MAVLink Command Translation
//!
//! Builds the MAVLink messages for each vehicle operation. Nothing here does
//! I/O; [`MavlinkLink`](super::MavlinkLink) sends what these return.

use mavlink::ardupilotmega::{
    MavCmd, MavFrame, MavMessage, PositionTargetTypemask, COMMAND_LONG_DATA,
    SET_POSITION_TARGET_GLOBAL_INT_DATA,
};

use super::modes::ArduPilotMode;
use crate::vehicle::PositionTarget;

/// ArduPilot magic value bypassing pre-arm checks
pub const FORCE_ARM_MAGIC: f32 = 2989.0;

/// ArduPilot magic value allowing disarm in flight
pub const FORCE_DISARM_MAGIC: f32 = 21196.0;

/// MAV_MODE_FLAG_CUSTOM_MODE_ENABLED
const CUSTOM_MODE_ENABLED: f32 = 1.0;

/// Message id of GLOBAL_POSITION_INT
pub const GLOBAL_POSITION_INT_ID: u32 = 33;

/// Ignore acceleration, force, yaw and yaw rate; use position and velocity
const POSITION_VELOCITY_MASK: u16 = 0b0000_1111_1100_0000;

/// Builds commands addressed to one flight controller
#[derive(Debug, Clone, Copy)]
pub struct MavCommandSender {
    target_system: u8,
    target_component: u8,
}

impl MavCommandSender {
    pub fn new(target_system: u8, target_component: u8) -> Self {
        Self {
            target_system,
            target_component,
        }
    }

    /// Re-address commands to the system seen in the vehicle heartbeat
    pub fn retarget(&mut self, target_system: u8) {
        self.target_system = target_system;
    }

    fn command_long(&self, command: MavCmd, params: [f32; 7]) -> MavMessage {
        MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        })
    }

    pub fn arm(&self, force: bool) -> MavMessage {
        let magic = if force { FORCE_ARM_MAGIC } else { 0.0 };
        self.command_long(
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            [1.0, magic, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
    }

    pub fn disarm(&self, force: bool) -> MavMessage {
        let magic = if force { FORCE_DISARM_MAGIC } else { 0.0 };
        self.command_long(
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            [0.0, magic, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
    }

    /// Take off to `altitude_m` above home at the current position
    pub fn takeoff(&self, altitude_m: f32) -> MavMessage {
        self.command_long(
            MavCmd::MAV_CMD_NAV_TAKEOFF,
            [
                0.0,        // Minimum pitch
                0.0,        // Empty
                0.0,        // Empty
                f32::NAN,   // Yaw angle (NAN = current)
                f32::NAN,   // Latitude (NAN = current)
                f32::NAN,   // Longitude (NAN = current)
                altitude_m, // Altitude
            ],
        )
    }

    /// Land at current position
    pub fn land(&self) -> MavMessage {
        self.command_long(
            MavCmd::MAV_CMD_NAV_LAND,
            [0.0, 0.0, 0.0, f32::NAN, f32::NAN, f32::NAN, 0.0],
        )
    }

    pub fn set_mode(&self, mode: ArduPilotMode) -> MavMessage {
        self.command_long(
            MavCmd::MAV_CMD_DO_SET_MODE,
            [
                CUSTOM_MODE_ENABLED,
                mode.custom_mode() as f32,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
            ],
        )
    }

    /// Ask for `message_id` to be streamed at `rate_hz`
    pub fn set_message_interval(&self, message_id: u32, rate_hz: u16) -> MavMessage {
        let interval_us = 1_000_000.0 / f32::from(rate_hz.max(1));
        self.command_long(
            MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL,
            [message_id as f32, interval_us, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
    }

    /// Guided-mode position and velocity target
    #[allow(deprecated)]
    pub fn position_target(&self, target: &PositionTarget) -> MavMessage {
        MavMessage::SET_POSITION_TARGET_GLOBAL_INT(SET_POSITION_TARGET_GLOBAL_INT_DATA {
            time_boot_ms: 0,
            target_system: self.target_system,
            target_component: self.target_component,
            coordinate_frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT,
            type_mask: PositionTargetTypemask::from_bits_truncate(POSITION_VELOCITY_MASK),
            lat_int: (target.lat * 1e7) as i32,
            lon_int: (target.lon * 1e7) as i32,
            alt: target.alt,
            vx: target.vx,
            vy: target.vy,
            vz: target.vz,
            afx: 0.0,
            afy: 0.0,
            afz: 0.0,
            yaw: 0.0,
            yaw_rate: 0.0,
        })
    }
}
