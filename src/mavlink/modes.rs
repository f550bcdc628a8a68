//! ArduCopter flight modes
//!
//! Human-readable mode names map to the autopilot's custom-mode numbers used
//! by `MAV_CMD_DO_SET_MODE` and reported in `HEARTBEAT.custom_mode`.

use std::fmt;
use std::str::FromStr;

use crate::vehicle::SessionError;

/// ArduPilot Copter flight modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ArduPilotMode {
    Stabilize = 0,
    Acro = 1,
    AltHold = 2,
    Auto = 3,
    Guided = 4,
    Loiter = 5,
    Rtl = 6,
    Circle = 7,
    Position = 8,
    Land = 9,
    OfLoiter = 10,
    Drift = 11,
    Sport = 13,
    Flip = 14,
    AutoTune = 15,
    PosHold = 16,
    Brake = 17,
    Throw = 18,
    AvoidAdsb = 19,
    GuidedNoGps = 20,
    SmartRtl = 21,
    FlowHold = 22,
    Follow = 23,
    ZigZag = 24,
    SystemId = 25,
    HeliAutorotate = 26,
    AutoRtl = 27,
}

const MODE_TABLE: &[(&str, ArduPilotMode)] = &[
    ("STABILIZE", ArduPilotMode::Stabilize),
    ("ACRO", ArduPilotMode::Acro),
    ("ALT_HOLD", ArduPilotMode::AltHold),
    ("AUTO", ArduPilotMode::Auto),
    ("GUIDED", ArduPilotMode::Guided),
    ("LOITER", ArduPilotMode::Loiter),
    ("RTL", ArduPilotMode::Rtl),
    ("CIRCLE", ArduPilotMode::Circle),
    ("POSITION", ArduPilotMode::Position),
    ("LAND", ArduPilotMode::Land),
    ("OF_LOITER", ArduPilotMode::OfLoiter),
    ("DRIFT", ArduPilotMode::Drift),
    ("SPORT", ArduPilotMode::Sport),
    ("FLIP", ArduPilotMode::Flip),
    ("AUTOTUNE", ArduPilotMode::AutoTune),
    ("POSHOLD", ArduPilotMode::PosHold),
    ("BRAKE", ArduPilotMode::Brake),
    ("THROW", ArduPilotMode::Throw),
    ("AVOID_ADSB", ArduPilotMode::AvoidAdsb),
    ("GUIDED_NOGPS", ArduPilotMode::GuidedNoGps),
    ("SMART_RTL", ArduPilotMode::SmartRtl),
    ("FLOWHOLD", ArduPilotMode::FlowHold),
    ("FOLLOW", ArduPilotMode::Follow),
    ("ZIGZAG", ArduPilotMode::ZigZag),
    ("SYSTEMID", ArduPilotMode::SystemId),
    ("AUTOROTATE", ArduPilotMode::HeliAutorotate),
    ("AUTO_RTL", ArduPilotMode::AutoRtl),
];

impl ArduPilotMode {
    /// Custom-mode number sent to the autopilot
    pub fn custom_mode(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        MODE_TABLE
            .iter()
            .find(|(_, mode)| *mode == self)
            .map(|(name, _)| *name)
            .unwrap_or("UNKNOWN")
    }

    /// Reverse lookup from a heartbeat's custom mode
    pub fn from_custom_mode(custom_mode: u32) -> Option<Self> {
        MODE_TABLE
            .iter()
            .find(|(_, mode)| mode.custom_mode() == custom_mode)
            .map(|(_, mode)| *mode)
    }

    /// Names accepted by `set_mode`
    pub fn names() -> impl Iterator<Item = &'static str> {
        MODE_TABLE.iter().map(|(name, _)| *name)
    }
}

impl fmt::Display for ArduPilotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArduPilotMode {
    type Err = SessionError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let wanted = name.trim();
        MODE_TABLE
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(wanted))
            .map(|(_, mode)| *mode)
            .ok_or_else(|| SessionError::UnknownFlightMode(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ardupilot_modes() {
        assert_eq!(ArduPilotMode::Guided as u32, 4);
        assert_eq!(ArduPilotMode::Rtl as u32, 6);
        assert_eq!(ArduPilotMode::Land as u32, 9);
        assert_eq!(ArduPilotMode::AutoRtl.custom_mode(), 27);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!("GUIDED".parse::<ArduPilotMode>(), Ok(ArduPilotMode::Guided));
        assert_eq!("loiter".parse::<ArduPilotMode>(), Ok(ArduPilotMode::Loiter));
        assert_eq!(" Smart_Rtl ".parse::<ArduPilotMode>(), Ok(ArduPilotMode::SmartRtl));
    }

    #[test]
    fn test_unknown_mode() {
        assert_eq!(
            "HOVER".parse::<ArduPilotMode>(),
            Err(SessionError::UnknownFlightMode("HOVER".into()))
        );
    }

    #[test]
    fn test_custom_mode_round_trip() {
        for name in ArduPilotMode::names() {
            let mode: ArduPilotMode = name.parse().unwrap();
            assert_eq!(ArduPilotMode::from_custom_mode(mode.custom_mode()), Some(mode));
            assert_eq!(mode.name(), name);
        }
        assert_eq!(ArduPilotMode::from_custom_mode(12), None);
    }
}
