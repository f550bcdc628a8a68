//! Bridge configuration
//!
//! Every field has a default, so an empty (or absent) TOML file is a valid
//! configuration. Command-line flags override individual fields afterwards.

use mavbridge_shared::{timing, Topics};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::channel::MqttSettings;
use crate::liveness::LivenessSettings;
use crate::mavlink::{ArduPilotMode, FcConfig, FcConnectionType};
use crate::vehicle::{AckPolicy, SessionSettings};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub device_id: String,
    pub channel: ChannelConfig,
    pub vehicle: VehicleConfig,
    pub liveness: LivenessConfig,
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub host: String,
    pub port: u16,
    /// Defaults to `mavbridge-<device_id>`
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    pub connect_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    pub topic_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// `serial:<port>:<baud>`, `udpin:<addr>`, `udpout:<addr>`,
    /// `tcpin:<addr>`, `tcpout:<addr>` or `sim`
    pub connection: String,
    pub system_id: u8,
    pub component_id: u8,
    pub target_system: u8,
    pub target_component: u8,
    pub ack_retries: u32,
    pub ack_timeout_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub position_rate_hz: u16,
    pub telemetry_read_timeout_ms: u64,
    pub monitor_interval_ms: u64,
    pub initial_mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub die_time_ms: u64,
    pub check_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_id: "1".into(),
            channel: ChannelConfig::default(),
            vehicle: VehicleConfig::default(),
            liveness: LivenessConfig::default(),
            shutdown_grace_ms: timing::SHUTDOWN_GRACE_MS,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: None,
            keep_alive_secs: 30,
            connect_timeout_ms: 5000,
            reconnect_delay_ms: 2000,
            topic_prefix: "drone".into(),
        }
    }
}

impl Default for VehicleConfig {
    fn default() -> Self {
        let fc = FcConfig::default();
        Self {
            connection: fc.connection.to_string(),
            system_id: fc.system_id,
            component_id: fc.component_id,
            target_system: fc.target_system,
            target_component: fc.target_component,
            ack_retries: timing::ACK_RETRIES,
            ack_timeout_ms: timing::ACK_TIMEOUT_MS,
            heartbeat_timeout_ms: timing::VEHICLE_HEARTBEAT_TIMEOUT_MS,
            position_rate_hz: timing::POSITION_STREAM_RATE_HZ,
            telemetry_read_timeout_ms: timing::TELEMETRY_READ_TIMEOUT_MS,
            monitor_interval_ms: timing::FLIGHT_MONITOR_INTERVAL_MS,
            initial_mode: ArduPilotMode::Guided.name().into(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            die_time_ms: timing::LIVENESS_DIE_TIME_MS,
            check_interval_ms: timing::LIVENESS_CHECK_INTERVAL_MS,
        }
    }
}

impl BridgeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Check everything that would otherwise fail at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id.trim().is_empty() {
            return Err(invalid("device_id", "must not be empty"));
        }
        if self.device_id.contains(['/', '+', '#']) {
            return Err(invalid("device_id", "must not contain MQTT topic characters"));
        }
        if self.channel.host.trim().is_empty() {
            return Err(invalid("channel.host", "must not be empty"));
        }
        if self.channel.topic_prefix.trim_matches('/').is_empty() {
            return Err(invalid("channel.topic_prefix", "must not be empty"));
        }
        if self.channel.connect_timeout_ms == 0 {
            return Err(invalid("channel.connect_timeout_ms", "must be > 0"));
        }

        self.fc_config()?;
        self.session_settings()?;

        if self.vehicle.ack_retries == 0 {
            return Err(invalid("vehicle.ack_retries", "must be > 0"));
        }
        for (field, value) in [
            ("vehicle.ack_timeout_ms", self.vehicle.ack_timeout_ms),
            ("vehicle.heartbeat_timeout_ms", self.vehicle.heartbeat_timeout_ms),
            ("vehicle.telemetry_read_timeout_ms", self.vehicle.telemetry_read_timeout_ms),
            ("vehicle.monitor_interval_ms", self.vehicle.monitor_interval_ms),
            ("liveness.die_time_ms", self.liveness.die_time_ms),
            ("liveness.check_interval_ms", self.liveness.check_interval_ms),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be > 0"));
            }
        }
        if self.vehicle.position_rate_hz == 0 {
            return Err(invalid("vehicle.position_rate_hz", "must be > 0"));
        }

        Ok(())
    }

    pub fn topics(&self) -> Topics {
        Topics::for_device(&self.channel.topic_prefix, &self.device_id)
    }

    pub fn connection_type(&self) -> Result<FcConnectionType, ConfigError> {
        self.vehicle
            .connection
            .parse()
            .map_err(|reason| invalid("vehicle.connection", reason))
    }

    pub fn fc_config(&self) -> Result<FcConfig, ConfigError> {
        Ok(FcConfig {
            connection: self.connection_type()?,
            system_id: self.vehicle.system_id,
            component_id: self.vehicle.component_id,
            target_system: self.vehicle.target_system,
            target_component: self.vehicle.target_component,
        })
    }

    pub fn session_settings(&self) -> Result<SessionSettings, ConfigError> {
        let initial_mode = self
            .vehicle
            .initial_mode
            .parse()
            .map_err(|_| invalid("vehicle.initial_mode", format!("unknown mode {:?}", self.vehicle.initial_mode)))?;

        Ok(SessionSettings {
            ack: AckPolicy {
                retries: self.vehicle.ack_retries,
                timeout: Duration::from_millis(self.vehicle.ack_timeout_ms),
            },
            heartbeat_timeout: Duration::from_millis(self.vehicle.heartbeat_timeout_ms),
            position_rate_hz: self.vehicle.position_rate_hz,
            telemetry_read_timeout: Duration::from_millis(self.vehicle.telemetry_read_timeout_ms),
            monitor_interval: Duration::from_millis(self.vehicle.monitor_interval_ms),
            initial_mode,
        })
    }

    pub fn liveness_settings(&self) -> LivenessSettings {
        LivenessSettings {
            die_time: Duration::from_millis(self.liveness.die_time_ms),
            check_interval: Duration::from_millis(self.liveness.check_interval_ms),
        }
    }

    pub fn mqtt_settings(&self) -> MqttSettings {
        MqttSettings {
            host: self.channel.host.clone(),
            port: self.channel.port,
            client_id: self
                .channel
                .client_id
                .clone()
                .unwrap_or_else(|| format!("mavbridge-{}", self.device_id)),
            keep_alive: Duration::from_secs(self.channel.keep_alive_secs),
            connect_timeout: Duration::from_millis(self.channel.connect_timeout_ms),
            reconnect_delay: Duration::from_millis(self.channel.reconnect_delay_ms),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BridgeConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.topics().inbound, "drone/1/cmd");
        assert_eq!(config.vehicle.connection, "udpin:0.0.0.0:14550");

        let settings = config.session_settings().unwrap();
        assert_eq!(settings.ack.retries, 10);
        assert_eq!(settings.initial_mode, ArduPilotMode::Guided);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: BridgeConfig = toml::from_str(
            r#"
            device_id = "7"

            [vehicle]
            connection = "serial:/dev/ttyACM0:57600"
            ack_retries = 3

            [liveness]
            die_time_ms = 5000
            "#,
        )
        .unwrap();

        assert_eq!(config.device_id, "7");
        assert_eq!(config.vehicle.ack_retries, 3);
        assert_eq!(config.vehicle.ack_timeout_ms, 1000);
        assert_eq!(config.liveness.die_time_ms, 5000);
        assert_eq!(config.channel.port, 1883);
        assert!(matches!(
            config.connection_type(),
            Ok(FcConnectionType::Serial { baud: 57600, .. })
        ));
        assert_eq!(config.mqtt_settings().client_id, "mavbridge-7");
    }

    #[test]
    fn test_validation_errors() {
        let mut config = BridgeConfig::default();
        config.vehicle.connection = "carrier-pigeon".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "vehicle.connection",
                ..
            })
        ));

        let mut config = BridgeConfig::default();
        config.vehicle.initial_mode = "HOVER".into();
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.liveness.die_time_ms = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.device_id = "a/b".into();
        assert!(config.validate().is_err());
    }
}
