//! Flight Controller Connection
//!
//! Opens the MAVLink link to an ArduPilot flight controller over serial, UDP or
//! TCP. A reader task owns the receive side and routes heartbeats, command acks
//! and positions to the link over channels, so every timed wait on the link is
//! a plain channel receive.

use async_trait::async_trait;
use mavbridge_shared::TelemetrySample;
use mavlink::ardupilotmega::{MavAutopilot, MavMessage};
use mavlink::error::MessageReadError;
use mavlink::{AsyncMavConnection, MavHeader};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::commands::{MavCommandSender, GLOBAL_POSITION_INT_ID};
use super::modes::ArduPilotMode;
use super::telemetry::{ack_from_mavlink, heartbeat_from_mavlink, sample_from_global_position};
use crate::vehicle::{
    CommandAck, LinkConnector, LinkError, PositionTarget, VehicleHeartbeat, VehicleLink,
};

type SharedConnection = Arc<dyn AsyncMavConnection<MavMessage> + Send + Sync>;

const ACK_QUEUE: usize = 32;
const HEARTBEAT_QUEUE: usize = 8;

/// Connection type for flight controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FcConnectionType {
    /// Serial port connection (e.g., "/dev/ttyACM0" at 57600 baud)
    Serial { port: String, baud: u32 },
    /// Listen for UDP (e.g., "0.0.0.0:14550")
    UdpIn { address: String },
    /// Send UDP to a ground station port
    UdpOut { address: String },
    /// Listen for a TCP client
    TcpIn { address: String },
    /// Connect to a TCP server (e.g., SITL on "127.0.0.1:5760")
    TcpOut { address: String },
    /// In-process scripted vehicle
    Sim,
}

impl Default for FcConnectionType {
    fn default() -> Self {
        // Default to SITL UDP for development
        Self::UdpIn {
            address: "0.0.0.0:14550".into(),
        }
    }
}

impl FcConnectionType {
    /// Address string understood by `mavlink::connect_async`
    pub fn mavlink_address(&self) -> Option<String> {
        match self {
            Self::Serial { port, baud } => Some(format!("serial:{}:{}", port, baud)),
            Self::UdpIn { address } => Some(format!("udpin:{}", address)),
            Self::UdpOut { address } => Some(format!("udpout:{}", address)),
            Self::TcpIn { address } => Some(format!("tcpin:{}", address)),
            Self::TcpOut { address } => Some(format!("tcpout:{}", address)),
            Self::Sim => None,
        }
    }
}

impl fmt::Display for FcConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mavlink_address() {
            Some(address) => f.write_str(&address),
            None => f.write_str("sim"),
        }
    }
}

impl FromStr for FcConnectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("sim") {
            return Ok(Self::Sim);
        }

        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| format!("missing scheme in '{}'", s))?;
        if rest.is_empty() {
            return Err(format!("missing address in '{}'", s));
        }
        let address = rest.to_string();

        match scheme {
            "serial" => {
                let (port, baud) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| format!("serial needs <port>:<baud>, got '{}'", rest))?;
                let baud = baud
                    .parse()
                    .map_err(|_| format!("invalid baud rate '{}'", baud))?;
                if port.is_empty() {
                    return Err("serial port is empty".to_string());
                }
                Ok(Self::Serial {
                    port: port.to_string(),
                    baud,
                })
            }
            "udpin" => Ok(Self::UdpIn { address }),
            "udpout" => Ok(Self::UdpOut { address }),
            "tcpin" => Ok(Self::TcpIn { address }),
            "tcpout" => Ok(Self::TcpOut { address }),
            other => Err(format!("unknown connection scheme '{}'", other)),
        }
    }
}

/// Configuration for flight controller connection
#[derive(Debug, Clone)]
pub struct FcConfig {
    /// Connection type and parameters
    pub connection: FcConnectionType,
    /// System ID for this companion computer
    pub system_id: u8,
    /// Component ID for this companion computer
    pub component_id: u8,
    /// Target system ID until the vehicle heartbeat says otherwise
    pub target_system: u8,
    /// Target component ID (autopilot)
    pub target_component: u8,
}

impl Default for FcConfig {
    fn default() -> Self {
        Self {
            connection: FcConnectionType::default(),
            system_id: 255,       // Companion computer
            component_id: 190,    // MAV_COMP_ID_ONBOARD_COMPUTER
            target_system: 1,     // Autopilot
            target_component: 1,  // MAV_COMP_ID_AUTOPILOT1
        }
    }
}

/// Opens [`MavlinkLink`]s
pub struct MavlinkConnector {
    config: FcConfig,
}

impl MavlinkConnector {
    pub fn new(config: FcConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LinkConnector for MavlinkConnector {
    async fn connect(&self) -> Result<Box<dyn VehicleLink>, LinkError> {
        let address = self
            .config
            .connection
            .mavlink_address()
            .ok_or_else(|| LinkError::Connect {
                address: "sim".into(),
                reason: "not a MAVLink address".into(),
            })?;

        info!("[MAVLink] Connecting to flight controller at {}", address);
        let connection = mavlink::connect_async::<MavMessage>(&address)
            .await
            .map_err(|e| LinkError::Connect {
                address: address.clone(),
                reason: e.to_string(),
            })?;
        info!("[MAVLink] Connected to flight controller");

        Ok(Box::new(MavlinkLink::spawn(
            Arc::from(connection),
            &self.config,
        )))
    }

    fn describe(&self) -> String {
        self.config.connection.to_string()
    }
}

/// A live MAVLink link to one flight controller
pub struct MavlinkLink {
    connection: SharedConnection,
    header: MavHeader,
    commands: MavCommandSender,
    acks: mpsc::Receiver<CommandAck>,
    heartbeats: mpsc::Receiver<VehicleHeartbeat>,
    positions: watch::Receiver<Option<TelemetrySample>>,
    fault: watch::Receiver<Option<String>>,
    reader: JoinHandle<()>,
}

impl MavlinkLink {
    fn spawn(connection: SharedConnection, config: &FcConfig) -> Self {
        let (ack_tx, acks) = mpsc::channel(ACK_QUEUE);
        let (heartbeat_tx, heartbeats) = mpsc::channel(HEARTBEAT_QUEUE);
        let (position_tx, positions) = watch::channel(None);
        let (fault_tx, fault) = watch::channel(None);

        let reader = tokio::spawn(read_loop(
            connection.clone(),
            ack_tx,
            heartbeat_tx,
            position_tx,
            fault_tx,
        ));

        Self {
            connection,
            header: MavHeader {
                system_id: config.system_id,
                component_id: config.component_id,
                sequence: 0,
            },
            commands: MavCommandSender::new(config.target_system, config.target_component),
            acks,
            heartbeats,
            positions,
            fault,
            reader,
        }
    }

    fn lost(&self) -> LinkError {
        let reason = self
            .fault
            .borrow()
            .clone()
            .unwrap_or_else(|| "reader stopped".to_string());
        LinkError::LinkLost(reason)
    }

    async fn send(&mut self, msg: MavMessage) -> Result<(), LinkError> {
        if self.fault.borrow().is_some() || self.reader.is_finished() {
            return Err(self.lost());
        }

        self.connection
            .send(&self.header, &msg)
            .await
            .map_err(|e| LinkError::Io(e.to_string()))?;
        self.header.sequence = self.header.sequence.wrapping_add(1);
        Ok(())
    }

    /// Send a command that will be acknowledged, dropping acks queued before it
    async fn send_acked(&mut self, msg: MavMessage) -> Result<(), LinkError> {
        let mut stale = 0;
        while self.acks.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!("[MAVLink] Discarded {} stale acks", stale);
        }
        self.send(msg).await
    }
}

#[async_trait]
impl VehicleLink for MavlinkLink {
    async fn wait_heartbeat(&mut self, timeout: Duration) -> Result<VehicleHeartbeat, LinkError> {
        match tokio::time::timeout(timeout, self.heartbeats.recv()).await {
            Ok(Some(heartbeat)) => {
                self.commands.retarget(heartbeat.system_id);
                info!(
                    "[MAVLink] Heartbeat from system {} (mode {})",
                    heartbeat.system_id,
                    ArduPilotMode::from_custom_mode(heartbeat.custom_mode)
                        .map(|m| m.name())
                        .unwrap_or("UNKNOWN")
                );
                Ok(heartbeat)
            }
            Ok(None) => Err(self.lost()),
            Err(_) => Err(LinkError::HeartbeatTimeout(timeout)),
        }
    }

    async fn request_position_stream(&mut self, rate_hz: u16) -> Result<(), LinkError> {
        let msg = self
            .commands
            .set_message_interval(GLOBAL_POSITION_INT_ID, rate_hz);
        self.send_acked(msg).await?;
        info!("[MAVLink] Requested GLOBAL_POSITION_INT at {} Hz", rate_hz);
        Ok(())
    }

    async fn send_arm(&mut self, force: bool) -> Result<(), LinkError> {
        let msg = self.commands.arm(force);
        self.send_acked(msg).await
    }

    async fn send_disarm(&mut self, force: bool) -> Result<(), LinkError> {
        let msg = self.commands.disarm(force);
        self.send_acked(msg).await
    }

    async fn send_takeoff(&mut self, altitude_m: f32) -> Result<(), LinkError> {
        let msg = self.commands.takeoff(altitude_m);
        self.send_acked(msg).await
    }

    async fn send_land(&mut self) -> Result<(), LinkError> {
        let msg = self.commands.land();
        self.send_acked(msg).await
    }

    async fn send_position_target(&mut self, target: &PositionTarget) -> Result<(), LinkError> {
        let msg = self.commands.position_target(target);
        self.send(msg).await
    }

    async fn send_mode(&mut self, mode: ArduPilotMode) -> Result<(), LinkError> {
        let msg = self.commands.set_mode(mode);
        self.send_acked(msg).await
    }

    async fn read_global_position(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<TelemetrySample>, LinkError> {
        match tokio::time::timeout(timeout, self.positions.changed()).await {
            Ok(Ok(())) => Ok(*self.positions.borrow_and_update()),
            Ok(Err(_)) => Err(self.lost()),
            Err(_) => Ok(None),
        }
    }

    async fn read_command_ack(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<CommandAck>, LinkError> {
        match tokio::time::timeout(timeout, self.acks.recv()).await {
            Ok(Some(ack)) => Ok(Some(ack)),
            Ok(None) => Err(self.lost()),
            Err(_) => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.reader.abort();
        info!("[MAVLink] Link closed");
    }
}

impl Drop for MavlinkLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Sole reader of the byte stream
async fn read_loop(
    connection: SharedConnection,
    acks: mpsc::Sender<CommandAck>,
    heartbeats: mpsc::Sender<VehicleHeartbeat>,
    positions: watch::Sender<Option<TelemetrySample>>,
    fault: watch::Sender<Option<String>>,
) {
    loop {
        match connection.recv().await {
            Ok((header, msg)) => match msg {
                MavMessage::HEARTBEAT(hb) => {
                    // Ground stations and peripherals beat too
                    if hb.autopilot == MavAutopilot::MAV_AUTOPILOT_INVALID {
                        continue;
                    }
                    let beat = heartbeat_from_mavlink(header.system_id, header.component_id, &hb);
                    let _ = heartbeats.try_send(beat);
                }
                MavMessage::COMMAND_ACK(ack) => {
                    if let Some(ack) = ack_from_mavlink(&ack) {
                        if acks.try_send(ack).is_err() {
                            warn!("[MAVLink] Ack queue full, dropping {:?}", ack);
                        }
                    }
                }
                MavMessage::GLOBAL_POSITION_INT(pos) => {
                    positions.send_replace(sample_from_global_position(&pos));
                }
                MavMessage::STATUSTEXT(text) => {
                    let text = String::from_utf8_lossy(&text.text).to_string();
                    info!("[FC] {}", text.trim_end_matches('\0'));
                }
                _ => {}
            },
            Err(MessageReadError::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // No data available, continue
                tokio::task::yield_now().await;
            }
            Err(MessageReadError::Io(e)) => {
                error!("[MAVLink] Read error: {}", e);
                fault.send_replace(Some(e.to_string()));
                return;
            }
            Err(e) => {
                debug!("[MAVLink] Skipping unparsable frame: {}", e);
            }
        }
    }
}
