//! Vehicle Session
//!
//! Owns the link to the flight controller and serializes every operation on it
//! behind one lock. Acknowledged commands (arm, disarm, set_mode) hold the lock
//! for their whole retry loop; takeoff and land return once sent and hand the
//! rest to a flight monitor.

use mavbridge_shared::{timing, MoveArgs, TelemetrySample};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::ack::{await_ack, AckOutcome, AckPolicy};
use super::error::{LinkError, SessionError};
use super::link::{LinkConnector, PositionTarget, VehicleCommand, VehicleLink};
use super::monitor::{run_flight_monitor, FlightGoal};
use crate::mavlink::ArduPilotMode;

/// Session lifecycle as seen by background activities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Ready,
    /// Link dropped after a fatal error; `initialize` may run again
    Lost,
    /// Closed by `end_connection`
    Closed,
}

/// Timing parameters of the session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub ack: AckPolicy,
    pub heartbeat_timeout: Duration,
    pub position_rate_hz: u16,
    pub telemetry_read_timeout: Duration,
    pub monitor_interval: Duration,
    pub initial_mode: ArduPilotMode,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ack: AckPolicy::default(),
            heartbeat_timeout: Duration::from_millis(timing::VEHICLE_HEARTBEAT_TIMEOUT_MS),
            position_rate_hz: timing::POSITION_STREAM_RATE_HZ,
            telemetry_read_timeout: Duration::from_millis(timing::TELEMETRY_READ_TIMEOUT_MS),
            monitor_interval: Duration::from_millis(timing::FLIGHT_MONITOR_INTERVAL_MS),
            initial_mode: ArduPilotMode::Guided,
        }
    }
}

/// Acknowledged request
#[derive(Debug, Clone, Copy)]
enum AckedRequest {
    Arm { force: bool },
    Disarm { force: bool },
    Mode(ArduPilotMode),
}

struct SessionState {
    link: Option<Box<dyn VehicleLink>>,
    armed: bool,
}

/// The bridge's single vehicle session
pub struct VehicleSession {
    connector: Arc<dyn LinkConnector>,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    phase: watch::Sender<SessionPhase>,
    monitors: Mutex<JoinSet<()>>,
}

impl VehicleSession {
    pub fn new(connector: Arc<dyn LinkConnector>, settings: SessionSettings) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Uninitialized);
        Self {
            connector,
            settings,
            state: Mutex::new(SessionState {
                link: None,
                armed: false,
            }),
            phase,
            monitors: Mutex::new(JoinSet::new()),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Watch phase changes
    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    pub fn is_initialized(&self) -> bool {
        self.phase() == SessionPhase::Ready
    }

    pub async fn is_armed(&self) -> bool {
        self.state.lock().await.armed
    }

    /// Open the link and prepare the vehicle
    ///
    /// Returns `Ok(false)` without touching the connector when a link is
    /// already held.
    pub async fn initialize(&self) -> Result<bool, SessionError> {
        let mut state = self.state.lock().await;
        if state.link.is_some() {
            info!("[SESSION] Already initialized");
            return Ok(false);
        }

        info!("[SESSION] Opening link to {}", self.connector.describe());
        let mut link = self.connector.connect().await?;

        let opened = async {
            let heartbeat = link.wait_heartbeat(self.settings.heartbeat_timeout).await?;
            link.request_position_stream(self.settings.position_rate_hz)
                .await?;
            // One attempt only; a refused stream leaves the autopilot's default rates
            let policy = AckPolicy {
                retries: 1,
                ..self.settings.ack
            };
            let stream =
                await_ack(link.as_mut(), VehicleCommand::SetMessageInterval, &policy).await?;
            Ok::<_, LinkError>((heartbeat, stream))
        }
        .await;

        let (heartbeat, stream) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                error!("[SESSION] Initialization failed: {}", e);
                link.close().await;
                return Err(e.into());
            }
        };

        state.link = Some(link);
        state.armed = heartbeat.armed;
        self.phase.send_replace(SessionPhase::Ready);
        info!(
            "[SESSION] Ready (system {}, armed: {})",
            heartbeat.system_id, heartbeat.armed
        );
        match stream {
            AckOutcome::Accepted { .. } => debug!(
                "[SESSION] Position stream at {} Hz acknowledged",
                self.settings.position_rate_hz
            ),
            AckOutcome::Rejected { result, .. } => warn!(
                "[SESSION] Position stream request {}, using the autopilot's default rate",
                result.describe()
            ),
            AckOutcome::NoResponse { .. } => {
                warn!("[SESSION] Position stream request not acknowledged")
            }
        }

        let mode = self.settings.initial_mode;
        match self.acknowledged(&mut state, AckedRequest::Mode(mode)).await {
            Ok(AckOutcome::Accepted { .. }) => info!("[SESSION] Mode set to {}", mode),
            Ok(outcome) => warn!("[SESSION] Initial mode {} not set: {:?}", mode, outcome),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("[SESSION] Initial mode {} not set: {}", mode, e),
        }

        Ok(true)
    }

    pub async fn arm(&self, force: bool) -> Result<AckOutcome, SessionError> {
        let mut state = self.state.lock().await;
        info!("[SESSION] Arming{}", if force { " (forced)" } else { "" });

        let outcome = self
            .acknowledged(&mut state, AckedRequest::Arm { force })
            .await?;
        if outcome.is_accepted() {
            state.armed = true;
        }
        Ok(outcome)
    }

    pub async fn disarm(&self, force: bool) -> Result<AckOutcome, SessionError> {
        let mut state = self.state.lock().await;
        info!("[SESSION] Disarming{}", if force { " (forced)" } else { "" });

        let outcome = self
            .acknowledged(&mut state, AckedRequest::Disarm { force })
            .await?;
        if outcome.is_accepted() {
            state.armed = false;
        }
        Ok(outcome)
    }

    /// Switch flight mode by name
    pub async fn set_mode(&self, name: &str) -> Result<AckOutcome, SessionError> {
        let mode: ArduPilotMode = name.parse()?;
        let mut state = self.state.lock().await;
        info!("[SESSION] Setting mode {}", mode);
        self.acknowledged(&mut state, AckedRequest::Mode(mode)).await
    }

    /// Start a takeoff; `Ok(false)` when the altitude is not positive
    pub async fn takeoff(self: &Arc<Self>, altitude_m: f32) -> Result<bool, SessionError> {
        // Also rejects NaN
        if !(altitude_m > 0.0) {
            info!("[SESSION] Takeoff to {} m ignored", altitude_m);
            return Ok(false);
        }

        {
            let mut state = self.state.lock().await;
            let link = state.link.as_mut().ok_or(SessionError::NotInitialized)?;
            info!("[SESSION] Taking off to {:.1} m", altitude_m);
            let result = link.send_takeoff(altitude_m).await;
            self.settle(&mut state, result)?;
        }

        self.spawn_monitor(FlightGoal::Takeoff {
            target_m: altitude_m,
        })
        .await;
        Ok(true)
    }

    pub async fn land(self: &Arc<Self>) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock().await;
            let link = state.link.as_mut().ok_or(SessionError::NotInitialized)?;
            info!("[SESSION] Landing");
            let result = link.send_land().await;
            self.settle(&mut state, result)?;
        }

        self.spawn_monitor(FlightGoal::Land).await;
        Ok(())
    }

    /// Send a position/velocity target; not acknowledged
    pub async fn move_to(&self, args: MoveArgs) -> Result<(), SessionError> {
        if !args.is_finite() {
            return Err(SessionError::InvalidArgument(format!(
                "non-finite move target {:?}",
                args
            )));
        }
        if !(-90.0..=90.0).contains(&args.lat) || !(-180.0..=180.0).contains(&args.lon) {
            return Err(SessionError::InvalidArgument(format!(
                "move target ({}, {}) outside lat [-90, 90] / lon [-180, 180]",
                args.lat, args.lon
            )));
        }

        let mut state = self.state.lock().await;
        let link = state.link.as_mut().ok_or(SessionError::NotInitialized)?;
        let target = PositionTarget::from(args);
        let result = link.send_position_target(&target).await;
        self.settle(&mut state, result)?;

        info!(
            "[SESSION] Moving to ({:.7}, {:.7}, {:.1} m) at ({}, {}, {}) m/s",
            target.lat, target.lon, target.alt, target.vx, target.vy, target.vz
        );
        Ok(())
    }

    /// One position read; `Ok(None)` when no fix arrives in time
    pub async fn read_position(&self) -> Result<Option<TelemetrySample>, SessionError> {
        let mut state = self.state.lock().await;
        let link = state.link.as_mut().ok_or(SessionError::NotInitialized)?;
        let result = link
            .read_global_position(self.settings.telemetry_read_timeout)
            .await;
        self.settle(&mut state, result)
    }

    /// Stop flight monitors and release the link
    pub async fn close(&self) {
        self.monitors.lock().await.shutdown().await;

        let mut state = self.state.lock().await;
        if let Some(mut link) = state.link.take() {
            link.close().await;
        }
        state.armed = false;
        self.phase.send_replace(SessionPhase::Closed);
        info!("[SESSION] Closed");
    }

    async fn acknowledged(
        &self,
        state: &mut SessionState,
        request: AckedRequest,
    ) -> Result<AckOutcome, SessionError> {
        let link = state.link.as_mut().ok_or(SessionError::NotInitialized)?;

        let result: Result<AckOutcome, LinkError> = async {
            let command = match request {
                AckedRequest::Arm { force } => {
                    link.send_arm(force).await?;
                    VehicleCommand::ArmDisarm
                }
                AckedRequest::Disarm { force } => {
                    link.send_disarm(force).await?;
                    VehicleCommand::ArmDisarm
                }
                AckedRequest::Mode(mode) => {
                    link.send_mode(mode).await?;
                    VehicleCommand::SetMode
                }
            };
            await_ack(link.as_mut(), command, &self.settings.ack).await
        }
        .await;

        let outcome = self.settle(state, result)?;
        match outcome {
            AckOutcome::Accepted { attempts } => {
                debug!("[SESSION] {:?} accepted after {} attempts", request, attempts)
            }
            AckOutcome::Rejected { result, .. } => {
                warn!("[SESSION] {:?} rejected: {}", request, result.describe())
            }
            AckOutcome::NoResponse { attempts } => {
                warn!("[SESSION] {:?} unanswered after {} attempts", request, attempts)
            }
        }
        Ok(outcome)
    }

    /// Drop the link on a fatal error
    fn settle<T>(
        &self,
        state: &mut SessionState,
        result: Result<T, LinkError>,
    ) -> Result<T, SessionError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_fatal() => {
                error!("[SESSION] Link lost: {}", e);
                state.link = None;
                state.armed = false;
                self.phase.send_replace(SessionPhase::Lost);
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the running flight monitor
    async fn spawn_monitor(self: &Arc<Self>, goal: FlightGoal) {
        let mut monitors = self.monitors.lock().await;
        while monitors.try_join_next().is_some() {}
        if !monitors.is_empty() {
            debug!("[SESSION] Replacing running flight monitor");
            monitors.abort_all();
        }
        monitors.spawn(run_flight_monitor(
            Arc::downgrade(self),
            goal,
            self.settings.monitor_interval,
        ));
    }
}
