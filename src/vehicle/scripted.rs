//! Scripted vehicle link
//!
//! A flight controller stand-in for bench runs (`--fc sim`) and tests. It
//! answers from queued responses first and falls back to a crude vehicle:
//! acknowledged commands are accepted, takeoff/land/move teleport the
//! reported position.

use async_trait::async_trait;
use mavbridge_shared::TelemetrySample;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::error::LinkError;
use super::link::{
    AckResult, CommandAck, LinkConnector, PositionTarget, VehicleCommand, VehicleHeartbeat,
    VehicleLink,
};
use crate::mavlink::ArduPilotMode;

/// ArduPilot SITL default home (CMAC)
pub const SITL_HOME: (f64, f64) = (-35.363261, 149.165230);

/// A command the link was asked to send
#[derive(Debug, Clone, PartialEq)]
pub enum SentCommand {
    PositionStream(u16),
    Arm { force: bool },
    Disarm { force: bool },
    Takeoff(f32),
    Land,
    PositionTarget(PositionTarget),
    Mode(ArduPilotMode),
}

#[derive(Debug)]
struct ScriptState {
    acks: VecDeque<Result<Option<CommandAck>, LinkError>>,
    positions: VecDeque<Option<TelemetrySample>>,
    position: Option<TelemetrySample>,
    auto_accept: bool,
    heartbeat: bool,
    unanswered: VecDeque<VehicleCommand>,
    lost: Option<LinkError>,
    sent: Vec<SentCommand>,
    ack_reads: usize,
    position_reads: usize,
    connects: usize,
    closed: bool,
}

impl Default for ScriptState {
    fn default() -> Self {
        Self {
            acks: VecDeque::new(),
            positions: VecDeque::new(),
            position: None,
            auto_accept: true,
            heartbeat: true,
            unanswered: VecDeque::new(),
            lost: None,
            sent: Vec::new(),
            ack_reads: 0,
            position_reads: 0,
            connects: 0,
            closed: false,
        }
    }
}

/// Handle used to script a [`ScriptedLink`] and inspect what it saw
#[derive(Debug, Clone, Default)]
pub struct LinkScript {
    state: Arc<Mutex<ScriptState>>,
}

impl LinkScript {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue the answer to one `read_command_ack`; `None` is a silent attempt
    pub fn push_ack(&self, ack: Option<CommandAck>) {
        self.lock().acks.push_back(Ok(ack));
    }

    /// Queue a failing `read_command_ack`
    pub fn push_ack_failure(&self, error: LinkError) {
        self.lock().acks.push_back(Err(error));
    }

    /// Queue the answer to one `read_global_position`; `None` is no fix
    pub fn push_position(&self, sample: Option<TelemetrySample>) {
        self.lock().positions.push_back(sample);
    }

    /// Position reported once the queue is empty
    pub fn set_position(&self, sample: Option<TelemetrySample>) {
        self.lock().position = sample;
    }

    /// Accept unanswered commands once the ack queue is empty
    pub fn set_auto_accept(&self, enabled: bool) {
        self.lock().auto_accept = enabled;
    }

    /// Whether the vehicle sends a heartbeat when the link opens
    pub fn set_heartbeat(&self, enabled: bool) {
        self.lock().heartbeat = enabled;
    }

    /// Fail every operation from now on until the next connect
    pub fn lose_link(&self, reason: &str) {
        self.lock().lost = Some(LinkError::LinkLost(reason.to_string()));
    }

    pub fn sent(&self) -> Vec<SentCommand> {
        self.lock().sent.clone()
    }

    pub fn ack_reads(&self) -> usize {
        self.lock().ack_reads
    }

    pub fn position_reads(&self) -> usize {
        self.lock().position_reads
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn check(&self) -> Result<MutexGuard<'_, ScriptState>, LinkError> {
        let state = self.lock();
        match &state.lost {
            Some(error) => Err(error.clone()),
            None => Ok(state),
        }
    }

    fn record(&self, command: SentCommand, awaiting: Option<VehicleCommand>) -> Result<(), LinkError> {
        let mut state = self.check()?;

        match &command {
            SentCommand::Takeoff(altitude) => {
                if let Some(pos) = state.position.as_mut() {
                    pos.alt = *altitude;
                }
            }
            SentCommand::Land => {
                if let Some(pos) = state.position.as_mut() {
                    pos.alt = 0.0;
                }
            }
            SentCommand::PositionTarget(target) => {
                state.position = TelemetrySample::new(target.lat, target.lon, target.alt);
            }
            _ => {}
        }

        if let Some(awaiting) = awaiting {
            state.unanswered.push_back(awaiting);
        }
        state.sent.push(command);
        Ok(())
    }
}

/// In-process vehicle driven by a [`LinkScript`]
pub struct ScriptedLink {
    script: LinkScript,
}

impl ScriptedLink {
    pub fn new() -> (Self, LinkScript) {
        let script = LinkScript::default();
        (
            Self {
                script: script.clone(),
            },
            script,
        )
    }

    pub fn with_script(script: LinkScript) -> Self {
        Self { script }
    }
}

#[async_trait]
impl VehicleLink for ScriptedLink {
    async fn wait_heartbeat(&mut self, timeout: Duration) -> Result<VehicleHeartbeat, LinkError> {
        let beating = self.script.check()?.heartbeat;
        if !beating {
            tokio::time::sleep(timeout).await;
            return Err(LinkError::HeartbeatTimeout(timeout));
        }

        Ok(VehicleHeartbeat {
            system_id: 1,
            component_id: 1,
            custom_mode: ArduPilotMode::Stabilize.custom_mode(),
            armed: false,
        })
    }

    async fn request_position_stream(&mut self, rate_hz: u16) -> Result<(), LinkError> {
        self.script.record(
            SentCommand::PositionStream(rate_hz),
            Some(VehicleCommand::SetMessageInterval),
        )
    }

    async fn send_arm(&mut self, force: bool) -> Result<(), LinkError> {
        self.script
            .record(SentCommand::Arm { force }, Some(VehicleCommand::ArmDisarm))
    }

    async fn send_disarm(&mut self, force: bool) -> Result<(), LinkError> {
        self.script
            .record(SentCommand::Disarm { force }, Some(VehicleCommand::ArmDisarm))
    }

    async fn send_takeoff(&mut self, altitude_m: f32) -> Result<(), LinkError> {
        self.script.record(SentCommand::Takeoff(altitude_m), None)
    }

    async fn send_land(&mut self) -> Result<(), LinkError> {
        self.script.record(SentCommand::Land, None)
    }

    async fn send_position_target(&mut self, target: &PositionTarget) -> Result<(), LinkError> {
        self.script
            .record(SentCommand::PositionTarget(*target), None)
    }

    async fn send_mode(&mut self, mode: ArduPilotMode) -> Result<(), LinkError> {
        self.script
            .record(SentCommand::Mode(mode), Some(VehicleCommand::SetMode))
    }

    async fn read_global_position(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<TelemetrySample>, LinkError> {
        let sample = {
            let mut state = self.script.check()?;
            state.position_reads += 1;
            match state.positions.pop_front() {
                Some(queued) => queued,
                None => state.position,
            }
        };

        if sample.is_none() {
            tokio::time::sleep(timeout).await;
        }
        Ok(sample)
    }

    async fn read_command_ack(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<CommandAck>, LinkError> {
        let answer = {
            let mut state = self.script.check()?;
            match state.acks.pop_front() {
                Some(Err(error)) => return Err(error),
                Some(Ok(ack)) => ack,
                None if state.auto_accept => {
                    state.unanswered.pop_front().map(|command| CommandAck {
                        command,
                        result: AckResult::Accepted,
                    })
                }
                None => None,
            }
        };

        if answer.is_none() {
            tokio::time::sleep(timeout).await;
        }
        self.script.lock().ack_reads += 1;
        Ok(answer)
    }

    async fn close(&mut self) {
        self.script.lock().closed = true;
    }
}

/// Opens [`ScriptedLink`]s that share one script
pub struct ScriptedConnector {
    script: LinkScript,
}

impl ScriptedConnector {
    pub fn new() -> (Self, LinkScript) {
        let script = LinkScript::default();
        (
            Self {
                script: script.clone(),
            },
            script,
        )
    }

    /// Bench vehicle parked at the SITL home position
    pub fn bench() -> Self {
        let (connector, script) = Self::new();
        script.set_position(TelemetrySample::new(SITL_HOME.0, SITL_HOME.1, 0.0));
        connector
    }
}

#[async_trait]
impl LinkConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn VehicleLink>, LinkError> {
        {
            let mut state = self.script.lock();
            state.connects += 1;
            state.lost = None;
            state.closed = false;
            state.unanswered.clear();
        }
        Ok(Box::new(ScriptedLink::with_script(self.script.clone())))
    }

    fn describe(&self) -> String {
        "sim".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_auto_accepts_sent_commands() {
        let (mut link, script) = ScriptedLink::new();
        link.send_arm(false).await.unwrap();

        let ack = link
            .read_command_ack(Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            ack,
            Some(CommandAck {
                command: VehicleCommand::ArmDisarm,
                result: AckResult::Accepted
            })
        );
        assert_eq!(script.sent(), vec![SentCommand::Arm { force: false }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_takeoff_moves_reported_altitude() {
        let (mut link, script) = ScriptedLink::new();
        script.set_position(TelemetrySample::new(1.0, 2.0, 0.0));

        link.send_takeoff(15.0).await.unwrap();
        let sample = link
            .read_global_position(Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sample.alt, 15.0);

        link.send_land().await.unwrap();
        let sample = link
            .read_global_position(Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sample.alt, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_link_fails_until_reconnect() {
        let (connector, script) = ScriptedConnector::new();
        let mut link = connector.connect().await.unwrap();

        script.lose_link("cable");
        assert!(link.send_land().await.unwrap_err().is_fatal());

        let mut link = connector.connect().await.unwrap();
        assert!(link.send_land().await.is_ok());
        assert_eq!(script.connects(), 2);
    }
}
