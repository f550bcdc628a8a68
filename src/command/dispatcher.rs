//! Command dispatcher - classifies and routes incoming commands

use super::handlers::{self, HandlerContext};
use crate::channel::{ChannelError, Outbox};
use crate::liveness::LivenessMonitor;
use crate::vehicle::{SessionError, VehicleSession};
use mavbridge_shared::{codec, CodecError, CommandMessage, CommandStatus, MessageKind};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Result of command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Command accepted and completed successfully
    Completed { message: String },
    /// Command accepted and being monitored in the background
    Started { message: String },
    /// Command valid but nothing to do
    Skipped { message: String },
    /// Command rejected by the vehicle
    Rejected { message: String },
    /// Command accepted but execution failed
    Failed { message: String },
}

impl CommandResult {
    pub fn status(&self) -> CommandStatus {
        match self {
            CommandResult::Completed { .. } => CommandStatus::Completed,
            CommandResult::Started { .. } => CommandStatus::Started,
            CommandResult::Skipped { .. } => CommandStatus::Skipped,
            CommandResult::Rejected { .. } => CommandStatus::Rejected,
            CommandResult::Failed { .. } => CommandStatus::Failed,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CommandResult::Completed { message }
            | CommandResult::Started { message }
            | CommandResult::Skipped { message }
            | CommandResult::Rejected { message }
            | CommandResult::Failed { message } => message,
        }
    }
}

/// What the caller should do after a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Continue,
    /// `end_connection` was handled; dispatch nothing further
    Shutdown,
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Classification(#[from] CodecError),

    #[error("{kind} failed: {source}")]
    Session {
        kind: MessageKind,
        #[source]
        source: SessionError,
    },
}

impl DispatchError {
    /// Command tag the error is reported under
    pub fn tag(&self) -> String {
        match self {
            DispatchError::Classification(e) => e.tag().unwrap_or_else(|| "unknown".into()),
            DispatchError::Session { kind, .. } => kind.to_string(),
        }
    }
}

/// Routes classified commands to the session, the liveness monitor or
/// lifecycle control
pub struct CommandDispatcher {
    session: Arc<VehicleSession>,
    liveness: Arc<LivenessMonitor>,
    outbox: Arc<Outbox>,
    /// Heartbeat emitter and telemetry publisher
    activities: JoinSet<()>,
    shutdown_grace: Duration,
}

impl CommandDispatcher {
    pub fn new(
        session: Arc<VehicleSession>,
        liveness: Arc<LivenessMonitor>,
        outbox: Arc<Outbox>,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            session,
            liveness,
            outbox,
            activities: JoinSet::new(),
            shutdown_grace,
        }
    }

    /// Classify a raw payload, then dispatch it
    pub async fn dispatch_payload(&mut self, payload: &[u8]) -> Result<DispatchOutcome, DispatchError> {
        match codec::decode(payload) {
            Ok(message) => self.dispatch(message).await,
            Err(e) => {
                let e = DispatchError::from(e);
                warn!("[DISPATCH] Classification failed: {}", e);
                self.report(&e.tag(), CommandStatus::Rejected, e.to_string())
                    .await;
                Err(e)
            }
        }
    }

    pub async fn dispatch(&mut self, message: CommandMessage) -> Result<DispatchOutcome, DispatchError> {
        let kind = message.kind();
        debug!("[DISPATCH] {:?}", message);

        let ctx = HandlerContext {
            session: &self.session,
            outbox: &self.outbox,
        };

        let result = match message {
            CommandMessage::InitConnection(args) => {
                handlers::handle_init_connection(&ctx, args, &mut self.activities).await
            }
            CommandMessage::Arm(args) => handlers::handle_arm(&ctx, args).await,
            CommandMessage::Disarm(args) => handlers::handle_disarm(&ctx, args).await,
            CommandMessage::Takeoff(args) => handlers::handle_takeoff(&ctx, args).await,
            CommandMessage::Land => handlers::handle_land(&ctx).await,
            CommandMessage::Move(args) => handlers::handle_move(&ctx, args).await,
            CommandMessage::SetMode(args) => handlers::handle_set_mode(&ctx, args).await,
            CommandMessage::Heartbeat => {
                self.liveness.receive_heartbeat().await;
                return Ok(DispatchOutcome::Continue);
            }
            CommandMessage::EndConnection => {
                handlers::handle_end_connection(&ctx, &mut self.activities, self.shutdown_grace)
                    .await;
                return Ok(DispatchOutcome::Shutdown);
            }
        };

        match result {
            Ok(result) => {
                match result.status() {
                    CommandStatus::Rejected | CommandStatus::Failed => {
                        warn!("[DISPATCH] {} {:?}: {}", kind, result.status(), result.message())
                    }
                    _ => info!("[DISPATCH] {} {:?}: {}", kind, result.status(), result.message()),
                }
                self.report(kind.as_str(), result.status(), result.message().to_string())
                    .await;
                Ok(DispatchOutcome::Continue)
            }
            Err(source) => {
                let status = match source {
                    SessionError::UnknownFlightMode(_) | SessionError::InvalidArgument(_) => {
                        CommandStatus::Rejected
                    }
                    SessionError::NotInitialized | SessionError::Link(_) => CommandStatus::Failed,
                };
                error!("[DISPATCH] {} failed: {}", kind, source);
                self.report(kind.as_str(), status, source.to_string()).await;
                Err(DispatchError::Session { kind, source })
            }
        }
    }

    /// Tear down as `end_connection` would, without a command
    pub async fn shutdown(&mut self) {
        let ctx = HandlerContext {
            session: &self.session,
            outbox: &self.outbox,
        };
        handlers::handle_end_connection(&ctx, &mut self.activities, self.shutdown_grace).await;
    }

    /// Number of periodic activities still running
    pub fn active_activities(&mut self) -> usize {
        while self.activities.try_join_next().is_some() {}
        self.activities.len()
    }

    async fn report(&self, command: &str, status: CommandStatus, message: String) {
        match self.outbox.command_result(command, status, message).await {
            Ok(()) => {}
            Err(ChannelError::Closed) => debug!("[DISPATCH] Outbox closed, {} result dropped", command),
            Err(e) => warn!("[DISPATCH] Failed to report {} result: {}", command, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{MemoryChannel, MemoryRemote};
    use crate::liveness::LivenessSettings;
    use crate::vehicle::{LinkScript, ScriptedConnector, SessionSettings};
    use mavbridge_shared::{InitConnectionArgs, OutboundMessage, SetModeArgs};

    fn dispatcher() -> (CommandDispatcher, LinkScript, MemoryRemote) {
        let (connector, script) = ScriptedConnector::new();
        let session = Arc::new(VehicleSession::new(
            Arc::new(connector),
            SessionSettings::default(),
        ));
        let (connection, remote) = MemoryChannel::connect();
        let outbox = Arc::new(Outbox::new(connection.channel, "drone/1/state", "1"));
        let liveness = Arc::new(LivenessMonitor::new(LivenessSettings::default()));
        (
            CommandDispatcher::new(session, liveness, outbox, Duration::from_millis(500)),
            script,
            remote,
        )
    }

    fn results(remote: &MemoryRemote) -> Vec<(String, CommandStatus)> {
        remote
            .published()
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::CommandResult {
                    command, status, ..
                } => Some((command, status)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_tag_touches_nothing() {
        let (mut dispatcher, script, remote) = dispatcher();

        let err = dispatcher
            .dispatch_payload(br#"{"msg_type":"self_destruct","args":{}}"#)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Classification(CodecError::UnrecognizedMessageType(_))
        ));
        assert_eq!(script.connects(), 0);
        assert!(script.sent().is_empty());
        assert_eq!(
            results(&remote),
            vec![("self_destruct".to_string(), CommandStatus::Rejected)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_before_init_fails_at_session() {
        let (mut dispatcher, script, remote) = dispatcher();

        let err = dispatcher
            .dispatch_payload(br#"{"msg_type":"arm","args":{"force":false}}"#)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Session {
                kind: MessageKind::Arm,
                source: SessionError::NotInitialized
            }
        ));
        assert!(script.sent().is_empty());
        assert_eq!(
            results(&remote),
            vec![("arm".to_string(), CommandStatus::Failed)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_twice_spawns_activities_once() {
        let (mut dispatcher, script, remote) = dispatcher();
        let init = CommandMessage::InitConnection(InitConnectionArgs {
            heartbeat_interval: 500,
            state_interval: 200,
        });

        dispatcher.dispatch(init.clone()).await.unwrap();
        dispatcher.dispatch(init).await.unwrap();

        assert_eq!(script.connects(), 1);
        assert_eq!(dispatcher.active_activities(), 2);
        assert_eq!(
            results(&remote),
            vec![
                ("init_connection".to_string(), CommandStatus::Completed),
                ("init_connection".to_string(), CommandStatus::Skipped)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_mode_is_rejected() {
        let (mut dispatcher, _script, remote) = dispatcher();
        dispatcher
            .dispatch(CommandMessage::InitConnection(InitConnectionArgs {
                heartbeat_interval: 1000,
                state_interval: 1000,
            }))
            .await
            .unwrap();

        let err = dispatcher
            .dispatch(CommandMessage::SetMode(SetModeArgs {
                mode: "HOVER".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.tag(), "set_mode");
        assert!(results(&remote).contains(&("set_mode".to_string(), CommandStatus::Rejected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_feeds_liveness_only() {
        let (mut dispatcher, script, remote) = dispatcher();
        let liveness = dispatcher.liveness.clone();
        assert!(!liveness.is_alive().await);

        let outcome = dispatcher.dispatch(CommandMessage::Heartbeat).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Continue);
        assert!(liveness.is_alive().await);
        assert_eq!(script.connects(), 0);
        assert!(remote.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_connection_shuts_everything_down() {
        let (mut dispatcher, script, remote) = dispatcher();
        dispatcher
            .dispatch(CommandMessage::InitConnection(InitConnectionArgs {
                heartbeat_interval: 500,
                state_interval: 200,
            }))
            .await
            .unwrap();

        let outcome = dispatcher
            .dispatch(CommandMessage::EndConnection)
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Shutdown);
        assert_eq!(dispatcher.active_activities(), 0);
        assert!(script.is_closed());
        assert!(remote.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinit_after_link_loss_replaces_activities() {
        let (mut dispatcher, script, remote) = dispatcher();
        let init = CommandMessage::InitConnection(InitConnectionArgs {
            heartbeat_interval: 1000,
            state_interval: 1000,
        });
        dispatcher.dispatch(init.clone()).await.unwrap();

        script.lose_link("serial unplugged");
        let err = dispatcher.dispatch(CommandMessage::Land).await.unwrap_err();
        assert!(matches!(err, DispatchError::Session { ref source, .. } if source.is_fatal()));

        // Re-init before the old activities have run since the loss
        dispatcher.dispatch(init).await.unwrap();
        assert_eq!(script.connects(), 2);
        assert_eq!(dispatcher.active_activities(), 2);

        let heartbeats = |remote: &MemoryRemote| {
            remote
                .published()
                .iter()
                .filter(|m| matches!(m, OutboundMessage::Heartbeat { .. }))
                .count()
        };
        let before = heartbeats(&remote);
        tokio::time::sleep(Duration::from_millis(3500)).await;

        // A single emitter: ticks at 0, 1, 2, 3 s
        assert_eq!(heartbeats(&remote) - before, 4);
        assert_eq!(dispatcher.active_activities(), 2);
    }
}
