//! End-to-end runs of the bridge over the in-process channel and the scripted
//! vehicle, on tokio's paused clock.

use mavbridge::channel::{MemoryChannel, MemoryRemote};
use mavbridge::liveness::LivenessSettings;
use mavbridge::vehicle::{
    LinkScript, ScriptedConnector, SentCommand, SessionSettings, VehicleSession,
};
use mavbridge::{Bridge, BridgeExit};
use mavbridge_shared::{CommandStatus, OutboundMessage, TelemetrySample, Topics};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const INIT: &str =
    r#"{"msg_type":"init_connection","args":{"heartbeat_interval":500,"state_interval":200}}"#;
const END: &str = r#"{"msg_type":"end_connection","args":{}}"#;

struct Harness {
    remote: MemoryRemote,
    script: LinkScript,
    topics: Topics,
    runner: JoinHandle<BridgeExit>,
}

impl Harness {
    async fn start() -> Self {
        let (connector, script) = ScriptedConnector::new();
        script.set_position(TelemetrySample::new(-35.363261, 149.16523, 0.0));
        let session = Arc::new(VehicleSession::new(
            Arc::new(connector),
            SessionSettings::default(),
        ));

        let (connection, remote) = MemoryChannel::connect();
        let topics = Topics::for_device("drone", "1");
        let bridge = Bridge::start(
            connection,
            session,
            topics.clone(),
            "1",
            LivenessSettings::default(),
            Duration::from_millis(500),
        )
        .await
        .unwrap();

        Self {
            remote,
            script,
            topics,
            runner: tokio::spawn(bridge.run()),
        }
    }

    fn send(&self, payload: &str) {
        assert!(self.remote.send(&self.topics.inbound, payload.to_string()));
    }

    fn count(&self, tag: &str) -> usize {
        self.remote
            .published()
            .iter()
            .filter(|m| m.tag() == tag)
            .count()
    }

    fn results(&self) -> Vec<(String, CommandStatus)> {
        self.remote
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
}

#[tokio::test(start_paused = true)]
async fn test_init_streams_until_end_connection() {
    let harness = Harness::start().await;
    harness.send(INIT);

    tokio::time::sleep(Duration::from_millis(2100)).await;

    // Heartbeats at ~0, 500, ..., 2000 ms; states at ~0, 200, ..., 2000 ms
    let heartbeats = harness.count("heartbeat");
    let states = harness.count("state");
    assert!((4..=6).contains(&heartbeats), "heartbeats: {}", heartbeats);
    assert!((10..=12).contains(&states), "states: {}", states);
    assert_eq!(harness.script.connects(), 1);
    assert_eq!(
        harness.results(),
        vec![("init_connection".to_string(), CommandStatus::Completed)]
    );

    harness.send(END);
    let exit = harness.runner.await.unwrap();
    assert_eq!(exit, BridgeExit::EndConnection);
    assert_eq!(exit.exit_code(), 0);

    let published = harness.remote.published_raw().len();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.remote.published_raw().len(), published);
    assert!(harness.remote.is_closed());
    assert!(harness.script.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_second_init_is_a_noop() {
    let harness = Harness::start().await;
    harness.send(INIT);
    harness.send(INIT);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(harness.script.connects(), 1);
    // One emitter: ticks at ~0, 500, 1000 ms
    let seqs: Vec<u64> = harness
        .remote
        .published()
        .into_iter()
        .filter_map(|m| match m {
            OutboundMessage::Heartbeat { seq, .. } => Some(seq),
            _ => None,
        })
        .collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert_eq!(
        harness.results(),
        vec![
            ("init_connection".to_string(), CommandStatus::Completed),
            ("init_connection".to_string(), CommandStatus::Skipped)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unrecognized_messages_are_reported_not_dropped() {
    let harness = Harness::start().await;
    harness.send(r#"{"msg_type":"fly","args":{}}"#);
    harness.send("not json");
    harness.send(r#"{"msg_type":"takeoff","args":{"altitude":"high"}}"#);

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        harness.results(),
        vec![
            ("fly".to_string(), CommandStatus::Rejected),
            ("unknown".to_string(), CommandStatus::Rejected),
            ("takeoff".to_string(), CommandStatus::Rejected),
        ]
    );
    assert_eq!(harness.script.connects(), 0);
    assert!(harness.script.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_flight_commands_after_init() {
    let harness = Harness::start().await;
    harness.send(INIT);
    harness.send(r#"{"msg_type":"arm","args":{"force":false}}"#);
    harness.send(r#"{"msg_type":"takeoff","args":{"altitude":10}}"#);
    harness.send(r#"{"msg_type":"takeoff","args":{"altitude":0}}"#);
    harness.send(r#"{"msg_type":"set_mode","args":{"mode":"loiter"}}"#);
    harness.send(r#"{"msg_type":"land"}"#);

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        harness.results(),
        vec![
            ("init_connection".to_string(), CommandStatus::Completed),
            ("arm".to_string(), CommandStatus::Completed),
            ("takeoff".to_string(), CommandStatus::Started),
            ("takeoff".to_string(), CommandStatus::Skipped),
            ("set_mode".to_string(), CommandStatus::Completed),
            ("land".to_string(), CommandStatus::Started),
        ]
    );

    let sent = harness.script.sent();
    assert!(sent.contains(&SentCommand::Arm { force: false }));
    assert_eq!(
        sent.iter()
            .filter(|c| matches!(c, SentCommand::Takeoff(_)))
            .count(),
        1
    );
    assert_eq!(sent.last(), Some(&SentCommand::Land));
}

#[tokio::test(start_paused = true)]
async fn test_liveness_changes_are_published() {
    let harness = Harness::start().await;
    harness.send(r#"{"msg_type":"heartbeat","args":{}}"#);

    // Default die time is 10 s, checked every second
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert!(harness
        .remote
        .published()
        .contains(&OutboundMessage::Liveness { alive: false }));

    harness.send(r#"{"msg_type":"heartbeat","args":{}}"#);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let liveness: Vec<_> = harness
        .remote
        .published()
        .into_iter()
        .filter(|m| matches!(m, OutboundMessage::Liveness { .. }))
        .collect();
    assert_eq!(
        liveness,
        vec![
            OutboundMessage::Liveness { alive: false },
            OutboundMessage::Liveness { alive: true }
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_inbound_close_exits_with_failure() {
    let harness = Harness::start().await;
    harness.send(INIT);
    tokio::time::sleep(Duration::from_millis(100)).await;

    harness.remote.hang_up();
    let exit = harness.runner.await.unwrap();

    assert_eq!(exit, BridgeExit::InboundClosed);
    assert_eq!(exit.exit_code(), 1);
    assert!(harness.script.is_closed());
}
