//! Telemetry publisher

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::channel::{ChannelError, Outbox};
use crate::vehicle::{tick_while_ready, SessionError, VehicleSession};

/// Publish one `state` message per tick that has a position fix
pub async fn run_telemetry_publisher(
    session: Arc<VehicleSession>,
    outbox: Arc<Outbox>,
    period: Duration,
) {
    let mut phase = session.subscribe();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("[TELEMETRY] Publishing every {:?}", period);

    while tick_while_ready(&mut ticker, &mut phase).await {
        match session.read_position().await {
            Ok(Some(sample)) => match outbox.state(sample).await {
                Ok(()) => {}
                Err(ChannelError::Closed) => break,
                Err(e) => warn!("[TELEMETRY] Publish failed: {}", e),
            },
            Ok(None) => debug!("[TELEMETRY] No position fix, skipping"),
            Err(SessionError::NotInitialized) => break,
            Err(e) if e.is_fatal() => {
                warn!("[TELEMETRY] Stopping: {}", e);
                break;
            }
            Err(e) => warn!("[TELEMETRY] Position read failed: {}", e),
        }
    }

    info!("[TELEMETRY] Stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::periodic::run_heartbeat_emitter;
    use crate::vehicle::{ScriptedConnector, SessionPhase, SessionSettings};
    use mavbridge_shared::{OutboundMessage, TelemetrySample};

    #[tokio::test(start_paused = true)]
    async fn test_publishes_only_fix_ticks() {
        let (connector, script) = ScriptedConnector::new();
        let session = Arc::new(VehicleSession::new(
            Arc::new(connector),
            SessionSettings::default(),
        ));
        session.initialize().await.unwrap();

        let (connection, remote) = MemoryChannel::connect();
        let outbox = Arc::new(Outbox::new(connection.channel, "drone/1/state", "1"));

        let fix = TelemetrySample::new(47.0, 8.0, 10.0);
        script.push_position(fix);
        script.push_position(None);
        script.push_position(fix);
        script.push_position(None);

        let task = tokio::spawn(run_telemetry_publisher(
            session.clone(),
            outbox,
            Duration::from_secs(1),
        ));
        // Ticks at 0, 1, 2, 3 s
        tokio::time::sleep(Duration::from_millis(3600)).await;
        task.abort();

        let states: Vec<_> = remote
            .published()
            .into_iter()
            .filter(|m| matches!(m, OutboundMessage::State(_)))
            .collect();
        assert_eq!(states.len(), 2);
        assert_eq!(script.position_reads(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_session_closes() {
        let (connector, _script) = ScriptedConnector::new();
        let session = Arc::new(VehicleSession::new(
            Arc::new(connector),
            SessionSettings::default(),
        ));
        session.initialize().await.unwrap();

        let (connection, _remote) = MemoryChannel::connect();
        let outbox = Arc::new(Outbox::new(connection.channel, "drone/1/state", "1"));

        let task = tokio::spawn(run_telemetry_publisher(
            session.clone(),
            outbox,
            Duration::from_millis(200),
        ));
        tokio::time::sleep(Duration::from_millis(500)).await;
        session.close().await;

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("publisher should stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_halts_activities() {
        let (connector, script) = ScriptedConnector::new();
        script.set_position(TelemetrySample::new(47.0, 8.0, 10.0));
        let session = Arc::new(VehicleSession::new(
            Arc::new(connector),
            SessionSettings::default(),
        ));
        session.initialize().await.unwrap();

        let (connection, remote) = MemoryChannel::connect();
        let outbox = Arc::new(Outbox::new(connection.channel, "drone/1/state", "1"));

        let publisher = tokio::spawn(run_telemetry_publisher(
            session.clone(),
            outbox.clone(),
            Duration::from_millis(200),
        ));
        let emitter = tokio::spawn(run_heartbeat_emitter(
            session.clone(),
            outbox,
            Duration::from_millis(200),
        ));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(remote.published().iter().any(|m| m.tag() == "state"));
        assert!(remote.published().iter().any(|m| m.tag() == "heartbeat"));

        // The publisher's next read fails and drops the link
        script.lose_link("serial unplugged");
        tokio::time::timeout(Duration::from_secs(1), publisher)
            .await
            .expect("publisher should stop")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), emitter)
            .await
            .expect("emitter should stop")
            .unwrap();
        assert_eq!(session.phase(), SessionPhase::Lost);

        let published = remote.published_raw().len();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(remote.published_raw().len(), published);
    }
}
