//! Heartbeat emitter

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::channel::{ChannelError, Outbox};
use crate::vehicle::{tick_while_ready, VehicleSession};

/// Publish a heartbeat every `period` while the session is ready
pub async fn run_heartbeat_emitter(
    session: Arc<VehicleSession>,
    outbox: Arc<Outbox>,
    period: Duration,
) {
    let mut phase = session.subscribe();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("[HEARTBEAT] Emitting every {:?}", period);

    while tick_while_ready(&mut ticker, &mut phase).await {
        match outbox.heartbeat().await {
            Ok(()) => {}
            Err(ChannelError::Closed) => break,
            Err(e) => warn!("[HEARTBEAT] Publish failed: {}", e),
        }
    }

    info!("[HEARTBEAT] Stopped");
}
