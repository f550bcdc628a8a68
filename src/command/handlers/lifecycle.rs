//! Session lifecycle handlers: init_connection and end_connection

use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::HandlerContext;
use crate::command::CommandResult;
use crate::periodic::{run_heartbeat_emitter, run_telemetry_publisher};
use crate::vehicle::SessionError;
use mavbridge_shared::InitConnectionArgs;

/// Handle INIT_CONNECTION command
///
/// Periodic activities are spawned only when this call opened the session, so
/// a repeated init never duplicates them.
pub async fn handle_init_connection(
    ctx: &HandlerContext<'_>,
    args: InitConnectionArgs,
    activities: &mut JoinSet<()>,
) -> Result<CommandResult, SessionError> {
    if !ctx.session.initialize().await? {
        return Ok(CommandResult::Skipped {
            message: "Already initialized".into(),
        });
    }

    // Anything still here was started for a link that has since been lost
    if !activities.is_empty() {
        debug!("[DISPATCH] Stopping {} activities of the lost link", activities.len());
        activities.shutdown().await;
    }

    activities.spawn(run_heartbeat_emitter(
        ctx.session.clone(),
        ctx.outbox.clone(),
        Duration::from_millis(args.heartbeat_interval),
    ));
    activities.spawn(run_telemetry_publisher(
        ctx.session.clone(),
        ctx.outbox.clone(),
        Duration::from_millis(args.state_interval),
    ));

    info!(
        "[DISPATCH] Session initialized (heartbeat {} ms, state {} ms)",
        args.heartbeat_interval, args.state_interval
    );
    Ok(CommandResult::Completed {
        message: "Connection initialized".into(),
    })
}

/// Handle END_CONNECTION command
///
/// Stops periodic activities, closes the session, then closes the channel
/// giving in-flight publishes up to `grace`.
pub async fn handle_end_connection(
    ctx: &HandlerContext<'_>,
    activities: &mut JoinSet<()>,
    grace: Duration,
) {
    info!("[DISPATCH] Ending connection");

    activities.shutdown().await;
    ctx.session.close().await;

    if let Err(e) = ctx.outbox.close(grace).await {
        warn!("[DISPATCH] Channel close failed: {}", e);
    }
}
