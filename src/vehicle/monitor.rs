//! Takeoff and landing monitors
//!
//! After a takeoff or land command the session polls position telemetry until
//! the vehicle reaches the goal, the session leaves `Ready`, or the monitor is
//! replaced by a newer one.

use mavbridge_shared::timing;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::error::SessionError;
use super::session::{SessionPhase, VehicleSession};

/// What a flight monitor waits for
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlightGoal {
    Takeoff { target_m: f32 },
    Land,
}

impl FlightGoal {
    pub fn is_complete(&self, altitude_m: f32) -> bool {
        match *self {
            FlightGoal::Takeoff { target_m } => {
                altitude_m >= target_m * timing::TAKEOFF_COMPLETE_RATIO
            }
            FlightGoal::Land => altitude_m <= timing::LANDED_ALTITUDE_M,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FlightGoal::Takeoff { .. } => "takeoff",
            FlightGoal::Land => "landing",
        }
    }
}

/// Wait for the next tick of a task started for the current `Ready` period
///
/// False as soon as the phase changes at all: a `Ready` seen after a change
/// belongs to a newly opened link, not to the one the task was started for.
pub(crate) async fn tick_while_ready(
    ticker: &mut Interval,
    phase: &mut watch::Receiver<SessionPhase>,
) -> bool {
    tokio::select! {
        biased;
        _ = phase.changed() => false,
        _ = ticker.tick() => *phase.borrow() == SessionPhase::Ready,
    }
}

/// Poll altitude every `period` until `goal` is reached
///
/// Holds only a weak reference so a dropped session ends the monitor.
pub(super) async fn run_flight_monitor(
    session: Weak<VehicleSession>,
    goal: FlightGoal,
    period: Duration,
) {
    let mut phase = match session.upgrade() {
        Some(session) => session.subscribe(),
        None => return,
    };
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("[MONITOR] Watching {} ({:?})", goal.label(), goal);

    while tick_while_ready(&mut ticker, &mut phase).await {
        let Some(session) = session.upgrade() else {
            break;
        };

        match session.read_position().await {
            Ok(Some(sample)) => {
                debug!("[MONITOR] Altitude: {:.2} m", sample.alt);
                if goal.is_complete(sample.alt) {
                    match goal {
                        FlightGoal::Takeoff { target_m } => {
                            info!("[MONITOR] Reached target altitude ({:.1} m)", target_m)
                        }
                        FlightGoal::Land => info!("[MONITOR] Landed"),
                    }
                    break;
                }
            }
            Ok(None) => {
                debug!("[MONITOR] No position fix, retrying");
            }
            Err(SessionError::NotInitialized) => break,
            Err(e) if e.is_fatal() => {
                warn!("[MONITOR] Stopping {} monitor: {}", goal.label(), e);
                break;
            }
            Err(e) => {
                debug!("[MONITOR] Position read failed, retrying: {}", e);
            }
        }
    }

    debug!("[MONITOR] {} monitor stopped", goal.label());
}
