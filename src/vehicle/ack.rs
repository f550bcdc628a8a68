//! Bounded acknowledgment wait
//!
//! After a command is sent, acknowledgments are read one attempt at a time.
//! Only silence is retried: acks for other commands and `InProgress` count as
//! "nothing yet", a final result for the command ends the wait.

use mavbridge_shared::timing;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::LinkError;
use super::link::{AckResult, VehicleCommand, VehicleLink};

/// Retry budget for one acknowledged command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPolicy {
    pub retries: u32,
    pub timeout: Duration,
}

impl Default for AckPolicy {
    fn default() -> Self {
        Self {
            retries: timing::ACK_RETRIES,
            timeout: Duration::from_millis(timing::ACK_TIMEOUT_MS),
        }
    }
}

/// How an acknowledged command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Accepted { attempts: u32 },
    Rejected { result: AckResult, attempts: u32 },
    NoResponse { attempts: u32 },
}

impl AckOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AckOutcome::Accepted { .. })
    }
}

/// Wait for the acknowledgment of `command`
///
/// Link errors propagate; exhausting the budget is an `Ok(NoResponse)`.
pub async fn await_ack(
    link: &mut dyn VehicleLink,
    command: VehicleCommand,
    policy: &AckPolicy,
) -> Result<AckOutcome, LinkError> {
    for attempt in 1..=policy.retries {
        match link.read_command_ack(policy.timeout).await? {
            Some(ack) if ack.command == command && ack.result.is_final() => {
                return Ok(match ack.result {
                    AckResult::Accepted => AckOutcome::Accepted { attempts: attempt },
                    result => AckOutcome::Rejected {
                        result,
                        attempts: attempt,
                    },
                });
            }
            Some(ack) => {
                debug!(
                    "[ACK] {:?}: ignoring {:?}/{:?} (attempt {}/{})",
                    command, ack.command, ack.result, attempt, policy.retries
                );
            }
            None => {
                debug!(
                    "[ACK] {:?}: no ack yet (attempt {}/{})",
                    command, attempt, policy.retries
                );
            }
        }
    }

    warn!(
        "[ACK] {:?}: no acknowledgment after {} attempts",
        command, policy.retries
    );
    Ok(AckOutcome::NoResponse {
        attempts: policy.retries,
    })
}
