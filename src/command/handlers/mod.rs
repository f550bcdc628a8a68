//! Command handlers for different command types

mod arming;
mod flight;
mod lifecycle;
mod mode;

pub use arming::{handle_arm, handle_disarm};
pub use flight::{handle_land, handle_move, handle_takeoff};
pub use lifecycle::{handle_end_connection, handle_init_connection};
pub use mode::handle_set_mode;

use std::sync::Arc;

use crate::channel::Outbox;
use crate::command::CommandResult;
use crate::vehicle::{AckOutcome, VehicleSession};

/// Context passed to command handlers
#[derive(Clone, Copy)]
pub struct HandlerContext<'a> {
    pub session: &'a Arc<VehicleSession>,
    pub outbox: &'a Arc<Outbox>,
}

/// Result of an acknowledged command; `done` describes success
fn from_ack(outcome: AckOutcome, done: &str) -> CommandResult {
    match outcome {
        AckOutcome::Accepted { .. } => CommandResult::Completed {
            message: done.to_string(),
        },
        AckOutcome::Rejected { result, .. } => CommandResult::Rejected {
            message: format!("Vehicle {}", result.describe()),
        },
        AckOutcome::NoResponse { attempts } => CommandResult::Failed {
            message: format!("No acknowledgment after {} attempts", attempts),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::AckResult;
    use mavbridge_shared::CommandStatus;

    #[test]
    fn test_ack_outcomes_map_to_statuses() {
        let done = from_ack(AckOutcome::Accepted { attempts: 2 }, "Armed");
        assert_eq!(done.status(), CommandStatus::Completed);
        assert_eq!(done.message(), "Armed");

        let denied = from_ack(
            AckOutcome::Rejected {
                result: AckResult::Denied,
                attempts: 1,
            },
            "Armed",
        );
        assert_eq!(denied.status(), CommandStatus::Rejected);
        assert_eq!(denied.message(), "Vehicle denied");

        let silent = from_ack(AckOutcome::NoResponse { attempts: 10 }, "Armed");
        assert_eq!(silent.status(), CommandStatus::Failed);
    }
}
