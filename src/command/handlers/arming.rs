//! Arm and disarm command handlers

use super::{from_ack, HandlerContext};
use crate::command::CommandResult;
use crate::vehicle::SessionError;
use mavbridge_shared::ArmArgs;

/// Handle ARM command
///
/// Blocks until the vehicle acknowledges or the retry budget runs out.
pub async fn handle_arm(ctx: &HandlerContext<'_>, args: ArmArgs) -> Result<CommandResult, SessionError> {
    let outcome = ctx.session.arm(args.force).await?;
    Ok(from_ack(outcome, if args.force { "Armed (forced)" } else { "Armed" }))
}

/// Handle DISARM command
///
/// A forced disarm stops the motors even in flight.
pub async fn handle_disarm(
    ctx: &HandlerContext<'_>,
    args: ArmArgs,
) -> Result<CommandResult, SessionError> {
    let outcome = ctx.session.disarm(args.force).await?;
    Ok(from_ack(
        outcome,
        if args.force { "Disarmed (forced)" } else { "Disarmed" },
    ))
}
