//! Flight mode command handler

use super::{from_ack, HandlerContext};
use crate::command::CommandResult;
use crate::vehicle::SessionError;
use mavbridge_shared::SetModeArgs;

/// Handle SET_MODE command
///
/// Unknown mode names fail before anything reaches the vehicle.
pub async fn handle_set_mode(
    ctx: &HandlerContext<'_>,
    args: SetModeArgs,
) -> Result<CommandResult, SessionError> {
    let outcome = ctx.session.set_mode(&args.mode).await?;
    Ok(from_ack(
        outcome,
        &format!("Mode set to {}", args.mode.trim().to_ascii_uppercase()),
    ))
}
