//! Takeoff, land and move command handlers

use super::HandlerContext;
use crate::command::CommandResult;
use crate::vehicle::SessionError;
use mavbridge_shared::{MoveArgs, TakeoffArgs};

/// Handle TAKEOFF command
///
/// Not acknowledged; altitude is watched by a background monitor.
pub async fn handle_takeoff(
    ctx: &HandlerContext<'_>,
    args: TakeoffArgs,
) -> Result<CommandResult, SessionError> {
    if ctx.session.takeoff(args.altitude).await? {
        Ok(CommandResult::Started {
            message: format!("Taking off to {:.1} m", args.altitude),
        })
    } else {
        Ok(CommandResult::Skipped {
            message: format!("Takeoff altitude {} m is not positive", args.altitude),
        })
    }
}

/// Handle LAND command
pub async fn handle_land(ctx: &HandlerContext<'_>) -> Result<CommandResult, SessionError> {
    ctx.session.land().await?;
    Ok(CommandResult::Started {
        message: "Landing".into(),
    })
}

/// Handle MOVE command
///
/// Fire-and-forget position target.
pub async fn handle_move(ctx: &HandlerContext<'_>, args: MoveArgs) -> Result<CommandResult, SessionError> {
    ctx.session.move_to(args).await?;
    Ok(CommandResult::Completed {
        message: format!(
            "Position target sent ({:.7}, {:.7}, {:.1} m)",
            args.lat, args.lon, args.alt
        ),
    })
}
