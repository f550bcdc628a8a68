//! Command dispatch infrastructure for the bridge
//!
//! This module handles:
//! - Classifying commands received from the channel
//! - Routing them to the vehicle session, liveness monitor or lifecycle control
//! - Reporting each command's result on the outbound topic

mod dispatcher;
pub mod handlers;

pub use dispatcher::{CommandDispatcher, CommandResult, DispatchError, DispatchOutcome};
