//! Vehicle Module
//!
//! The session that owns the flight-controller link, the link abstraction it
//! drives, and the acknowledgment protocol for commands that need one.

mod ack;
mod error;
mod link;
mod monitor;
pub mod scripted;
mod session;

pub use ack::{await_ack, AckOutcome, AckPolicy};
pub use error::{LinkError, SessionError};
pub use link::{
    AckResult, CommandAck, LinkConnector, PositionTarget, VehicleCommand, VehicleHeartbeat,
    VehicleLink,
};
pub use monitor::FlightGoal;
pub(crate) use monitor::tick_while_ready;
pub use scripted::{LinkScript, ScriptedConnector, ScriptedLink, SentCommand};
pub use session::{SessionPhase, SessionSettings, VehicleSession};
