//! Vehicle link and session errors

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a [`VehicleLink`](super::VehicleLink)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("Failed to open link {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("No vehicle heartbeat within {0:?}")]
    HeartbeatTimeout(Duration),

    #[error("Link I/O error: {0}")]
    Io(String),

    #[error("Link lost: {0}")]
    LinkLost(String),
}

impl LinkError {
    /// Transport-level loss; the link cannot be used again
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::Io(_) | LinkError::LinkLost(_))
    }
}

/// Errors raised by the [`VehicleSession`](super::VehicleSession)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Session not initialized (send init_connection first)")]
    NotInitialized,

    #[error("Unknown flight mode: {0}")]
    UnknownFlightMode(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Link(#[from] LinkError),
}

impl SessionError {
    /// Whether the session dropped its link because of this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Link(e) if e.is_fatal())
    }
}
