//! Periodic Activities
//!
//! Background loops started by `init_connection`: the telemetry publisher and
//! the heartbeat emitter. Both run until the session phase changes or the
//! outbox is closed.

mod heartbeat;
mod telemetry;

pub use heartbeat::run_heartbeat_emitter;
pub use telemetry::run_telemetry_publisher;
