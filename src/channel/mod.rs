//! Channel Module
//!
//! Pub/sub transport between the bridge and its operator: MQTT in the field,
//! an in-process channel for tests.

pub mod memory;
pub mod mqtt;
pub mod outbox;
pub mod traits;

pub use memory::{MemoryChannel, MemoryRemote};
pub use mqtt::{MqttChannel, MqttSettings};
pub use outbox::Outbox;
pub use traits::{ChannelConnection, ChannelError, InboundMessage, PubSub};
