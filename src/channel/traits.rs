//! Pub/sub channel abstraction for pluggable message brokers

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    #[error("Failed to connect to broker: {0}")]
    Connect(String),

    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Channel closed")]
    Closed,
}

/// A message received on a subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Publish/subscribe primitives of a message broker
#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ChannelError>;

    /// Deliver messages on `topic` to the connection's inbound queue
    async fn subscribe(&self, topic: &str) -> Result<(), ChannelError>;

    /// Close the channel, giving in-flight publishes up to `grace` to flush
    async fn close(&self, grace: Duration) -> Result<(), ChannelError>;

    /// Human-readable name for this channel
    fn name(&self) -> &'static str;
}

/// An open channel and the queue of messages it receives
pub struct ChannelConnection {
    pub channel: Arc<dyn PubSub>,
    pub inbound: mpsc::Receiver<InboundMessage>,
}
