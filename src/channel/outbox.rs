//! Outbound publishing
//!
//! Everything the bridge reports goes through one [`Outbox`] bound to the
//! vehicle's outbound topic. Once closed it refuses to publish.

use mavbridge_shared::{codec, CommandStatus, OutboundMessage, TelemetrySample};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::traits::{ChannelError, PubSub};

pub struct Outbox {
    channel: Arc<dyn PubSub>,
    topic: String,
    device_id: String,
    /// Heartbeat sequence number
    seq: AtomicU64,
    started: Instant,
    closed: AtomicBool,
}

impl Outbox {
    pub fn new(channel: Arc<dyn PubSub>, topic: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            channel,
            topic: topic.into(),
            device_id: device_id.into(),
            seq: AtomicU64::new(0),
            started: Instant::now(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn publish(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        let payload = codec::encode(message).map_err(|e| ChannelError::Publish {
            topic: self.topic.clone(),
            reason: e.to_string(),
        })?;
        debug!("[OUTBOX] {} -> {}", message.tag(), self.topic);
        self.channel.publish(&self.topic, payload).await
    }

    /// Publish the next heartbeat; sequence numbers start at 1
    pub async fn heartbeat(&self) -> Result<(), ChannelError> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.publish(&OutboundMessage::Heartbeat {
            device_id: self.device_id.clone(),
            seq,
            uptime_ms: self.started.elapsed().as_millis() as u64,
        })
        .await
    }

    pub async fn state(&self, sample: TelemetrySample) -> Result<(), ChannelError> {
        self.publish(&OutboundMessage::State(sample)).await
    }

    pub async fn command_result(
        &self,
        command: &str,
        status: CommandStatus,
        message: impl Into<String>,
    ) -> Result<(), ChannelError> {
        self.publish(&OutboundMessage::CommandResult {
            command: command.to_string(),
            status,
            message: message.into(),
        })
        .await
    }

    pub async fn liveness(&self, alive: bool) -> Result<(), ChannelError> {
        self.publish(&OutboundMessage::Liveness { alive }).await
    }

    /// Refuse further publishes, then close the channel
    pub async fn close(&self, grace: Duration) -> Result<(), ChannelError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("[OUTBOX] Closing {} channel", self.channel.name());
        self.channel.close(grace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;

    #[tokio::test]
    async fn test_heartbeat_sequence() {
        let (connection, remote) = MemoryChannel::connect();
        let outbox = Outbox::new(connection.channel, "drone/7/state", "7");

        outbox.heartbeat().await.unwrap();
        outbox.heartbeat().await.unwrap();

        let seqs: Vec<u64> = remote
            .published()
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::Heartbeat { device_id, seq, .. } => {
                    assert_eq!(device_id, "7");
                    Some(seq)
                }
                _ => None,
            })
            .collect();
        assert_eq!(seqs, vec![1, 2]);
        assert!(remote
            .published_raw()
            .iter()
            .all(|m| m.topic == "drone/7/state"));
    }

    #[tokio::test]
    async fn test_closed_outbox_publishes_nothing() {
        let (connection, remote) = MemoryChannel::connect();
        let outbox = Outbox::new(connection.channel, "drone/1/state", "1");

        outbox.liveness(true).await.unwrap();
        outbox.close(Duration::ZERO).await.unwrap();

        assert_eq!(outbox.liveness(false).await, Err(ChannelError::Closed));
        assert_eq!(
            remote.published(),
            vec![OutboundMessage::Liveness { alive: true }]
        );
        assert!(remote.is_closed());
    }
}
