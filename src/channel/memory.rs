//! In-process channel
//!
//! Connects the bridge to a [`MemoryRemote`] in the same process instead of a
//! broker. The remote plays the operator: it sends commands on subscribed
//! topics and records everything the bridge publishes.

use async_trait::async_trait;
use bytes::Bytes;
use mavbridge_shared::{codec, CommandMessage, OutboundMessage};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

use super::traits::{ChannelConnection, ChannelError, InboundMessage, PubSub};

const INBOUND_QUEUE: usize = 256;

#[derive(Debug, Default)]
struct MemoryState {
    subscriptions: Vec<String>,
    published: Vec<InboundMessage>,
    inbound: Option<mpsc::Sender<InboundMessage>>,
    closed: bool,
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process implementation of [`PubSub`]
pub struct MemoryChannel {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryChannel {
    pub fn connect() -> (ChannelConnection, MemoryRemote) {
        let (inbound_tx, inbound) = mpsc::channel(INBOUND_QUEUE);
        let state = Arc::new(Mutex::new(MemoryState {
            inbound: Some(inbound_tx),
            ..Default::default()
        }));

        let connection = ChannelConnection {
            channel: Arc::new(MemoryChannel {
                state: state.clone(),
            }),
            inbound,
        };
        (connection, MemoryRemote { state })
    }
}

#[async_trait]
impl PubSub for MemoryChannel {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ChannelError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(ChannelError::Closed);
        }
        state.published.push(InboundMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), ChannelError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(ChannelError::Closed);
        }
        if !state.subscriptions.iter().any(|t| t == topic) {
            state.subscriptions.push(topic.to_string());
        }
        Ok(())
    }

    async fn close(&self, _grace: Duration) -> Result<(), ChannelError> {
        let mut state = lock(&self.state);
        state.closed = true;
        state.inbound = None;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// The far end of a [`MemoryChannel`]
#[derive(Clone)]
pub struct MemoryRemote {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRemote {
    /// Deliver a raw payload; false when nobody subscribed to `topic`
    pub fn send(&self, topic: &str, payload: impl Into<Bytes>) -> bool {
        let state = lock(&self.state);
        if !state.subscriptions.iter().any(|t| t == topic) {
            return false;
        }
        match &state.inbound {
            Some(inbound) => inbound
                .try_send(InboundMessage {
                    topic: topic.to_string(),
                    payload: payload.into(),
                })
                .is_ok(),
            None => false,
        }
    }

    /// Deliver a typed command
    pub fn send_command(&self, topic: &str, command: &CommandMessage) -> bool {
        match codec::encode_command(command) {
            Ok(payload) => self.send(topic, payload),
            Err(_) => false,
        }
    }

    /// Stop delivering; the bridge sees its inbound queue close
    pub fn hang_up(&self) {
        lock(&self.state).inbound = None;
    }

    /// Everything published so far, decoded; undecodable payloads are skipped
    pub fn published(&self) -> Vec<OutboundMessage> {
        lock(&self.state)
            .published
            .iter()
            .filter_map(|message| serde_json::from_slice(&message.payload).ok())
            .collect()
    }

    pub fn published_raw(&self) -> Vec<InboundMessage> {
        lock(&self.state).published.clone()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}
