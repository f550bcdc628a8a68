//! MQTT channel backed by rumqttc
//!
//! A pump task drives the client event loop: it forwards incoming publishes to
//! the inbound queue and re-subscribes after every reconnect.

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::traits::{ChannelConnection, ChannelError, InboundMessage, PubSub};

const REQUEST_QUEUE: usize = 64;
const INBOUND_QUEUE: usize = 256;

/// Broker connection parameters
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
}

/// MQTT implementation of [`PubSub`]
pub struct MqttChannel {
    client: AsyncClient,
    subscriptions: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl MqttChannel {
    /// Connect and wait for the broker's ConnAck
    pub async fn connect(settings: &MqttSettings) -> Result<ChannelConnection, ChannelError> {
        let mut options =
            MqttOptions::new(settings.client_id.as_str(), settings.host.as_str(), settings.port);
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);

        info!(
            "[MQTT] Connecting to {}:{} as {}",
            settings.host, settings.port, settings.client_id
        );
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_QUEUE);

        let connected = tokio::time::timeout(settings.connect_timeout, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack),
                    Ok(_) => continue,
                    Err(e) => return Err(e),
                }
            }
        })
        .await;

        match connected {
            Ok(Ok(ack)) => info!("[MQTT] Connected ({:?})", ack.code),
            Ok(Err(e)) => return Err(ChannelError::Connect(e.to_string())),
            Err(_) => {
                return Err(ChannelError::Connect(format!(
                    "no ConnAck within {:?}",
                    settings.connect_timeout
                )))
            }
        }

        let (inbound_tx, inbound) = mpsc::channel(INBOUND_QUEUE);
        let subscriptions = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let pump = tokio::spawn(pump_events(
            eventloop,
            client.clone(),
            subscriptions.clone(),
            closed.clone(),
            inbound_tx,
            settings.reconnect_delay,
        ));

        let channel = Self {
            client,
            subscriptions,
            closed,
            pump: Mutex::new(Some(pump)),
        };

        Ok(ChannelConnection {
            channel: Arc::new(channel),
            inbound,
        })
    }

    fn subscribed_topics(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .map(|topics| topics.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PubSub for MqttChannel {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }

        self.client
            .publish_bytes(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| ChannelError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, topic: &str) -> Result<(), ChannelError> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| ChannelError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        if let Ok(mut topics) = self.subscriptions.lock() {
            if !topics.iter().any(|t| t == topic) {
                topics.push(topic.to_string());
            }
        }
        info!("[MQTT] Subscribed to {}", topic);
        Ok(())
    }

    async fn close(&self, grace: Duration) -> Result<(), ChannelError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Queued behind any publishes still in the request channel
        if let Err(e) = self.client.disconnect().await {
            warn!("[MQTT] Disconnect request failed: {}", e);
        }

        if let Some(mut pump) = self.pump.lock().await.take() {
            if tokio::time::timeout(grace, &mut pump).await.is_err() {
                debug!("[MQTT] Event loop still busy after {:?}, aborting", grace);
                pump.abort();
            }
        }

        info!(
            "[MQTT] Closed ({} subscriptions)",
            self.subscribed_topics().len()
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "MQTT"
    }
}

async fn pump_events(
    mut eventloop: EventLoop,
    client: AsyncClient,
    subscriptions: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    inbound: mpsc::Sender<InboundMessage>,
    reconnect_delay: Duration,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(
                    "[MQTT] {} bytes on {}",
                    publish.payload.len(),
                    publish.topic
                );
                let message = InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload,
                };
                if inbound.send(message).await.is_err() {
                    debug!("[MQTT] Inbound queue dropped, stopping event loop");
                    break;
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("[MQTT] Reconnected");
                let topics = subscriptions
                    .lock()
                    .map(|topics| topics.clone())
                    .unwrap_or_default();
                for topic in topics {
                    if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                        warn!("[MQTT] Re-subscribe to {} failed: {}", topic, e);
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                if closed.load(Ordering::SeqCst) {
                    break;
                }
                error!("[MQTT] Connection error: {}", e);
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }

    info!("[MQTT] Event loop stopped");
}
