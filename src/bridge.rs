//! Bridge runner
//!
//! Wires the channel, the vehicle session and the liveness monitor together,
//! then runs the inbound message loop until `end_connection` or until the
//! channel goes away.

use mavbridge_shared::{LivenessEvent, Topics};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::channel::{ChannelConnection, ChannelError, InboundMessage, Outbox};
use crate::command::{CommandDispatcher, DispatchOutcome};
use crate::liveness::{LivenessMonitor, LivenessSettings};
use crate::vehicle::VehicleSession;

/// Why the bridge stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    /// Graceful `end_connection`
    EndConnection,
    /// The inbound channel closed underneath the bridge
    InboundClosed,
}

impl BridgeExit {
    pub fn exit_code(self) -> i32 {
        match self {
            BridgeExit::EndConnection => 0,
            BridgeExit::InboundClosed => 1,
        }
    }
}

pub struct Bridge {
    dispatcher: CommandDispatcher,
    liveness: Arc<LivenessMonitor>,
    outbox: Arc<Outbox>,
    inbound: mpsc::Receiver<InboundMessage>,
    inbound_topic: String,
}

impl Bridge {
    /// Subscribe to the command topic and start the liveness monitor
    pub async fn start(
        connection: ChannelConnection,
        session: Arc<VehicleSession>,
        topics: Topics,
        device_id: &str,
        liveness: LivenessSettings,
        shutdown_grace: Duration,
    ) -> Result<Self, ChannelError> {
        let ChannelConnection { channel, inbound } = connection;
        channel.subscribe(&topics.inbound).await?;

        let outbox = Arc::new(Outbox::new(channel, topics.outbound.clone(), device_id));
        let liveness = Arc::new(LivenessMonitor::new(liveness));
        liveness.start().await;

        let dispatcher = CommandDispatcher::new(
            session,
            liveness.clone(),
            outbox.clone(),
            shutdown_grace,
        );

        info!(
            "[BRIDGE] Listening on {}, publishing on {}",
            topics.inbound, topics.outbound
        );

        Ok(Self {
            dispatcher,
            liveness,
            outbox,
            inbound,
            inbound_topic: topics.inbound,
        })
    }

    /// Process messages in arrival order until the bridge stops
    pub async fn run(mut self) -> BridgeExit {
        let exit = loop {
            tokio::select! {
                message = self.inbound.recv() => {
                    let Some(message) = message else {
                        error!("[BRIDGE] Inbound channel closed");
                        self.dispatcher.shutdown().await;
                        break BridgeExit::InboundClosed;
                    };

                    if message.topic != self.inbound_topic {
                        debug!("[BRIDGE] Ignoring message on {}", message.topic);
                        continue;
                    }

                    match self.dispatcher.dispatch_payload(&message.payload).await {
                        Ok(DispatchOutcome::Continue) => {}
                        Ok(DispatchOutcome::Shutdown) => break BridgeExit::EndConnection,
                        // Already logged and reported by the dispatcher
                        Err(e) => debug!("[BRIDGE] Dispatch error: {}", e),
                    }
                }
                Some(event) = self.liveness.recv_event() => {
                    let alive = matches!(event, LivenessEvent::Recovered { .. });
                    if let Err(e) = self.outbox.liveness(alive).await {
                        warn!("[BRIDGE] Failed to publish liveness: {}", e);
                    }
                }
            }
        };

        self.liveness.stop().await;
        info!("[BRIDGE] Stopped ({:?})", exit);
        exit
    }
}
