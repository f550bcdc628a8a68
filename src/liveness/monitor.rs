//! Liveness Monitor
//!
//! Runs a background check that declares the operator dead after a period of
//! heartbeat silence, independently of when (or whether) messages arrive.

use mavbridge_shared::{timing, LivenessEvent, LivenessStateMachine, Verdict};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Liveness thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessSettings {
    pub die_time: Duration,
    pub check_interval: Duration,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            die_time: Duration::from_millis(timing::LIVENESS_DIE_TIME_MS),
            check_interval: Duration::from_millis(timing::LIVENESS_CHECK_INTERVAL_MS),
        }
    }
}

/// Tracks operator heartbeats and reports death and recovery
pub struct LivenessMonitor {
    /// The state machine, shared by arrivals and the self-check
    fsm: Arc<Mutex<LivenessStateMachine>>,
    /// Origin of the monotonic millisecond clock fed to the machine
    epoch: Instant,
    check_interval: Duration,
    event_tx: mpsc::UnboundedSender<LivenessEvent>,
    event_rx: Mutex<mpsc::UnboundedReceiver<LivenessEvent>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LivenessMonitor {
    pub fn new(settings: LivenessSettings) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            fsm: Arc::new(Mutex::new(LivenessStateMachine::new(
                settings.die_time.as_millis() as u64,
            ))),
            epoch: Instant::now(),
            check_interval: settings.check_interval,
            event_tx,
            event_rx: Mutex::new(event_rx),
            task: Mutex::new(None),
        }
    }

    fn now_ms(&self) -> u64 {
        elapsed_ms(self.epoch)
    }

    /// Record an operator heartbeat
    pub async fn receive_heartbeat(&self) {
        let now = self.now_ms();
        let event = self.fsm.lock().await.record_heartbeat(now);
        debug!("[LIVENESS] Heartbeat at {} ms", now);

        if let Some(event) = event {
            report(&self.event_tx, event);
        }
    }

    /// Whether a heartbeat arrived within the death threshold
    pub async fn is_alive(&self) -> bool {
        self.fsm.lock().await.is_alive(self.now_ms())
    }

    pub async fn verdict(&self) -> Verdict {
        self.fsm.lock().await.verdict()
    }

    /// Run one self-check now
    pub async fn check_now(&self) -> Option<LivenessEvent> {
        check(&self.fsm, self.epoch, &self.event_tx).await
    }

    /// Receive the next death/recovery event
    pub async fn recv_event(&self) -> Option<LivenessEvent> {
        self.event_rx.lock().await.recv().await
    }

    /// Start the periodic self-check; a second call is a no-op
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            warn!("[LIVENESS] Monitoring already active");
            return;
        }

        let fsm = self.fsm.clone();
        let epoch = self.epoch;
        let event_tx = self.event_tx.clone();
        let period = self.check_interval;

        *task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                check(&fsm, epoch, &event_tx).await;
            }
        }));

        info!(
            "[LIVENESS] Monitoring started (check every {:?})",
            self.check_interval
        );
    }

    /// Stop the periodic self-check
    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            info!("[LIVENESS] Monitoring stopped");
        }
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

fn elapsed_ms(epoch: Instant) -> u64 {
    epoch.elapsed().as_millis() as u64
}

async fn check(
    fsm: &Mutex<LivenessStateMachine>,
    epoch: Instant,
    event_tx: &mpsc::UnboundedSender<LivenessEvent>,
) -> Option<LivenessEvent> {
    let event = fsm.lock().await.evaluate(elapsed_ms(epoch))?;
    report(event_tx, event);
    Some(event)
}

fn report(event_tx: &mpsc::UnboundedSender<LivenessEvent>, event: LivenessEvent) {
    match event {
        LivenessEvent::Died { silent_for_ms } => {
            warn!("[LIVENESS] Operator is dead (silent for {} ms)", silent_for_ms)
        }
        LivenessEvent::Recovered { down_for_ms } => {
            info!("[LIVENESS] Operator is alive again (down for {} ms)", down_for_ms)
        }
    }
    let _ = event_tx.send(event);
}
