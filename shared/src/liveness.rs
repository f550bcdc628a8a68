//! Liveness State Machine
//!
//! Decides whether the counterpart sending heartbeats is still alive.
//! Timestamps are caller-supplied milliseconds on a monotonic clock, so the
//! machine itself never reads the time.

/// Current verdict about the counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No heartbeat observed yet
    Waiting,
    Alive,
    Dead,
}

/// Reported when the verdict flips
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessEvent {
    /// Silence exceeded the death threshold
    Died { silent_for_ms: u64 },
    /// A heartbeat arrived after death
    Recovered { down_for_ms: u64 },
}

#[derive(Debug)]
pub struct LivenessStateMachine {
    die_time_ms: u64,
    last_heartbeat_ms: Option<u64>,
    died_at_ms: Option<u64>,
    verdict: Verdict,
}

impl LivenessStateMachine {
    /// Create a machine that declares death after `die_time_ms` of silence
    pub fn new(die_time_ms: u64) -> Self {
        Self {
            die_time_ms,
            last_heartbeat_ms: None,
            died_at_ms: None,
            verdict: Verdict::Waiting,
        }
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn last_heartbeat_ms(&self) -> Option<u64> {
        self.last_heartbeat_ms
    }

    /// Record a heartbeat arrival
    ///
    /// Returns `Recovered` only on the transition out of `Dead`.
    pub fn record_heartbeat(&mut self, now_ms: u64) -> Option<LivenessEvent> {
        self.last_heartbeat_ms = Some(now_ms);

        match self.verdict {
            Verdict::Dead => {
                self.verdict = Verdict::Alive;
                let down_for_ms = self
                    .died_at_ms
                    .take()
                    .map(|died| now_ms.saturating_sub(died))
                    .unwrap_or(0);
                Some(LivenessEvent::Recovered { down_for_ms })
            }
            Verdict::Waiting | Verdict::Alive => {
                self.verdict = Verdict::Alive;
                None
            }
        }
    }

    /// True iff a heartbeat was seen no more than `die_time_ms` ago
    pub fn is_alive(&self, now_ms: u64) -> bool {
        match self.last_heartbeat_ms {
            Some(last) => now_ms.saturating_sub(last) <= self.die_time_ms,
            None => false,
        }
    }

    /// Periodic evaluation; returns `Died` only on the transition into `Dead`
    pub fn evaluate(&mut self, now_ms: u64) -> Option<LivenessEvent> {
        let last = self.last_heartbeat_ms?;

        if self.verdict == Verdict::Alive && !self.is_alive(now_ms) {
            self.verdict = Verdict::Dead;
            self.died_at_ms = Some(now_ms);
            return Some(LivenessEvent::Died {
                silent_for_ms: now_ms.saturating_sub(last),
            });
        }

        None
    }
}
