use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, warn};

use super::constants::MAX_MISSED_HEARTBEAT_ACKS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatDue {
    /// Send a heartbeat carrying this sequence.
    Send(Option<u64>),
    /// The last heartbeat went out less than one interval ago (server
    /// requested); its ack window is still open.
    Waiting,
    /// Previous heartbeat is still unacknowledged; nothing is sent this tick.
    Missed { consecutive: u32 },
    /// Liveness lost. The monitor has disarmed itself.
    Timeout,
}

/// Schedules heartbeats for one connection and tracks their acknowledgement.
///
/// Owned by the shard's connection loop: the ticker task only emits ticks,
/// all bookkeeping and the actual send happen on the loop, so heartbeats and
/// regular frames share a single writer.
pub struct HeartbeatMonitor {
    interval: Option<Duration>,
    last_sequence: Option<u64>,
    last_sent: Option<Instant>,
    awaiting_ack: bool,
    missed_acks: u32,
    ticks: Option<mpsc::Receiver<Instant>>,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatMonitor {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            interval: None,
            last_sequence: None,
            last_sent: None,
            awaiting_ack: false,
            missed_acks: 0,
            ticks: None,
            task: None,
        }
    }

    /// Starts the schedule: first tick after a random delay in
    /// `[0, interval)`, then every `interval`. Re-arming replaces the
    /// previous schedule.
    pub fn arm(&mut self, interval_ms: u64) {
        let jitter = Duration::from_millis(rand::random_range(0..interval_ms.max(1)));
        self.arm_with_jitter(interval_ms, jitter);
    }

    fn arm_with_jitter(&mut self, interval_ms: u64, jitter: Duration) {
        self.disarm();

        let period = Duration::from_millis(interval_ms.max(1));
        let (tick_tx, tick_rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + jitter, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let scheduled = ticker.tick().await;
                if tick_tx.send(scheduled).await.is_err() {
                    break;
                }
            }

            debug!("Heartbeat ticker stopped");
        });

        debug!(
            interval_ms,
            jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX),
            "Heartbeat armed"
        );

        self.interval = Some(period);
        self.awaiting_ack = false;
        self.missed_acks = 0;
        self.ticks = Some(tick_rx);
        self.task = Some(task);
    }

    /// Cancels the pending schedule. Safe to call when already disarmed.
    pub fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.ticks = None;
        self.interval = None;
        self.awaiting_ack = false;
        self.missed_acks = 0;
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// Resolves with the deadline of the next scheduled tick; pends forever
    /// while disarmed.
    pub async fn tick(&mut self) -> Instant {
        match self.ticks.as_mut() {
            Some(ticks) => match ticks.recv().await {
                Some(scheduled) => scheduled,
                None => std::future::pending().await,
            },
            None => std::future::pending().await,
        }
    }

    /// Decides what the tick scheduled for `scheduled` does.
    ///
    /// A miss counts only once a full interval has passed since the last
    /// send, so an out-of-schedule heartbeat still gets `2 × interval`
    /// before the timeout.
    pub fn on_tick(&mut self, scheduled: Instant) -> HeartbeatDue {
        if self.awaiting_ack {
            let waited = self
                .last_sent
                .map_or(Duration::MAX, |sent| scheduled.saturating_duration_since(sent));
            if self.interval.is_some_and(|interval| waited < interval) {
                return HeartbeatDue::Waiting;
            }

            self.missed_acks += 1;
            if self.missed_acks >= MAX_MISSED_HEARTBEAT_ACKS {
                warn!(missed = self.missed_acks, "Heartbeat ACK not received, connection is dead");
                self.disarm();
                return HeartbeatDue::Timeout;
            }
            warn!(missed = self.missed_acks, "Heartbeat ACK not received");
            return HeartbeatDue::Missed {
                consecutive: self.missed_acks,
            };
        }

        self.record_sent(scheduled);
        HeartbeatDue::Send(self.last_sequence)
    }

    /// Heartbeat requested by the server out of schedule.
    pub fn immediate(&mut self) -> Option<u64> {
        self.record_sent(Instant::now());
        self.last_sequence
    }

    fn record_sent(&mut self, at: Instant) {
        self.last_sent = Some(at);
        self.awaiting_ack = true;
        self.missed_acks = 0;
    }

    /// Records an acknowledgement and returns the round-trip latency.
    pub fn on_ack(&mut self) -> Option<Duration> {
        self.awaiting_ack = false;
        self.missed_acks = 0;
        self.last_sent.map(|sent| sent.elapsed())
    }

    /// Remembers the latest sequence seen; it becomes the next heartbeat payload.
    pub fn acknowledge_sequence(&mut self, sequence: u64) {
        if self.last_sequence.is_none_or(|last| sequence >= last) {
            self.last_sequence = Some(sequence);
        }
    }

}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.disarm();
    }
}
