use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;
use tracing::trace;

use crate::DispatchQueue;

/// Single background task draining one queue.
///
/// Wakes up on every enqueue and on a fixed tick, so a head that the backend
/// refused earlier is retried even when no new work arrives.
pub struct DispatchLoop {
    queue: Arc<DispatchQueue>,
    interval: Duration,
    shutdown_signal: watch::Receiver<()>,
}

impl DispatchLoop {
    pub fn new(
        queue: Arc<DispatchQueue>,
        interval: Duration,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            queue,
            interval,
            shutdown_signal,
        }
    }

    pub async fn run(mut self) {
        let mut interval = self.tick_interval();

        loop {
            tokio::select! {
                _ = self.shutdown_signal.changed() => {
                    debug!(queue = self.queue.name(), "dispatch loop stopped");
                    return;
                }

                _ = interval.tick() => {
                    self.queue.drain();
                }

                _ = self.queue.notified() => {
                    trace!(queue = self.queue.name(), "woken up");
                    self.queue.drain();
                }
            }
        }
    }

    /// If ticks are missed while draining, the next one is delayed instead
    /// of firing in a burst.
    fn tick_interval(&self) -> tokio::time::Interval {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    }
}
