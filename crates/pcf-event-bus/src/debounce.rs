//! Debouncing Support
//!
//! Every new value restarts the quiet period; only a value that survives the
//! full period without being replaced is emitted.
//!
//! [`Debouncer`] holds the timer state and is driven by explicit instants.
//! [`DebouncedSender`] drives one on a tokio task and publishes settled values.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Debouncer for values - only emits after a quiet period
pub struct Debouncer<T> {
    last_event: Option<(T, Instant)>,
    quiet_period: Duration,
}

impl<T> Debouncer<T> {
    /// Create a new debouncer
    ///
    /// - `quiet_period`: Time to wait after last value before emitting
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            last_event: None,
            quiet_period,
        }
    }

    /// Add a value received at `now`, restarting the timer
    ///
    /// Returns the previous value if its quiet period had already elapsed
    /// (its timer would have fired before this value arrived).
    pub fn push_at(&mut self, event: T, now: Instant) -> Option<T> {
        let result = self.poll_at(now);
        self.last_event = Some((event, now));
        result
    }

    /// Emit the pending value if its quiet period has elapsed
    pub fn poll_at(&mut self, now: Instant) -> Option<T> {
        let settled = self
            .last_event
            .as_ref()
            .is_some_and(|(_, last_time)| {
                now.saturating_duration_since(*last_time) >= self.quiet_period
            });

        if settled {
            self.last_event.take().map(|(evt, _)| evt)
        } else {
            None
        }
    }

    /// Time left before the pending value settles
    pub fn remaining_at(&self, now: Instant) -> Option<Duration> {
        self.last_event.as_ref().map(|(_, last_time)| {
            self.quiet_period
                .saturating_sub(now.saturating_duration_since(*last_time))
        })
    }

    /// Drop the pending value without emitting it
    pub fn cancel(&mut self) {
        self.last_event = None;
    }

    /// Check if there's a pending value
    pub fn has_pending(&self) -> bool {
        self.last_event.is_some()
    }
}

/// Debounces values on a background tokio task
///
/// Values sent within the quiet period of each other collapse into the last
/// one. Dropping the sender stops the task; a value still waiting for its
/// quiet period is discarded.
pub struct DebouncedSender<T> {
    tx: mpsc::UnboundedSender<T>,
    settled: watch::Receiver<Option<T>>,
}

impl<T> DebouncedSender<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Spawn the debounce task on the current tokio runtime
    pub fn spawn(quiet_period: Duration) -> Self {
        Self::spawn_with(quiet_period, |_| {})
    }

    /// Spawn the debounce task, calling `on_settle` with every settled value
    pub fn spawn_with<F>(quiet_period: Duration, on_settle: F) -> Self
    where
        F: Fn(&T) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (settled_tx, settled) = watch::channel(None);
        tokio::spawn(Self::run_loop(rx, quiet_period, settled_tx, on_settle));
        Self { tx, settled }
    }

    /// Offer a new value; restarts the quiet period
    pub fn send(&self, value: T) {
        if self.tx.send(value).is_err() {
            log::debug!("[Debounce] task stopped, dropping value");
        }
    }

    /// Most recent settled value
    pub fn latest(&self) -> Option<T> {
        self.settled.borrow().clone()
    }

    /// Receiver notified whenever a value settles
    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.settled.clone()
    }

    async fn run_loop<F>(
        mut rx: mpsc::UnboundedReceiver<T>,
        quiet_period: Duration,
        settled: watch::Sender<Option<T>>,
        on_settle: F,
    ) where
        F: Fn(&T) + Send + 'static,
    {
        let mut debouncer = Debouncer::new(quiet_period);

        loop {
            let received = match debouncer.remaining_at(Instant::now()) {
                None => rx.recv().await,
                Some(wait) => match tokio::time::timeout(wait, rx.recv()).await {
                    Ok(received) => received,
                    Err(_) => {
                        if let Some(value) = debouncer.poll_at(Instant::now()) {
                            Self::settle(value, &on_settle, &settled);
                        }
                        continue;
                    }
                },
            };

            match received {
                Some(value) => {
                    if let Some(previous) = debouncer.push_at(value, Instant::now()) {
                        Self::settle(previous, &on_settle, &settled);
                    }
                }
                None => {
                    // Sender dropped; a value still waiting is discarded
                    debouncer.cancel();
                    return;
                }
            }
        }
    }

    fn settle<F>(value: T, on_settle: &F, settled: &watch::Sender<Option<T>>)
    where
        F: Fn(&T),
    {
        on_settle(&value);
        settled.send_replace(Some(value));
    }
}
