//! One-shot and periodic timers with replace-on-arm and cancellation.
//!
//! Drives the two gesture timers: the one-shot double-tap expiry and the
//! periodic lift-detection poll. Arming a timer id that is already armed
//! cancels and replaces it, so there is never more than one live timer per
//! purpose. Cancellation is token-based with a short bounded wait for task
//! completion on teardown.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        mpsc::{Receiver, channel},
    },
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Maximum time to wait for a canceled timer task to acknowledge.
const STOP_WAIT_TIMEOUT_MS: u64 = 50;

/// Poll interval used when waiting for timer tasks to finish.
const STOP_POLL_INTERVAL_MS: u64 = 2;

/// Book-keeping for one armed timer.
struct TimerEntry {
    /// Cancels the task.
    token: CancellationToken,
    /// The spawned task.
    handle: tokio::task::JoinHandle<()>,
    /// Signaled when the task observes cancellation or finishes.
    done_rx: Receiver<()>,
}

/// Minimal timer core: schedules a closure once after a delay, or repeatedly
/// on an interval. Supports cancellation and a short bounded wait on clear.
#[derive(Clone)]
pub struct Ticker {
    /// Armed timers by id.
    entries: Arc<Mutex<HashMap<&'static str, TimerEntry>>>,
    /// Runtime the timer tasks run on.
    handle: tokio::runtime::Handle,
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new()
    }
}

impl Ticker {
    /// Create a ticker bound to the current Tokio runtime.
    ///
    /// Panics when called outside a runtime context; construct the engine
    /// from within one.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            handle: tokio::runtime::Handle::current(),
        }
    }

    /// Check if a timer is armed for the given id.
    #[cfg(test)]
    pub fn is_active(&self, id: &str) -> bool {
        self.entries.lock().contains_key(id)
    }

    /// Arm (or replace) a one-shot timer that fires `on_fire` after `delay`.
    pub fn once<F>(&self, id: &'static str, delay: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.stop(id);

        let token = CancellationToken::new();
        let cancel = token.clone();
        let (done_tx, done_rx) = channel::<()>();

        let fut = async move {
            trace!("timer_once_start" = %id, delay_ms = delay.as_millis());
            tokio::select! {
                _ = time::sleep(delay) => {
                    on_fire();
                }
                _ = cancel.cancelled() => {
                    trace!("timer_once_cancelled" = %id);
                }
            }
            let _ = done_tx.send(());
        };

        let handle = self.handle.spawn(fut);
        self.entries.lock().insert(
            id,
            TimerEntry {
                token,
                handle,
                done_rx,
            },
        );
    }

    /// Arm (or replace) a periodic timer that runs `on_tick` every
    /// `interval`, first firing one interval from now.
    pub fn every<F>(&self, id: &'static str, interval: Duration, mut on_tick: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.stop(id);

        let token = CancellationToken::new();
        let cancel = token.clone();
        let (done_tx, done_rx) = channel::<()>();

        let fut = async move {
            trace!("timer_every_start" = %id, interval_ms = interval.as_millis());

            // Initial delay with cancellation; the interval below ticks
            // immediately on first poll.
            tokio::select! {
                _ = time::sleep(interval) => {}
                _ = cancel.cancelled() => {
                    trace!("timer_every_cancelled_initial" = %id);
                    let _ = done_tx.send(());
                    return;
                }
            }

            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        trace!("timer_every_cancelled" = %id);
                        let _ = done_tx.send(());
                        return;
                    }
                    _ = ticker.tick() => {
                        on_tick();
                    }
                }
            }
        };

        let handle = self.handle.spawn(fut);
        self.entries.lock().insert(
            id,
            TimerEntry {
                token,
                handle,
                done_rx,
            },
        );
    }

    /// Cancel a timer if armed (non-blocking).
    pub fn stop(&self, id: &str) {
        if let Some(entry) = self.entries.lock().remove(id) {
            entry.token.cancel();
            // Don't abort the handle, let it cancel gracefully via the token
            trace!("timer_stop" = %id);
        }
    }

    /// Cancel every timer and wait briefly for completion (blocking).
    pub fn clear_sync(&self) {
        let entries: Vec<TimerEntry> = {
            let mut map = self.entries.lock();
            map.drain().map(|(_, e)| e).collect()
        };

        // Cancel all tokens first
        for e in &entries {
            e.token.cancel();
        }

        // Wait for completion signals (blocking timeout), then backstop with
        // quick handle polls.
        let mut handles = Vec::new();
        for e in entries {
            let _ = e
                .done_rx
                .recv_timeout(Duration::from_millis(STOP_WAIT_TIMEOUT_MS));
            handles.push(e.handle);
        }
        let deadline = Instant::now() + Duration::from_millis(STOP_WAIT_TIMEOUT_MS);
        for handle in handles {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(STOP_POLL_INTERVAL_MS));
            }
        }
        trace!("timer_clear_sync");
    }
}
