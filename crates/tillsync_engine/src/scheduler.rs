//! Debounced sweep scheduling.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Something a scheduler can fire.
#[async_trait]
pub trait SweepTrigger: Send + Sync + 'static {
    /// Returns true if a sweep could reach the backend right now.
    fn is_online(&self) -> bool;

    /// Runs a sweep.
    async fn trigger(&self);
}

/// Coalesces bursts of local writes into a single sweep.
///
/// Every [`schedule`](Self::schedule) restarts the quiet period; the sweep
/// fires once the period elapses without another call. A trigger that fires
/// while offline is dropped, not queued. Cancelling or re-arming never
/// interrupts a sweep that already started.
pub struct DebouncedScheduler {
    trigger: Arc<dyn SweepTrigger>,
    quiet_period: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
    fired: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl DebouncedScheduler {
    /// Creates a scheduler.
    pub fn new(trigger: Arc<dyn SweepTrigger>, quiet_period: Duration) -> Self {
        Self {
            trigger,
            quiet_period,
            timer: Mutex::new(None),
            fired: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the quiet period.
    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Arms the timer, restarting it if already armed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self) {
        let mut timer = self.timer.lock();
        if let Some(previous) = timer.take() {
            previous.abort();
        }

        let trigger = self.trigger.clone();
        let quiet_period = self.quiet_period;
        let fired = self.fired.clone();
        let dropped = self.dropped.clone();

        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            if trigger.is_online() {
                fired.fetch_add(1, Ordering::SeqCst);
                debug!("Quiet period elapsed, starting sweep");
                trigger.trigger().await;
            } else {
                dropped.fetch_add(1, Ordering::SeqCst);
                debug!("Quiet period elapsed while offline, dropping trigger");
            }
        }));
    }

    /// Disarms a pending trigger.
    pub fn cancel(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
    }

    /// Returns true if a trigger is waiting for its quiet period.
    pub fn is_armed(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Returns how many triggers started a sweep.
    pub fn fired_count(&self) -> u64 {
        self.fired.load(Ordering::SeqCst)
    }

    /// Returns how many triggers were dropped because the device was offline.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}

impl Drop for DebouncedScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
