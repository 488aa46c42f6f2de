//! Background eviction of idle clients.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::registry::LimiterRegistry;

/// Handle to the background task that periodically sweeps a registry.
///
/// The task runs until [`Sweeper::shutdown`] is awaited or the handle is
/// dropped, whichever comes first.
pub struct Sweeper {
    /// Stop signal observed by the task
    stop: watch::Sender<bool>,
    /// The running task, taken on shutdown
    handle: Mutex<Option<JoinHandle<()>>>,
    period: Duration,
}

impl Sweeper {
    /// Spawn a sweeper using the registry's configured sweep interval.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(registry: Arc<LimiterRegistry>) -> Self {
        let period = registry.config().sweep_interval();
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_sweeper(registry, period, stop_rx));

        debug!(period = ?period, "Sweeper started");

        Self {
            stop,
            handle: Mutex::new(Some(handle)),
            period,
        }
    }

    /// The sweep period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the background task is still running.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stop the background task and wait for it to exit.
    ///
    /// Calling this more than once is a no-op.
    pub async fn shutdown(&self) {
        let _ = self.stop.send(true);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Sweeper task failed");
                }
            }
            info!("Sweeper stopped");
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

async fn run_sweeper(
    registry: Arc<LimiterRegistry>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = registry.sweep();
                if evicted > 0 {
                    debug!(evicted, remaining = registry.len(), "Evicted idle clients");
                } else {
                    trace!(remaining = registry.len(), "Sweep found no idle clients");
                }
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
}
