//! Background sweep of expired counter entries.
//!
//! Sweeping only bounds memory. A stale entry is replaced on its next check
//! whether or not it has been swept.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::limiter::RateLimiter;

/// Handle to a running sweeper task.
///
/// Call [`SweepHandle::stop`] to shut the task down and wait for it. Dropping
/// the handle aborts the task instead.
pub struct SweepHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Signal the sweeper to stop and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Whether the sweeper task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl RateLimiter {
    /// Spawn a task that sweeps expired entries every `interval`.
    ///
    /// The task holds only a weak reference and exits once the limiter is
    /// dropped. Must be called from within a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweepHandle {
        let interval = interval.max(Duration::from_millis(1));
        let limiter = Arc::downgrade(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        trace!("Sweeper received shutdown");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(limiter) = limiter.upgrade() else {
                            trace!("Rate limiter dropped, sweeper exiting");
                            break;
                        };
                        let removed = limiter.sweep_expired();
                        if removed > 0 {
                            debug!(
                                removed = removed,
                                tracked = limiter.entry_count(),
                                "Swept expired rate limit entries"
                            );
                        }
                    }
                }
            }
        });

        SweepHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}
