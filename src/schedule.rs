//! Cancelable scheduled tasks
//!
//! Every timer in the crate goes through [`ScheduledTask`]: the animation frame
//! of the controller, the throttle window and the reconnect delay of the
//! channel. Each task is a tokio task guarded by a [`CancellationToken`].
//!
//! ```text
//! once:       ──── delay ────► f()
//! repeating:  f() ── period ──► f() ── period ──► f() ... until f() == false
//! ```
//!
//! Cancelling is idempotent and wins against an expiry whose callback has not
//! started yet. Dropping a task cancels it, so a task never outlives its owner.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Handle to a delayed or periodic callback running on the tokio runtime
#[derive(Debug)]
pub struct ScheduledTask {
    label: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Runs `f` once after `delay` unless cancelled first
    pub fn once<F>(label: &'static str, delay: Duration, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let guard = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = guard.cancelled() => {
                    trace!(task = label, "scheduled task cancelled before expiry");
                }
                _ = tokio::time::sleep(delay) => {
                    trace!(task = label, "scheduled task fired");
                    f();
                }
            }
        });

        Self {
            label,
            token,
            handle,
        }
    }

    /// Runs `f` immediately and then every `period` until it returns `false`
    /// or the task is cancelled. Missed ticks are skipped, not replayed.
    pub fn repeating<F>(label: &'static str, period: Duration, mut f: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let token = CancellationToken::new();
        let guard = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = guard.cancelled() => {
                        trace!(task = label, "repeating task cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if !f() {
                            trace!(task = label, "repeating task finished");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            label,
            token,
            handle,
        }
    }

    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            trace!(task = self.label, "cancelling scheduled task");
            self.token.cancel();
        }
    }

    /// True while the callback may still run
    pub fn is_pending(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn once_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let task = ScheduledTask::once("test", Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(task.is_pending());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_never_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let task = ScheduledTask::once("test", Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        task.cancel();
        task.cancel();
        assert!(!task.is_pending());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_cancels() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        drop(ScheduledTask::once(
            "test",
            Duration::from_millis(10),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_stops_when_callback_declines() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let _task = ScheduledTask::repeating("frames", Duration::from_millis(16), move || {
            counter.fetch_add(1, Ordering::SeqCst) + 1 < 3
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }
}
