//! Coalescing throttle for outbound control messages
//!
//! Every [`Throttle::submit`] cancels the pending send and schedules a new one
//! a full window later, so a burst collapses into the last value it carried.
//! This favours "latest intent" over an even sample rate: intermediate values
//! are dropped, never delayed.

use crate::schedule::ScheduledTask;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

pub const DEFAULT_WINDOW: Duration = Duration::from_millis(50);

type Sink<T> = Arc<dyn Fn(T) + Send + Sync>;

pub struct Throttle<T> {
    label: &'static str,
    window: Duration,
    sink: Sink<T>,
    pending: Option<ScheduledTask>,
}

impl<T: Send + 'static> Throttle<T> {
    pub fn new<F>(label: &'static str, window: Duration, sink: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            label,
            window,
            sink: Arc::new(sink),
            pending: None,
        }
    }

    /// Replaces whatever is waiting with `message`, sent one window from now
    pub fn submit(&mut self, message: T) {
        if let Some(previous) = self.pending.take() {
            if previous.is_pending() {
                trace!(throttle = self.label, "coalescing pending message");
            }
            previous.cancel();
        }

        let sink = Arc::clone(&self.sink);
        self.pending = Some(ScheduledTask::once(self.label, self.window, move || {
            sink(message)
        }));
    }

    /// Drops the pending message, if any
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(ScheduledTask::is_pending)
    }
}
