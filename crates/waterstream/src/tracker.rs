use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Counts batches that are queued or being processed anywhere in one stream.
///
/// Every enqueue calls [`begin`]; the owning worker calls [`end`] once the
/// batch is fully processed and its hand-offs are enqueued. A retry
/// re-enqueue begins before the failing batch ends, so [`wait_idle`] can
/// never observe a false zero between the two.
///
/// [`begin`]: WorkTracker::begin
/// [`end`]: WorkTracker::end
/// [`wait_idle`]: WorkTracker::wait_idle
pub struct WorkTracker {
    active: AtomicUsize,
    notify: Notify,
}

impl WorkTracker {
    pub fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    pub fn begin(&self) {
        self.active.fetch_add(1, Ordering::AcqRel);
    }

    pub fn end(&self) {
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify.notify_waiters();
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Wait until no batch is queued or in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.notify.notified();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for WorkTracker {
    fn default() -> Self {
        Self::new()
    }
}
