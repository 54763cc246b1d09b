use crate::tracker::WorkTracker;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use watercore::{FlowContextMessenger, FlowContextRepo, FlowLocks, RetryPolicy};

/// Per-execution wiring bundle handed to every node binding.
///
/// All nodes of one stream share the same repository, messenger, lock and
/// tracker instances; the cancellation token stops every worker of the
/// stream.
pub struct StreamScope<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub stream_id: String,
    pub repo: Arc<dyn FlowContextRepo<T>>,
    pub messenger: Arc<dyn FlowContextMessenger<T>>,
    pub locks: Arc<dyn FlowLocks>,
    pub tracker: Arc<WorkTracker>,
    pub cancellation: CancellationToken,
    pub retry: RetryPolicy,
}

impl<T> StreamScope<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        stream_id: impl Into<String>,
        repo: Arc<dyn FlowContextRepo<T>>,
        messenger: Arc<dyn FlowContextMessenger<T>>,
        locks: Arc<dyn FlowLocks>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            repo,
            messenger,
            locks,
            tracker: Arc::new(WorkTracker::new()),
            cancellation: CancellationToken::new(),
            retry,
        }
    }
}

impl<T> Clone for StreamScope<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            stream_id: self.stream_id.clone(),
            repo: self.repo.clone(),
            messenger: self.messenger.clone(),
            locks: self.locks.clone(),
            tracker: self.tracker.clone(),
            cancellation: self.cancellation.clone(),
            retry: self.retry.clone(),
        }
    }
}
