use crate::scope::StreamScope;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::Mutex;
use watercore::{node_lock_name, FlowContext, FlowContextRepo, FlowContextStatus, FlowLocks, FlowNode};

/// Inbound side of a node: accepts context batches pushed by an upstream
/// publisher. Within one batch, relative order is preserved.
#[async_trait]
pub trait Subscriber<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    /// Meta id of the node this subscriber belongs to.
    fn id(&self) -> &str;

    async fn accept(&self, batch: Vec<FlowContext<T>>);
}

/// Terminal accumulation function of an end sink: drains a completed batch
/// into plain payloads, preserving batch order.
pub type EndDrain<T> = Arc<dyn Fn(&[FlowContext<T>]) -> Vec<T> + Send + Sync>;

/// Completion hook fired with every batch the sink finishes.
pub type CompleteHook<T> = Arc<dyn Fn(Vec<FlowContext<T>>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Terminal sink. Once a context lands here it leaves the live graph: it is
/// archived in the repository and only the completion hooks observe it
/// further.
pub struct To<T>
where
    T: Clone + Send + Sync + 'static,
{
    stream_id: String,
    meta_id: String,
    drain: EndDrain<T>,
    hooks: Vec<CompleteHook<T>>,
    produced: Mutex<Vec<T>>,
    repo: Arc<dyn FlowContextRepo<T>>,
    locks: Arc<dyn FlowLocks>,
}

impl<T> std::fmt::Debug for To<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("To")
            .field("stream_id", &self.stream_id)
            .field("meta_id", &self.meta_id)
            .finish_non_exhaustive()
    }
}

impl<T> To<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(def: &FlowNode, scope: &StreamScope<T>, drain: EndDrain<T>) -> Self {
        Self {
            stream_id: scope.stream_id.clone(),
            meta_id: def.meta_id.clone(),
            drain,
            hooks: Vec::new(),
            produced: Mutex::new(Vec::new()),
            repo: scope.repo.clone(),
            locks: scope.locks.clone(),
        }
    }

    /// Completion hooks are wired at construction, before the sink is shared.
    pub fn with_hook(mut self, hook: CompleteHook<T>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn meta_id(&self) -> &str {
        &self.meta_id
    }

    /// Snapshot of everything drained so far, in arrival order.
    pub async fn produced(&self) -> Vec<T> {
        self.produced.lock().await.clone()
    }
}

#[async_trait]
impl<T> Subscriber<T> for To<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn id(&self) -> &str {
        &self.meta_id
    }

    async fn accept(&self, batch: Vec<FlowContext<T>>) {
        if batch.is_empty() {
            return;
        }
        let mut finished: Vec<FlowContext<T>> = batch
            .into_iter()
            .map(|context| context.advance(&self.meta_id))
            .collect();

        let _guard = self
            .locks
            .acquire(&node_lock_name(&self.stream_id, &self.meta_id))
            .await;

        let payloads = (self.drain)(&finished);
        for context in finished.iter_mut() {
            context.set_status(FlowContextStatus::Archived);
        }
        if let Err(error) = self.repo.save(&finished).await {
            tracing::warn!(node = %self.meta_id, %error, "failed to archive finished contexts");
        }
        tracing::debug!(
            node = %self.meta_id,
            count = finished.len(),
            "batch reached end of flow"
        );
        self.produced.lock().await.extend(payloads);

        for hook in &self.hooks {
            hook(finished.clone()).await;
        }
    }
}
