use crate::publisher::FlowPublisher;
use crate::scope::StreamScope;
use crate::subscriber::Subscriber;
use crate::tracker::WorkTracker;
use async_trait::async_trait;
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use watercore::{
    node_lock_name, FlowContext, FlowContextRepo, FlowContextStatus, FlowFilter, FlowLocks,
    FlowNode, FlowNodeType, NodeError, RetryPolicy,
};

/// Batch transform applied by a state node's processor: one output payload
/// per input context, in order.
pub type BatchTransform<T> =
    Arc<dyn Fn(Vec<FlowContext<T>>) -> BoxFuture<'static, Result<Vec<T>, NodeError>> + Send + Sync>;

/// Handler invoked with every batch that fails an operation. It annotates
/// the contexts in place and hands the same batch to the retry continuation;
/// it never decides terminal failure itself. The worker awaits the returned
/// future, so retry bookkeeping is finished before the batch is accounted
/// done.
pub type ErrorHandler<T> = Arc<
    dyn Fn(&NodeError, Vec<FlowContext<T>>, Arc<dyn Retryable<T>>) -> BoxFuture<'static, ()>
        + Send
        + Sync,
>;

/// Retry continuation handed to the error handler. The processor's own queue
/// implements it; its retry policy decides re-delivery vs dead-lettering.
pub trait Retryable<T>: Send + Sync {
    fn process(&self, contexts: Vec<FlowContext<T>>) -> BoxFuture<'static, ()>;
}

enum ProcessorMode<T> {
    /// Transform each batch through a jober.
    Map(BatchTransform<T>),
    /// Gateway: pass data through; routing is decided by edge predicates.
    Route,
    /// Fork fan-out: pass data through; the transform surface always fails.
    Wiring,
}

pub(crate) struct Batch<T> {
    contexts: Vec<FlowContext<T>>,
    attempt: u32,
}

struct Work<T>
where
    T: Clone + Send + Sync + 'static,
{
    stream_id: String,
    meta_id: String,
    node_type: FlowNodeType,
    mode: ProcessorMode<T>,
    filter: Option<Arc<dyn FlowFilter<T>>>,
    publisher: Arc<FlowPublisher<T>>,
    handler: OnceCell<ErrorHandler<T>>,
    tx: mpsc::UnboundedSender<Batch<T>>,
    repo: Arc<dyn FlowContextRepo<T>>,
    locks: Arc<dyn FlowLocks>,
    tracker: Arc<WorkTracker>,
    cancellation: CancellationToken,
    retry: RetryPolicy,
}

/// The per-node transform primitive: a subscriber (queue + worker task)
/// upstream and a publisher downstream.
///
/// Worker loop per claimed batch: honour the cancellation token, acquire the
/// node lock, apply the jober filter, run the transform, persist, then push
/// the batch downstream. Any failure goes through the registered error
/// handler and the retry policy.
pub struct FlowProcessor<T>
where
    T: Clone + Send + Sync + 'static,
{
    work: Arc<Work<T>>,
}

impl<T> std::fmt::Debug for FlowProcessor<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowProcessor").finish_non_exhaustive()
    }
}

impl<T> FlowProcessor<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Processor for a state node: maps each batch through `transform`.
    pub fn node(
        def: &FlowNode,
        scope: &StreamScope<T>,
        transform: BatchTransform<T>,
        filter: Option<Arc<dyn FlowFilter<T>>>,
    ) -> Arc<Self> {
        Self::create(def, scope, ProcessorMode::Map(transform), filter)
    }

    /// Processor for a condition node: routes by edge predicates.
    pub fn conditions(def: &FlowNode, scope: &StreamScope<T>) -> Arc<Self> {
        Self::create(def, scope, ProcessorMode::Route, None)
    }

    /// Processor for a fork node: fan-out wiring only, never a transform.
    pub fn wiring(def: &FlowNode, scope: &StreamScope<T>) -> Arc<Self> {
        Self::create(def, scope, ProcessorMode::Wiring, None)
    }

    fn create(
        def: &FlowNode,
        scope: &StreamScope<T>,
        mode: ProcessorMode<T>,
        filter: Option<Arc<dyn FlowFilter<T>>>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let work = Arc::new(Work {
            stream_id: scope.stream_id.clone(),
            meta_id: def.meta_id.clone(),
            node_type: def.node_type,
            mode,
            filter,
            publisher: Arc::new(FlowPublisher::new(
                scope.stream_id.clone(),
                def.meta_id.clone(),
            )),
            handler: OnceCell::new(),
            tx,
            repo: scope.repo.clone(),
            locks: scope.locks.clone(),
            tracker: scope.tracker.clone(),
            cancellation: scope.cancellation.clone(),
            retry: scope.retry.clone(),
        });
        spawn_worker(work.clone(), rx);
        Arc::new(Self { work })
    }

    pub fn meta_id(&self) -> &str {
        &self.work.meta_id
    }

    /// Downstream side of this processor.
    pub fn publisher(&self) -> Arc<FlowPublisher<T>> {
        self.work.publisher.clone()
    }

    /// Register the error handler. Only the first registration takes effect.
    pub fn on_error(&self, handler: ErrorHandler<T>) {
        if self.work.handler.set(handler).is_err() {
            tracing::debug!(node = %self.work.meta_id, "error handler already registered");
        }
    }

    /// Run this processor's transform on a batch, outside the stream.
    ///
    /// For a fork processor this is `fork_juster`: it always fails, because
    /// a fork is wiring, never a data-producing step.
    pub async fn transform(&self, batch: Vec<FlowContext<T>>) -> Result<Vec<T>, NodeError> {
        match &self.work.mode {
            ProcessorMode::Map(transform) => transform(batch).await,
            ProcessorMode::Route => Ok(batch.into_iter().map(|c| c.data).collect()),
            ProcessorMode::Wiring => Err(NodeError::OperatorNotSupport {
                meta_id: self.work.meta_id.clone(),
                node_type: self.work.node_type,
                operation: "fork_juster".to_string(),
            }),
        }
    }
}

#[async_trait]
impl<T> Subscriber<T> for FlowProcessor<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn id(&self) -> &str {
        &self.work.meta_id
    }

    async fn accept(&self, batch: Vec<FlowContext<T>>) {
        if batch.is_empty() {
            return;
        }
        if self.work.cancellation.is_cancelled() {
            tracing::debug!(node = %self.work.meta_id, "cancelled, dropping incoming batch");
            return;
        }
        let moved: Vec<FlowContext<T>> = batch
            .into_iter()
            .map(|context| context.advance(&self.work.meta_id))
            .collect();
        if let Err(error) = self.work.repo.save(&moved).await {
            tracing::warn!(node = %self.work.meta_id, %error, "failed to persist incoming batch");
        }
        enqueue(
            &self.work,
            Batch {
                contexts: moved,
                attempt: 0,
            },
        );
    }
}

fn enqueue<T>(work: &Arc<Work<T>>, batch: Batch<T>)
where
    T: Clone + Send + Sync + 'static,
{
    work.tracker.begin();
    if work.tx.send(batch).is_err() {
        work.tracker.end();
        tracing::warn!(node = %work.meta_id, "processor queue closed, dropping batch");
    }
}

fn spawn_worker<T>(work: Arc<Work<T>>, mut rx: mpsc::UnboundedReceiver<Batch<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            let batch = tokio::select! {
                biased;
                _ = work.cancellation.cancelled() => {
                    while rx.try_recv().is_ok() {
                        work.tracker.end();
                    }
                    break;
                }
                received = rx.recv() => match received {
                    Some(batch) => batch,
                    None => break,
                },
            };
            process_batch(&work, batch).await;
            work.tracker.end();
        }
        tracing::debug!(node = %work.meta_id, "processor worker stopped");
    });
}

async fn process_batch<T>(work: &Arc<Work<T>>, batch: Batch<T>)
where
    T: Clone + Send + Sync + 'static,
{
    if batch.attempt > 0 {
        tokio::time::sleep(work.retry.backoff_delay(batch.attempt)).await;
    }
    if work.cancellation.is_cancelled() {
        return;
    }

    let _guard = work
        .locks
        .acquire(&node_lock_name(&work.stream_id, &work.meta_id))
        .await;

    let (mut selected, deferred) = match &work.filter {
        Some(filter) => filter.split(batch.contexts),
        None => (batch.contexts, Vec::new()),
    };
    if !deferred.is_empty() {
        tracing::debug!(
            node = %work.meta_id,
            count = deferred.len(),
            "deferring contexts past the filter threshold"
        );
        enqueue(
            work,
            Batch {
                contexts: deferred,
                attempt: batch.attempt,
            },
        );
    }
    if selected.is_empty() {
        return;
    }

    for context in selected.iter_mut() {
        context.set_status(FlowContextStatus::Ready);
    }
    persist(work, &selected).await;

    let outcome = match &work.mode {
        ProcessorMode::Map(transform) => transform(selected.clone()).await,
        ProcessorMode::Route | ProcessorMode::Wiring => {
            Ok(selected.iter().map(|c| c.data.clone()).collect())
        }
    };

    let produced = match outcome {
        Ok(produced) if produced.len() == selected.len() => produced,
        Ok(produced) => {
            let error = NodeError::Executor {
                stream_id: work.stream_id.clone(),
                meta_id: work.meta_id.clone(),
                cause: format!(
                    "jober produced {} payloads for {} contexts",
                    produced.len(),
                    selected.len()
                ),
            };
            fail_batch(work, error, selected, batch.attempt).await;
            return;
        }
        Err(error) => {
            fail_batch(work, error, selected, batch.attempt).await;
            return;
        }
    };

    for (context, data) in selected.iter_mut().zip(produced) {
        context.data = data;
        context.set_status(FlowContextStatus::Processed);
    }
    persist(work, &selected).await;

    if work.cancellation.is_cancelled() {
        tracing::debug!(node = %work.meta_id, "cancelled before downstream dispatch");
        return;
    }

    let routed = work.publisher.publish(selected).await;
    if !routed.dead_ends.is_empty() {
        archive_dead_ends(work, routed.dead_ends).await;
    }
    if !routed.failed.is_empty() {
        let error = routed.failure.unwrap_or_else(|| NodeError::Executor {
            stream_id: work.stream_id.clone(),
            meta_id: work.meta_id.clone(),
            cause: "edge predicate failed".to_string(),
        });
        fail_batch(work, error, routed.failed, batch.attempt).await;
    }
}

async fn fail_batch<T>(
    work: &Arc<Work<T>>,
    error: NodeError,
    contexts: Vec<FlowContext<T>>,
    attempt: u32,
) where
    T: Clone + Send + Sync + 'static,
{
    tracing::error!(
        stream = %work.stream_id,
        node = %work.meta_id,
        %error,
        count = contexts.len(),
        "batch failed"
    );
    let requeue: Arc<dyn Retryable<T>> = Arc::new(Requeue {
        work: work.clone(),
        next_attempt: attempt + 1,
    });
    match work.handler.get() {
        Some(handler) => handler(&error, contexts, requeue).await,
        None => {
            // No handler registered: annotate status only and hand back.
            let mut contexts = contexts;
            for context in contexts.iter_mut() {
                context.set_status(FlowContextStatus::Error);
            }
            requeue.process(contexts).await;
        }
    }
}

struct Requeue<T>
where
    T: Clone + Send + Sync + 'static,
{
    work: Arc<Work<T>>,
    next_attempt: u32,
}

impl<T> Retryable<T> for Requeue<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn process(&self, contexts: Vec<FlowContext<T>>) -> BoxFuture<'static, ()> {
        let work = self.work.clone();
        let next_attempt = self.next_attempt;
        Box::pin(async move {
            if let Err(error) = work.repo.save(&contexts).await {
                tracing::warn!(node = %work.meta_id, %error, "failed to persist failed batch");
            }
            if next_attempt >= work.retry.max_attempts {
                tracing::error!(
                    stream = %work.stream_id,
                    node = %work.meta_id,
                    attempts = next_attempt,
                    count = contexts.len(),
                    "retries exhausted, dead-lettering batch"
                );
                return;
            }
            enqueue(
                &work,
                Batch {
                    contexts,
                    attempt: next_attempt,
                },
            );
        })
    }
}

async fn persist<T>(work: &Arc<Work<T>>, contexts: &[FlowContext<T>])
where
    T: Clone + Send + Sync + 'static,
{
    if let Err(error) = work.repo.save(contexts).await {
        tracing::warn!(node = %work.meta_id, %error, "failed to persist contexts");
    }
}

async fn archive_dead_ends<T>(work: &Arc<Work<T>>, mut contexts: Vec<FlowContext<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    tracing::warn!(
        stream = %work.stream_id,
        node = %work.meta_id,
        count = contexts.len(),
        "no edge matched, archiving dead-end contexts"
    );
    for context in contexts.iter_mut() {
        context.set_status(FlowContextStatus::Archived);
    }
    persist(work, &contexts).await;
}
