use crate::subscriber::Subscriber;
use crate::subscription::{Subscription, Whether};
use std::sync::Arc;
use tokio::sync::RwLock;
use watercore::{FlowContext, NodeError};

/// Outcome of one publish: how many contexts were delivered, which matched
/// no edge (dead ends), and which failed predicate evaluation.
pub struct Routed<T> {
    pub delivered: usize,
    pub dead_ends: Vec<FlowContext<T>>,
    pub failed: Vec<FlowContext<T>>,
    pub failure: Option<NodeError>,
}

/// Downstream side of a node: holds the wired subscriptions and pushes each
/// context of a batch to every subscription whose predicate accepts it.
///
/// Multiple matching edges duplicate the context down each of them; a
/// context matching no edge is handed back as a dead end so the owner can
/// archive it observably.
pub struct FlowPublisher<T> {
    stream_id: String,
    meta_id: String,
    subscriptions: RwLock<Vec<Subscription<T>>>,
}

impl<T> std::fmt::Debug for FlowPublisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowPublisher")
            .field("stream_id", &self.stream_id)
            .field("meta_id", &self.meta_id)
            .finish_non_exhaustive()
    }
}

impl<T> FlowPublisher<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(stream_id: impl Into<String>, meta_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            meta_id: meta_id.into(),
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    pub fn meta_id(&self) -> &str {
        &self.meta_id
    }

    /// Wire an unconditional edge.
    pub async fn subscribe(&self, edge_id: &str, target: Arc<dyn Subscriber<T>>) {
        self.attach(edge_id, target, None).await;
    }

    /// Wire a condition-gated edge.
    pub async fn subscribe_when(
        &self,
        edge_id: &str,
        target: Arc<dyn Subscriber<T>>,
        whether: Whether<T>,
    ) {
        self.attach(edge_id, target, Some(whether)).await;
    }

    async fn attach(&self, edge_id: &str, target: Arc<dyn Subscriber<T>>, whether: Option<Whether<T>>) {
        tracing::debug!(
            node = %self.meta_id,
            edge = edge_id,
            to = target.id(),
            conditional = whether.is_some(),
            "wiring subscription"
        );
        self.subscriptions.write().await.push(Subscription {
            edge_id: edge_id.to_string(),
            whether,
            target,
        });
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Push a batch downstream, routing each context by edge predicate.
    pub async fn publish(&self, batch: Vec<FlowContext<T>>) -> Routed<T> {
        let subscriptions = self.subscriptions.read().await.clone();
        let mut buckets: Vec<Vec<FlowContext<T>>> =
            (0..subscriptions.len()).map(|_| Vec::new()).collect();
        let mut routed = Routed {
            delivered: 0,
            dead_ends: Vec::new(),
            failed: Vec::new(),
            failure: None,
        };

        'next: for context in batch {
            let mut matched = Vec::new();
            for (index, subscription) in subscriptions.iter().enumerate() {
                match subscription.matches(&context) {
                    Ok(true) => matched.push(index),
                    Ok(false) => {}
                    Err(error) => {
                        tracing::warn!(
                            stream = %self.stream_id,
                            node = %self.meta_id,
                            edge = %subscription.edge_id,
                            %error,
                            "edge predicate evaluation failed"
                        );
                        if routed.failure.is_none() {
                            routed.failure = Some(error);
                        }
                        routed.failed.push(context);
                        continue 'next;
                    }
                }
            }
            match matched.split_last() {
                None => routed.dead_ends.push(context),
                Some((last, rest)) => {
                    for index in rest {
                        buckets[*index].push(context.clone());
                    }
                    buckets[*last].push(context);
                }
            }
        }

        for (index, bucket) in buckets.into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            routed.delivered += bucket.len();
            subscriptions[index].target.accept(bucket).await;
        }
        routed
    }
}
