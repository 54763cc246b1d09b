use crate::node::{ConditionNode, EndNode, ForkNode, RuntimeNode, StartNode, StateNode};
use crate::publisher::FlowPublisher;
use crate::registry::JoberRegistry;
use crate::scope::StreamScope;
use crate::subscriber::To;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use watercore::{
    DefinitionError, FlowContext, FlowContextStatus, FlowData, FlowGraph, FlowNodeType, Jober,
    NodeError, RuleEvaluator,
};

/// Fallback for state nodes defined without a jober.
struct PassThroughJober;

#[async_trait]
impl Jober for PassThroughJober {
    fn jober_type(&self) -> &str {
        "general.passthrough"
    }

    async fn execute(&self, batch: Vec<FlowData>) -> Result<Vec<FlowData>, NodeError> {
        Ok(batch)
    }
}

/// Assembles a validated flow graph into a wired, running stream.
pub struct FlowExecutor {
    registry: Arc<JoberRegistry>,
    evaluator: Arc<dyn RuleEvaluator>,
}

impl FlowExecutor {
    pub fn new(registry: Arc<JoberRegistry>, evaluator: Arc<dyn RuleEvaluator>) -> Self {
        Self {
            registry,
            evaluator,
        }
    }

    /// Validate `graph`, bind every node to its reactive primitive, and wire
    /// every event. Workers are live once this returns.
    pub async fn build(
        &self,
        graph: &FlowGraph,
        scope: StreamScope<FlowData>,
    ) -> watercore::Result<FlowStream> {
        graph.validate()?;

        let mut nodes: HashMap<String, Arc<dyn RuntimeNode>> = HashMap::new();
        for def in &graph.nodes {
            let node: Arc<dyn RuntimeNode> = match def.node_type {
                FlowNodeType::Start => Arc::new(StartNode::new(def.clone())),
                FlowNodeType::State => {
                    let jober: Arc<dyn Jober> = match &def.jober {
                        Some(spec) => self.registry.create_jober(spec)?,
                        None => Arc::new(PassThroughJober),
                    };
                    let filter = match &def.jober_filter {
                        Some(spec) => Some(self.registry.create_filter(spec)?),
                        None => None,
                    };
                    Arc::new(StateNode::new(def.clone(), jober, filter))
                }
                FlowNodeType::Condition => {
                    Arc::new(ConditionNode::new(def.clone(), self.evaluator.clone()))
                }
                FlowNodeType::Fork => Arc::new(ForkNode::new(def.clone())),
                FlowNodeType::End => Arc::new(EndNode::new(def.clone())),
            };
            nodes.insert(def.meta_id.clone(), node);
        }

        for def in &graph.nodes {
            let from = nodes
                .get(&def.meta_id)
                .ok_or_else(|| DefinitionError::NodeNotFound(def.meta_id.clone()))?;
            for event in &def.events {
                let target = nodes
                    .get(&event.to)
                    .ok_or_else(|| DefinitionError::NodeNotFound(event.to.clone()))?;
                from.subscribe(&scope, target.as_ref(), event).await?;
                tracing::debug!(
                    stream = %scope.stream_id,
                    event = %event.meta_id,
                    from = %event.from,
                    to = %event.to,
                    "event wired"
                );
            }
        }

        let start_def = graph.start_node().ok_or(DefinitionError::MissingStart)?;
        let start = nodes
            .get(&start_def.meta_id)
            .ok_or_else(|| DefinitionError::NodeNotFound(start_def.meta_id.clone()))?;
        let entry = start.publisher(&scope)?;

        let mut ends = Vec::new();
        for def in graph.end_nodes() {
            let node = nodes
                .get(&def.meta_id)
                .ok_or_else(|| DefinitionError::NodeNotFound(def.meta_id.clone()))?;
            ends.push(node.subscriber(&scope)?);
        }

        tracing::info!(
            flow = %graph.meta_id,
            stream = %scope.stream_id,
            nodes = graph.nodes.len(),
            "flow stream assembled"
        );

        Ok(FlowStream {
            start_position: start_def.meta_id.clone(),
            entry,
            ends,
            scope,
            nodes,
        })
    }
}

/// One live execution graph. Offer payloads in, wait for quiescence, drain
/// the end sinks.
pub struct FlowStream {
    start_position: String,
    entry: Arc<FlowPublisher<FlowData>>,
    ends: Vec<Arc<To<FlowData>>>,
    scope: StreamScope<FlowData>,
    nodes: HashMap<String, Arc<dyn RuntimeNode>>,
}

impl FlowStream {
    pub fn stream_id(&self) -> &str {
        &self.scope.stream_id
    }

    pub fn scope(&self) -> &StreamScope<FlowData> {
        &self.scope
    }

    pub fn node(&self, meta_id: &str) -> Option<Arc<dyn RuntimeNode>> {
        self.nodes.get(meta_id).cloned()
    }

    pub fn end(&self, meta_id: &str) -> Option<Arc<To<FlowData>>> {
        self.ends.iter().find(|t| t.meta_id() == meta_id).cloned()
    }

    /// Feed payloads into the start node. Returns how many contexts were
    /// delivered downstream.
    pub async fn offer(&self, batch: Vec<FlowData>) -> watercore::Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let contexts: Vec<FlowContext<FlowData>> = batch
            .into_iter()
            .map(|data| {
                let mut context = FlowContext::new(
                    self.scope.stream_id.clone(),
                    self.start_position.clone(),
                    data,
                );
                context.set_status(FlowContextStatus::Ready);
                context
            })
            .collect();
        self.scope.repo.save(&contexts).await?;

        let routed = self.entry.publish(contexts).await;
        if !routed.dead_ends.is_empty() {
            tracing::warn!(
                stream = %self.scope.stream_id,
                count = routed.dead_ends.len(),
                "offered contexts matched no start edge, archiving"
            );
            let mut dead = routed.dead_ends;
            for context in dead.iter_mut() {
                context.set_status(FlowContextStatus::Archived);
            }
            self.scope.repo.save(&dead).await?;
        }
        if !routed.failed.is_empty() {
            // Start edges are unconditional; a predicate failure here means a
            // miswired graph. Persist the failure and surface it.
            let mut failed = routed.failed;
            for context in failed.iter_mut() {
                context.set_status(FlowContextStatus::Error);
            }
            self.scope.repo.save(&failed).await?;
            if let Some(error) = routed.failure {
                return Err(error.into());
            }
        }
        Ok(routed.delivered)
    }

    /// Wait until no batch is queued or in flight anywhere in the stream.
    pub async fn wait_idle(&self) {
        self.scope.tracker.wait_idle().await;
    }

    /// Collect everything the end sinks have produced so far.
    pub async fn drain(&self) -> Vec<FlowData> {
        let mut products = Vec::new();
        for end in &self.ends {
            products.extend(end.produced().await);
        }
        products
    }

    /// Offer, wait for quiescence, drain.
    pub async fn execute(&self, batch: Vec<FlowData>) -> watercore::Result<Vec<FlowData>> {
        self.offer(batch).await?;
        self.wait_idle().await;
        Ok(self.drain().await)
    }

    /// Stop the stream: workers drop queued batches and stop dispatching
    /// downstream. Already-persisted contexts keep their last status.
    pub fn cancel(&self) {
        tracing::info!(stream = %self.scope.stream_id, "cancelling flow stream");
        self.scope.cancellation.cancel();
    }
}

impl Drop for FlowStream {
    fn drop(&mut self) {
        self.scope.cancellation.cancel();
    }
}
