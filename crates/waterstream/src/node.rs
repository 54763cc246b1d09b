use crate::processor::{BatchTransform, ErrorHandler, FlowProcessor, Retryable};
use crate::publisher::FlowPublisher;
use crate::scope::StreamScope;
use crate::subscriber::{CompleteHook, EndDrain, Subscriber, To};
use crate::subscription::Whether;
use async_trait::async_trait;
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use watercore::{
    DefinitionError, FlowContext, FlowContextStatus, FlowData, FlowEvent, FlowFilter, FlowNode,
    Jober, NodeError, RuleEvaluator,
};

/// One runtime graph vertex, bound to exactly one reactive role.
///
/// Each accessor defaults to a fail-fast `FLOW_NODE_OPERATOR_NOT_SUPPORT`
/// error; a node variant overrides only the accessor for the role it owns
/// and memoises the primitive, so repeated calls return the identical
/// instance. `outbound`/`inbound` are the capability hooks graph assembly
/// wires with: only a start node is a source, only an end node is a sink.
#[async_trait]
pub trait RuntimeNode: Send + Sync {
    fn definition(&self) -> &FlowNode;

    fn publisher(
        &self,
        _scope: &StreamScope<FlowData>,
    ) -> Result<Arc<FlowPublisher<FlowData>>, NodeError> {
        Err(NodeError::operator_not_support(self.definition(), "publisher"))
    }

    fn processor(
        &self,
        _scope: &StreamScope<FlowData>,
    ) -> Result<Arc<FlowProcessor<FlowData>>, NodeError> {
        Err(NodeError::operator_not_support(self.definition(), "processor"))
    }

    fn subscriber(&self, _scope: &StreamScope<FlowData>) -> Result<Arc<To<FlowData>>, NodeError> {
        Err(NodeError::operator_not_support(
            self.definition(),
            "subscriber",
        ))
    }

    /// Source side used when this node subscribes a downstream node.
    fn outbound(
        &self,
        scope: &StreamScope<FlowData>,
    ) -> Result<Arc<FlowPublisher<FlowData>>, NodeError> {
        Ok(self.processor(scope)?.publisher())
    }

    /// Sink side used when an upstream node subscribes this node.
    fn inbound(
        &self,
        scope: &StreamScope<FlowData>,
    ) -> Result<Arc<dyn Subscriber<FlowData>>, NodeError> {
        let processor: Arc<dyn Subscriber<FlowData>> = self.processor(scope)?;
        Ok(processor)
    }

    /// Wire `event` from this node's outbound primitive to `target`'s
    /// inbound one. Condition nodes override this to attach the edge
    /// predicate.
    async fn subscribe(
        &self,
        scope: &StreamScope<FlowData>,
        target: &dyn RuntimeNode,
        event: &FlowEvent,
    ) -> watercore::Result<()> {
        let from = self.outbound(scope)?;
        let to = target.inbound(scope)?;
        from.subscribe(&event.meta_id, to).await;
        Ok(())
    }
}

/// Build the uniform per-node error handler: mark every context of the
/// failing batch, stamp a formatted message onto its data, then hand the
/// same batch to the retry continuation exactly once.
pub fn error_handler(def: &FlowNode, stream_id: &str) -> ErrorHandler<FlowData> {
    let meta_id = def.meta_id.clone();
    let name = def.name.clone();
    let stream_id = stream_id.to_string();
    Arc::new(move |error, mut contexts, retry| {
        let message = format!(
            "stream {} node {}[{}] failed: {}: {}",
            stream_id,
            meta_id,
            name,
            error.code(),
            error.detail()
        );
        for context in contexts.iter_mut() {
            context.set_status(FlowContextStatus::Error);
            context.data.mark_error(message.clone());
        }
        retry.process(contexts)
    })
}

/// Drain a completed batch into its payloads, preserving batch order.
pub fn end_produce(contexts: &[FlowContext<FlowData>]) -> Vec<FlowData> {
    contexts.iter().map(|context| context.data.clone()).collect()
}

/// Entry vertex: owns the stream's publisher.
pub struct StartNode {
    def: FlowNode,
    publisher: OnceCell<Arc<FlowPublisher<FlowData>>>,
}

impl StartNode {
    pub fn new(def: FlowNode) -> Self {
        Self {
            def,
            publisher: OnceCell::new(),
        }
    }
}

#[async_trait]
impl RuntimeNode for StartNode {
    fn definition(&self) -> &FlowNode {
        &self.def
    }

    fn publisher(
        &self,
        scope: &StreamScope<FlowData>,
    ) -> Result<Arc<FlowPublisher<FlowData>>, NodeError> {
        Ok(self
            .publisher
            .get_or_init(|| {
                Arc::new(FlowPublisher::new(
                    scope.stream_id.clone(),
                    self.def.meta_id.clone(),
                ))
            })
            .clone())
    }

    fn outbound(
        &self,
        scope: &StreamScope<FlowData>,
    ) -> Result<Arc<FlowPublisher<FlowData>>, NodeError> {
        self.publisher(scope)
    }
}

/// Ordinary processing vertex: runs its jober over each claimed batch.
pub struct StateNode {
    def: FlowNode,
    jober: Arc<dyn Jober>,
    filter: Option<Arc<dyn FlowFilter<FlowData>>>,
    processor: OnceCell<Arc<FlowProcessor<FlowData>>>,
}

impl StateNode {
    pub fn new(
        def: FlowNode,
        jober: Arc<dyn Jober>,
        filter: Option<Arc<dyn FlowFilter<FlowData>>>,
    ) -> Self {
        Self {
            def,
            jober,
            filter,
            processor: OnceCell::new(),
        }
    }
}

#[async_trait]
impl RuntimeNode for StateNode {
    fn definition(&self) -> &FlowNode {
        &self.def
    }

    fn processor(
        &self,
        scope: &StreamScope<FlowData>,
    ) -> Result<Arc<FlowProcessor<FlowData>>, NodeError> {
        Ok(self
            .processor
            .get_or_init(|| {
                let jober = self.jober.clone();
                let transform: BatchTransform<FlowData> = Arc::new(move |batch| {
                    let jober = jober.clone();
                    let future: BoxFuture<'static, Result<Vec<FlowData>, NodeError>> =
                        Box::pin(async move {
                            let payloads: Vec<FlowData> =
                                batch.into_iter().map(|context| context.data).collect();
                            jober.execute(payloads).await
                        });
                    future
                });
                let processor =
                    FlowProcessor::node(&self.def, scope, transform, self.filter.clone());
                processor.on_error(error_handler(&self.def, &scope.stream_id));
                processor
            })
            .clone())
    }
}

/// Gateway vertex: routes each context down the edges whose condition rule
/// accepts it. Branch exclusivity is the flow author's obligation: a
/// context matching several edges travels all of them, and one matching
/// none is archived as a dead end.
pub struct ConditionNode {
    def: FlowNode,
    evaluator: Arc<dyn RuleEvaluator>,
    processor: OnceCell<Arc<FlowProcessor<FlowData>>>,
}

impl ConditionNode {
    pub fn new(def: FlowNode, evaluator: Arc<dyn RuleEvaluator>) -> Self {
        Self {
            def,
            evaluator,
            processor: OnceCell::new(),
        }
    }
}

#[async_trait]
impl RuntimeNode for ConditionNode {
    fn definition(&self) -> &FlowNode {
        &self.def
    }

    fn processor(
        &self,
        scope: &StreamScope<FlowData>,
    ) -> Result<Arc<FlowProcessor<FlowData>>, NodeError> {
        Ok(self
            .processor
            .get_or_init(|| {
                let processor = FlowProcessor::conditions(&self.def, scope);
                processor.on_error(error_handler(&self.def, &scope.stream_id));
                processor
            })
            .clone())
    }

    async fn subscribe(
        &self,
        scope: &StreamScope<FlowData>,
        target: &dyn RuntimeNode,
        event: &FlowEvent,
    ) -> watercore::Result<()> {
        let rule = event
            .condition_rule
            .clone()
            .ok_or_else(|| DefinitionError::MissingConditionRule {
                event: event.meta_id.clone(),
            })?;
        let from = self.outbound(scope)?;
        let to = target.inbound(scope)?;
        let evaluator = self.evaluator.clone();
        let whether: Whether<FlowData> =
            Arc::new(move |context| evaluator.evaluate(&rule, &context.data));
        from.subscribe_when(&event.meta_id, to, whether).await;
        Ok(())
    }
}

/// Structural fan-out vertex. Wiring only: asking it to transform data
/// always fails.
pub struct ForkNode {
    def: FlowNode,
    processor: OnceCell<Arc<FlowProcessor<FlowData>>>,
}

impl ForkNode {
    pub fn new(def: FlowNode) -> Self {
        Self {
            def,
            processor: OnceCell::new(),
        }
    }
}

#[async_trait]
impl RuntimeNode for ForkNode {
    fn definition(&self) -> &FlowNode {
        &self.def
    }

    fn processor(
        &self,
        scope: &StreamScope<FlowData>,
    ) -> Result<Arc<FlowProcessor<FlowData>>, NodeError> {
        Ok(self
            .processor
            .get_or_init(|| {
                let processor = FlowProcessor::wiring(&self.def, scope);
                processor.on_error(error_handler(&self.def, &scope.stream_id));
                processor
            })
            .clone())
    }
}

/// Terminal vertex: drains contexts into final payloads and fires the
/// configured completion callback through the messenger.
pub struct EndNode {
    def: FlowNode,
    sink: OnceCell<Arc<To<FlowData>>>,
}

impl EndNode {
    pub fn new(def: FlowNode) -> Self {
        Self {
            def,
            sink: OnceCell::new(),
        }
    }
}

#[async_trait]
impl RuntimeNode for EndNode {
    fn definition(&self) -> &FlowNode {
        &self.def
    }

    fn subscriber(&self, scope: &StreamScope<FlowData>) -> Result<Arc<To<FlowData>>, NodeError> {
        Ok(self
            .sink
            .get_or_init(|| {
                let drain: EndDrain<FlowData> = Arc::new(end_produce);
                let mut sink = To::new(&self.def, scope, drain);
                if self.def.callback.is_some() {
                    let messenger = scope.messenger.clone();
                    let stream_id = scope.stream_id.clone();
                    let def = self.def.clone();
                    let hook: CompleteHook<FlowData> = Arc::new(move |contexts| {
                        let messenger = messenger.clone();
                        let stream_id = stream_id.clone();
                        let def = def.clone();
                        let future: BoxFuture<'static, ()> = Box::pin(async move {
                            messenger.send_callback(&stream_id, &def, contexts).await;
                        });
                        future
                    });
                    sink = sink.with_hook(hook);
                }
                Arc::new(sink)
            })
            .clone())
    }

    fn inbound(
        &self,
        scope: &StreamScope<FlowData>,
    ) -> Result<Arc<dyn Subscriber<FlowData>>, NodeError> {
        let sink: Arc<dyn Subscriber<FlowData>> = self.subscriber(scope)?;
        Ok(sink)
    }
}
