use crate::engine::{FlowExecutor, FlowStream};
use crate::registry::JoberRegistry;
use crate::scope::StreamScope;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;
use watercore::{
    CallbackNotice, ChannelMessenger, DefinitionError, FlowContextMessenger, FlowContextRepo,
    FlowData, FlowGraph, FlowLocks, LocalFlowLocks, MemoryContextRepo, RetryPolicy, RuleEvaluator,
    SimpleRuleEvaluator,
};

/// Main runtime for executing flows
pub struct WaterflowRuntime {
    registry: Arc<JoberRegistry>,
    evaluator: Arc<dyn RuleEvaluator>,
    repo: Arc<dyn FlowContextRepo<FlowData>>,
    messenger: Arc<ChannelMessenger<FlowData>>,
    locks: Arc<dyn FlowLocks>,
    flows: Arc<RwLock<HashMap<String, FlowGraph>>>,
    config: RuntimeConfig,
}

impl WaterflowRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        let registry = Arc::new(JoberRegistry::new());
        Self::with_registry(registry, config)
    }

    /// Create a new runtime with a pre-configured jober registry
    pub fn with_registry(registry: Arc<JoberRegistry>, config: RuntimeConfig) -> Self {
        Self {
            registry,
            evaluator: Arc::new(SimpleRuleEvaluator::new()),
            repo: Arc::new(MemoryContextRepo::new()),
            messenger: Arc::new(ChannelMessenger::new(config.callback_buffer_size)),
            locks: Arc::new(LocalFlowLocks::new()),
            flows: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Swap the condition evaluator (e.g. for a full expression language)
    pub fn with_evaluator(mut self, evaluator: Arc<dyn RuleEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Swap the context repository (e.g. for a database-backed store)
    pub fn with_repo(mut self, repo: Arc<dyn FlowContextRepo<FlowData>>) -> Self {
        self.repo = repo;
        self
    }

    /// Get access to the jober registry
    pub fn registry(&self) -> &Arc<JoberRegistry> {
        &self.registry
    }

    /// Get access to the context repository
    pub fn repo(&self) -> &Arc<dyn FlowContextRepo<FlowData>> {
        &self.repo
    }

    /// Subscribe to completion callbacks
    pub fn subscribe_callbacks(
        &self,
    ) -> tokio::sync::broadcast::Receiver<CallbackNotice<FlowData>> {
        self.messenger.subscribe()
    }

    /// Register a flow definition
    pub async fn register_flow(&self, graph: FlowGraph) -> watercore::Result<()> {
        graph.validate()?;
        let mut flows = self.flows.write().await;
        tracing::info!(flow = %graph.meta_id, version = %graph.version, "flow registered");
        flows.insert(graph.meta_id.clone(), graph);
        Ok(())
    }

    /// Assemble a registered flow into a live stream
    pub async fn build_stream(&self, flow_id: &str) -> watercore::Result<FlowStream> {
        let graph = {
            let flows = self.flows.read().await;
            flows
                .get(flow_id)
                .cloned()
                .ok_or_else(|| DefinitionError::NotFound(flow_id.to_string()))?
        };
        self.build_stream_for(&graph).await
    }

    /// Assemble a flow definition directly (without registration)
    pub async fn build_stream_for(&self, graph: &FlowGraph) -> watercore::Result<FlowStream> {
        let messenger: Arc<dyn FlowContextMessenger<FlowData>> = self.messenger.clone();
        let scope = StreamScope::new(
            Uuid::new_v4().to_string(),
            self.repo.clone(),
            messenger,
            self.locks.clone(),
            self.config.retry.clone(),
        );
        FlowExecutor::new(self.registry.clone(), self.evaluator.clone())
            .build(graph, scope)
            .await
    }

    /// Execute a registered flow to completion with the given payloads
    pub async fn execute_flow(
        &self,
        flow_id: &str,
        batch: Vec<FlowData>,
    ) -> watercore::Result<Vec<FlowData>> {
        let stream = self.build_stream(flow_id).await?;
        stream.execute(batch).await
    }
}

impl Default for WaterflowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub callback_buffer_size: usize,
    pub retry: RetryPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            callback_buffer_size: 1000,
            retry: RetryPolicy::default(),
        }
    }
}
