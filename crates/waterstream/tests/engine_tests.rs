use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use watercore::{
    CallbackSpec, ChannelMessenger, FlowContextMessenger, FlowContextRepo, FlowContextStatus,
    FlowData, FlowGraph, FlowLocks, FlowNode, FlowNodeType, Jober, JoberSpec, LocalFlowLocks,
    MemoryContextRepo, NodeError, RetryPolicy, RuleEvaluator, SimpleRuleEvaluator,
};
use waterstream::{
    FlowExecutor, JoberFactory, JoberRegistry, RuntimeConfig, StreamScope, WaterflowRuntime,
};

/// Initialize tracing for tests
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

struct Harness {
    repo: Arc<MemoryContextRepo<FlowData>>,
    scope: StreamScope<FlowData>,
}

fn harness(stream_id: &str) -> Harness {
    let repo = Arc::new(MemoryContextRepo::new());
    let repo_dyn: Arc<dyn FlowContextRepo<FlowData>> = repo.clone();
    let messenger: Arc<dyn FlowContextMessenger<FlowData>> = Arc::new(ChannelMessenger::new(16));
    let locks: Arc<dyn FlowLocks> = Arc::new(LocalFlowLocks::new());
    let scope = StreamScope::new(
        stream_id,
        repo_dyn,
        messenger,
        locks,
        RetryPolicy {
            max_attempts: 3,
            delay_ms: 1,
            backoff_multiplier: 1.0,
        },
    );
    Harness { repo, scope }
}

fn executor(registry: JoberRegistry) -> FlowExecutor {
    let evaluator: Arc<dyn RuleEvaluator> = Arc::new(SimpleRuleEvaluator::new());
    FlowExecutor::new(Arc::new(registry), evaluator)
}

fn payload(value: serde_json::Value) -> FlowData {
    FlowData::new(value)
}

/// Doubles the business field `x`
struct DoubleJober;

#[async_trait]
impl Jober for DoubleJober {
    fn jober_type(&self) -> &str {
        "test.double"
    }

    async fn execute(&self, batch: Vec<FlowData>) -> Result<Vec<FlowData>, NodeError> {
        let mut out = Vec::with_capacity(batch.len());
        for mut data in batch {
            let x = data.get("x").and_then(|v| v.as_f64()).unwrap_or(0.0);
            data.set("x", serde_json::json!(x * 2.0));
            out.push(data);
        }
        Ok(out)
    }
}

struct DoubleJoberFactory;

impl JoberFactory for DoubleJoberFactory {
    fn create(&self, _spec: &JoberSpec) -> Result<Arc<dyn Jober>, NodeError> {
        Ok(Arc::new(DoubleJober))
    }

    fn jober_type(&self) -> &str {
        "test.double"
    }
}

/// Always fails, counting invocations
struct FailingJober {
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl Jober for FailingJober {
    fn jober_type(&self) -> &str {
        "test.failing"
    }

    async fn execute(&self, _batch: Vec<FlowData>) -> Result<Vec<FlowData>, NodeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NodeError::Jober("boom".to_string()))
    }
}

struct FailingJoberFactory {
    attempts: Arc<AtomicUsize>,
}

impl JoberFactory for FailingJoberFactory {
    fn create(&self, _spec: &JoberSpec) -> Result<Arc<dyn Jober>, NodeError> {
        Ok(Arc::new(FailingJober {
            attempts: self.attempts.clone(),
        }))
    }

    fn jober_type(&self) -> &str {
        "test.failing"
    }
}

/// Sleeps long enough for a cancellation to land mid-flight
struct SlowJober;

#[async_trait]
impl Jober for SlowJober {
    fn jober_type(&self) -> &str {
        "test.slow"
    }

    async fn execute(&self, batch: Vec<FlowData>) -> Result<Vec<FlowData>, NodeError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(batch)
    }
}

struct SlowJoberFactory;

impl JoberFactory for SlowJoberFactory {
    fn create(&self, _spec: &JoberSpec) -> Result<Arc<dyn Jober>, NodeError> {
        Ok(Arc::new(SlowJober))
    }

    fn jober_type(&self) -> &str {
        "test.slow"
    }
}

#[tokio::test]
async fn linear_flow_runs_to_completion() {
    init_tracing();
    let mut registry = JoberRegistry::new();
    registry.register(Arc::new(DoubleJoberFactory));

    let graph = FlowGraph::new("flow1", "linear")
        .with_node(FlowNode::new("start1", "start", FlowNodeType::Start).connect_to("e1", "double"))
        .with_node(
            FlowNode::new("double", "double x", FlowNodeType::State)
                .with_jober(JoberSpec::new("test.double"))
                .connect_to("e2", "end1"),
        )
        .with_node(FlowNode::new("end1", "end", FlowNodeType::End));

    let h = harness("s-linear");
    let stream = executor(registry)
        .build(&graph, h.scope.clone())
        .await
        .expect("stream assembles");

    let products = stream
        .execute(vec![payload(serde_json::json!({ "x": 5 }))])
        .await
        .expect("flow executes");

    assert_eq!(products.len(), 1);
    assert_eq!(products[0].get("x"), Some(&serde_json::json!(10.0)));

    let archived = h
        .repo
        .find_by_position("s-linear", "end1")
        .await
        .expect("repo lookup");
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].status, FlowContextStatus::Archived);
}

#[tokio::test]
async fn condition_routes_matching_contexts_and_archives_dead_ends() {
    // Stream "s1", condition node "c1", edge "e1" with rule "x > 0" to "n1".
    let graph = FlowGraph::new("flow1", "gated")
        .with_node(FlowNode::new("start1", "start", FlowNodeType::Start).connect_to("e0", "c1"))
        .with_node(
            FlowNode::new("c1", "gate", FlowNodeType::Condition).connect_when("e1", "n1", "x > 0"),
        )
        .with_node(FlowNode::new("n1", "work", FlowNodeType::State).connect_to("e2", "end1"))
        .with_node(FlowNode::new("end1", "end", FlowNodeType::End));

    let h = harness("s1");
    let stream = executor(JoberRegistry::new())
        .build(&graph, h.scope.clone())
        .await
        .expect("stream assembles");

    // x: 5 passes the gate and reaches n1.
    stream
        .offer(vec![payload(serde_json::json!({ "x": 5 }))])
        .await
        .expect("offer");
    stream.wait_idle().await;
    assert_eq!(stream.drain().await.len(), 1, "x=5 must reach the end");
    let at_n1 = h.repo.find_by_position("s1", "n1").await.expect("repo");
    assert_eq!(at_n1.len(), 1, "x=5 must be delivered to n1");

    // x: -1 matches no edge and is archived at the gate, observably.
    stream
        .offer(vec![payload(serde_json::json!({ "x": -1 }))])
        .await
        .expect("offer");
    stream.wait_idle().await;
    assert_eq!(
        stream.drain().await.len(),
        1,
        "x=-1 must not reach the end"
    );
    let at_n1 = h.repo.find_by_position("s1", "n1").await.expect("repo");
    assert_eq!(at_n1.len(), 1, "x=-1 must never be delivered to n1");

    let dead_ends: Vec<_> = h
        .repo
        .find_by_position("s1", "c1")
        .await
        .expect("repo")
        .into_iter()
        .filter(|c| c.status == FlowContextStatus::Archived)
        .collect();
    assert_eq!(dead_ends.len(), 1, "the dropped context is archived at c1");
    assert_eq!(dead_ends[0].data.get("x"), Some(&serde_json::json!(-1)));
}

#[tokio::test]
async fn condition_delivers_only_to_accepting_edges() {
    let graph = FlowGraph::new("flow1", "branch")
        .with_node(FlowNode::new("start1", "start", FlowNodeType::Start).connect_to("e0", "c1"))
        .with_node(
            FlowNode::new("c1", "gate", FlowNodeType::Condition)
                .connect_when("ea", "end_a", "true")
                .connect_when("eb", "end_b", "false"),
        )
        .with_node(FlowNode::new("end_a", "end a", FlowNodeType::End))
        .with_node(FlowNode::new("end_b", "end b", FlowNodeType::End));

    let h = harness("s-branch");
    let stream = executor(JoberRegistry::new())
        .build(&graph, h.scope.clone())
        .await
        .expect("stream assembles");

    stream
        .execute(vec![payload(serde_json::json!({ "x": 1 }))])
        .await
        .expect("flow executes");

    let end_a = stream.end("end_a").expect("end_a sink");
    let end_b = stream.end("end_b").expect("end_b sink");
    assert_eq!(
        end_a.produced().await.len(),
        1,
        "accepting edge must receive the context"
    );
    assert!(
        end_b.produced().await.is_empty(),
        "rejecting edge must never receive it"
    );
}

#[tokio::test]
async fn condition_duplicates_context_down_every_matching_edge() {
    let graph = FlowGraph::new("flow1", "overlap")
        .with_node(FlowNode::new("start1", "start", FlowNodeType::Start).connect_to("e0", "c1"))
        .with_node(
            FlowNode::new("c1", "gate", FlowNodeType::Condition)
                .connect_when("ea", "end_a", "x > 0")
                .connect_when("eb", "end_b", "x > 1"),
        )
        .with_node(FlowNode::new("end_a", "end a", FlowNodeType::End))
        .with_node(FlowNode::new("end_b", "end b", FlowNodeType::End));

    let h = harness("s-overlap");
    let stream = executor(JoberRegistry::new())
        .build(&graph, h.scope.clone())
        .await
        .expect("stream assembles");

    stream
        .execute(vec![payload(serde_json::json!({ "x": 5 }))])
        .await
        .expect("flow executes");

    assert_eq!(stream.end("end_a").expect("sink").produced().await.len(), 1);
    assert_eq!(stream.end("end_b").expect("sink").produced().await.len(), 1);
}

#[tokio::test]
async fn fork_fans_out_to_every_edge_without_transforming() {
    let graph = FlowGraph::new("flow1", "fanout")
        .with_node(FlowNode::new("start1", "start", FlowNodeType::Start).connect_to("e0", "f1"))
        .with_node(
            FlowNode::new("f1", "fork", FlowNodeType::Fork)
                .connect_to("ea", "end_a")
                .connect_to("eb", "end_b"),
        )
        .with_node(FlowNode::new("end_a", "end a", FlowNodeType::End))
        .with_node(FlowNode::new("end_b", "end b", FlowNodeType::End));

    let h = harness("s-fork");
    let stream = executor(JoberRegistry::new())
        .build(&graph, h.scope.clone())
        .await
        .expect("stream assembles");

    let products = stream
        .execute(vec![payload(serde_json::json!({ "x": 7 }))])
        .await
        .expect("flow executes");

    assert_eq!(products.len(), 2, "both branches must receive the context");
    for product in &products {
        assert_eq!(
            product.get("x"),
            Some(&serde_json::json!(7)),
            "fork must not change the data"
        );
    }
}

#[tokio::test]
async fn failing_jober_retries_then_dead_letters() {
    init_tracing();
    let attempts = Arc::new(AtomicUsize::new(0));
    let mut registry = JoberRegistry::new();
    registry.register(Arc::new(FailingJoberFactory {
        attempts: attempts.clone(),
    }));

    let graph = FlowGraph::new("flow1", "failing")
        .with_node(FlowNode::new("start1", "start", FlowNodeType::Start).connect_to("e1", "fail"))
        .with_node(
            FlowNode::new("fail", "always fails", FlowNodeType::State)
                .with_jober(JoberSpec::new("test.failing"))
                .connect_to("e2", "end1"),
        )
        .with_node(FlowNode::new("end1", "end", FlowNodeType::End));

    let h = harness("s-fail");
    let stream = executor(registry)
        .build(&graph, h.scope.clone())
        .await
        .expect("stream assembles");

    let products = stream
        .execute(vec![payload(serde_json::json!({ "x": 1 }))])
        .await
        .expect("execution completes despite the failing node");

    assert!(products.is_empty(), "nothing can reach the end");
    assert_eq!(
        attempts.load(Ordering::SeqCst),
        3,
        "max_attempts bounds the retries"
    );

    let failed = h.repo.find_by_position("s-fail", "fail").await.expect("repo");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, FlowContextStatus::Error);
    let message = failed[0]
        .data
        .error_message()
        .expect("error message is stamped");
    assert!(message.contains("fail"), "message names the node: {}", message);
    assert!(
        message.contains("always fails"),
        "message names the node's name: {}",
        message
    );
}

#[tokio::test]
async fn cancellation_stops_dispatch() {
    let mut registry = JoberRegistry::new();
    registry.register(Arc::new(SlowJoberFactory));

    let graph = FlowGraph::new("flow1", "slow")
        .with_node(FlowNode::new("start1", "start", FlowNodeType::Start).connect_to("e1", "slow"))
        .with_node(
            FlowNode::new("slow", "slow", FlowNodeType::State)
                .with_jober(JoberSpec::new("test.slow"))
                .connect_to("e2", "end1"),
        )
        .with_node(FlowNode::new("end1", "end", FlowNodeType::End));

    let h = harness("s-cancel");
    let stream = executor(registry)
        .build(&graph, h.scope.clone())
        .await
        .expect("stream assembles");

    stream
        .offer(vec![payload(serde_json::json!({ "x": 1 }))])
        .await
        .expect("offer");
    tokio::time::sleep(Duration::from_millis(20)).await;
    stream.cancel();
    stream.wait_idle().await;

    assert!(
        stream.drain().await.is_empty(),
        "a cancelled stream must not dispatch downstream"
    );
}

#[tokio::test]
async fn runtime_executes_registered_flow_and_fires_callback() {
    let mut registry = JoberRegistry::new();
    registry.register(Arc::new(DoubleJoberFactory));

    let runtime = WaterflowRuntime::with_registry(Arc::new(registry), RuntimeConfig::default());
    let mut callbacks = runtime.subscribe_callbacks();

    let graph = FlowGraph::new("callback_flow", "with callback")
        .with_node(FlowNode::new("start1", "start", FlowNodeType::Start).connect_to("e1", "double"))
        .with_node(
            FlowNode::new("double", "double x", FlowNodeType::State)
                .with_jober(JoberSpec::new("test.double"))
                .connect_to("e2", "end1"),
        )
        .with_node(
            FlowNode::new("end1", "end", FlowNodeType::End)
                .with_callback(CallbackSpec::new("notify", "channel")),
        );

    runtime.register_flow(graph).await.expect("flow registers");

    let products = runtime
        .execute_flow(
            "callback_flow",
            vec![
                payload(serde_json::json!({ "x": 1 })),
                payload(serde_json::json!({ "x": 2 })),
            ],
        )
        .await
        .expect("flow executes");

    assert_eq!(products.len(), 2);

    let notice = callbacks.try_recv().expect("callback must fire");
    assert_eq!(notice.node_id, "end1");
    assert_eq!(notice.contexts.len(), 2, "full completed batch is forwarded");
    assert!(
        callbacks.try_recv().is_err(),
        "one completed batch fires one callback"
    );
}

#[tokio::test]
async fn unknown_jober_type_fails_assembly() {
    let graph = FlowGraph::new("flow1", "unknown jober")
        .with_node(FlowNode::new("start1", "start", FlowNodeType::Start).connect_to("e1", "work"))
        .with_node(
            FlowNode::new("work", "work", FlowNodeType::State)
                .with_jober(JoberSpec::new("no.such.jober"))
                .connect_to("e2", "end1"),
        )
        .with_node(FlowNode::new("end1", "end", FlowNodeType::End));

    let h = harness("s-unknown");
    let result = executor(JoberRegistry::new()).build(&graph, h.scope).await;
    assert!(result.is_err(), "assembly must reject unknown jober types");
}

#[tokio::test]
async fn state_without_jober_passes_data_through() {
    let graph = FlowGraph::new("flow1", "passthrough")
        .with_node(FlowNode::new("start1", "start", FlowNodeType::Start).connect_to("e1", "noop"))
        .with_node(FlowNode::new("noop", "noop", FlowNodeType::State).connect_to("e2", "end1"))
        .with_node(FlowNode::new("end1", "end", FlowNodeType::End));

    let h = harness("s-pass");
    let stream = executor(JoberRegistry::new())
        .build(&graph, h.scope.clone())
        .await
        .expect("stream assembles");

    let products = stream
        .execute(vec![payload(serde_json::json!({ "x": 9 }))])
        .await
        .expect("flow executes");

    assert_eq!(products.len(), 1);
    assert_eq!(products[0].get("x"), Some(&serde_json::json!(9)));
}
