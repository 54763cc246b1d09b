use std::sync::Arc;
use watercore::{
    FilterSpec, FlowContext, FlowData, FlowFilter, FlowGraph, FlowNode, FlowNodeType, Jober,
    JoberSpec,
};
use waterjober::{EchoJober, ThresholdFilter};
use waterstream::{JoberRegistry, RuntimeConfig, WaterflowRuntime};

fn payload(value: serde_json::Value) -> FlowData {
    FlowData::new(value)
}

#[tokio::test]
async fn echo_jober_passes_batches_through() {
    let batch = vec![
        payload(serde_json::json!({ "a": 1 })),
        payload(serde_json::json!({ "b": 2 })),
    ];
    let expected = batch.clone();

    let out = EchoJober.execute(batch).await.expect("echo never fails");
    assert_eq!(out, expected);
}

#[tokio::test]
async fn transform_jober_maps_and_sets_fields() {
    let jober = full_registry()
        .create_jober(&JoberSpec::new("general.transform").with_properties(serde_json::json!({
            "mappings": { "total": "order.amount" },
            "set": { "checked": true }
        })))
        .expect("factory creates");

    let out = jober
        .execute(vec![payload(serde_json::json!({
            "order": { "amount": 42 }
        }))])
        .await
        .expect("transform succeeds");

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get("total"), Some(&serde_json::json!(42)));
    assert_eq!(out[0].get("checked"), Some(&serde_json::json!(true)));
    assert_eq!(
        out[0].get("order.amount"),
        Some(&serde_json::json!(42)),
        "source fields are kept"
    );
}

#[tokio::test]
async fn transform_jober_missing_source_becomes_null() {
    let jober = full_registry()
        .create_jober(&JoberSpec::new("general.transform").with_properties(serde_json::json!({
            "mappings": { "copied": "missing.path" }
        })))
        .expect("factory creates");

    let out = jober
        .execute(vec![payload(serde_json::json!({}))])
        .await
        .expect("transform succeeds");
    assert_eq!(out[0].get("copied"), Some(&serde_json::Value::Null));
}

#[tokio::test]
async fn delay_jober_preserves_the_batch() {
    let registry = full_registry();
    let jober = registry
        .create_jober(
            &JoberSpec::new("time.delay").with_properties(serde_json::json!({ "delay_ms": 5 })),
        )
        .expect("factory creates");

    let batch = vec![payload(serde_json::json!({ "k": "v" }))];
    let expected = batch.clone();
    let out = jober.execute(batch).await.expect("delay succeeds");
    assert_eq!(out, expected);
}

#[test]
fn http_jober_requires_a_url() {
    let registry = full_registry();
    let result = registry.create_jober(&JoberSpec::new("http.request"));
    assert!(result.is_err(), "http jober without a url must be rejected");
}

#[test]
fn threshold_filter_splits_oversized_batches() {
    let filter = ThresholdFilter::new(2);
    let contexts: Vec<FlowContext<FlowData>> = (0..5)
        .map(|i| FlowContext::new("s1", "n1", payload(serde_json::json!({ "i": i }))))
        .collect();

    let (selected, deferred) = filter.split(contexts);
    assert_eq!(selected.len(), 2);
    assert_eq!(deferred.len(), 3);
    assert_eq!(selected[0].data.get("i"), Some(&serde_json::json!(0)));
    assert_eq!(deferred[0].data.get("i"), Some(&serde_json::json!(2)));
}

#[test]
fn threshold_filter_takes_small_batches_whole() {
    let filter = ThresholdFilter::new(8);
    let contexts: Vec<FlowContext<FlowData>> = (0..3)
        .map(|i| FlowContext::new("s1", "n1", payload(serde_json::json!({ "i": i }))))
        .collect();

    let (selected, deferred) = filter.split(contexts);
    assert_eq!(selected.len(), 3);
    assert!(deferred.is_empty());
}

#[test]
fn threshold_filter_never_defers_forever() {
    // A zero threshold is clamped so progress is always possible.
    let filter = ThresholdFilter::new(0);
    let contexts: Vec<FlowContext<FlowData>> = (0..2)
        .map(|i| FlowContext::new("s1", "n1", payload(serde_json::json!({ "i": i }))))
        .collect();

    let (selected, deferred) = filter.split(contexts);
    assert_eq!(selected.len(), 1);
    assert_eq!(deferred.len(), 1);
}

#[tokio::test]
async fn filtered_state_node_still_processes_every_context() {
    let mut registry = JoberRegistry::new();
    waterjober::register_all(&mut registry);

    let graph = FlowGraph::new("filtered_flow", "filtered")
        .with_node(FlowNode::new("start1", "start", FlowNodeType::Start).connect_to("e1", "work"))
        .with_node(
            FlowNode::new("work", "work", FlowNodeType::State)
                .with_jober(JoberSpec::new("general.echo"))
                .with_jober_filter(
                    FilterSpec::new("filter.threshold")
                        .with_properties(serde_json::json!({ "threshold": 2 })),
                )
                .connect_to("e2", "end1"),
        )
        .with_node(FlowNode::new("end1", "end", FlowNodeType::End));

    let runtime = WaterflowRuntime::with_registry(Arc::new(registry), RuntimeConfig::default());
    runtime.register_flow(graph).await.expect("flow registers");

    let batch: Vec<FlowData> = (0..5)
        .map(|i| payload(serde_json::json!({ "i": i })))
        .collect();
    let products = runtime
        .execute_flow("filtered_flow", batch)
        .await
        .expect("flow executes");

    assert_eq!(
        products.len(),
        5,
        "deferred contexts must be re-queued, not dropped"
    );
}

fn full_registry() -> JoberRegistry {
    let mut registry = JoberRegistry::new();
    waterjober::register_all(&mut registry);
    registry
}

#[test]
fn registry_lists_the_standard_jobers() {
    let registry = full_registry();
    let mut types = registry.list_jober_types();
    types.sort();
    assert_eq!(
        types,
        vec![
            "general.echo",
            "general.transform",
            "http.request",
            "time.delay"
        ]
    );
}

#[test]
fn threshold_filter_is_registered() {
    let registry = full_registry();
    let filter = registry
        .create_filter(
            &FilterSpec::new("filter.threshold")
                .with_properties(serde_json::json!({ "threshold": 3 })),
        )
        .expect("filter factory is registered");
    assert_eq!(filter.filter_type(), "filter.threshold");
}
