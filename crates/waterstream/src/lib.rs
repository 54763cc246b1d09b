//! Reactive stream runtime for the waterflow engine
//!
//! This crate turns a flow definition into a running publish-subscribe
//! graph: per-node processors with queued workers, condition-gated edges,
//! fork fan-out, terminal sinks with completion callbacks, and uniform
//! error handling with retry.

mod engine;
mod node;
mod processor;
mod publisher;
mod registry;
mod runtime;
mod scope;
mod subscriber;
mod subscription;
mod tracker;

pub use engine::{FlowExecutor, FlowStream};
pub use node::{
    end_produce, error_handler, ConditionNode, EndNode, ForkNode, RuntimeNode, StartNode,
    StateNode,
};
pub use processor::{BatchTransform, ErrorHandler, FlowProcessor, Retryable};
pub use publisher::{FlowPublisher, Routed};
pub use registry::{FilterFactory, JoberFactory, JoberMetadata, JoberRegistry};
pub use runtime::{RuntimeConfig, WaterflowRuntime};
pub use scope::StreamScope;
pub use subscriber::{CompleteHook, EndDrain, Subscriber, To};
pub use subscription::{Subscription, Whether};
pub use tracker::WorkTracker;
