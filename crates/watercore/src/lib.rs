//! Core abstractions for the waterflow engine
//!
//! This crate provides the data model (payloads, contexts, flow-definition
//! graphs), the error taxonomy, and the collaborator contracts (context
//! repository, locks, messenger, rule evaluator, jober) that the stream
//! runtime is built on, together with their in-process implementations.

mod context;
mod data;
mod definition;
mod error;
mod jober;
mod locks;
mod messenger;
mod repo;
mod rule;

pub use context::{FlowContext, FlowContextStatus};
pub use data::FlowData;
pub use definition::{
    CallbackSpec, FilterSpec, FlowEvent, FlowGraph, FlowNode, FlowNodeType, JoberSpec,
    RetryPolicy, TaskSpec, TriggerMode,
};
pub use error::{DefinitionError, NodeError, WaterflowError};
pub use jober::{FlowFilter, Jober};
pub use locks::{node_lock_name, FlowLocks, LocalFlowLocks};
pub use messenger::{CallbackNotice, ChannelMessenger, FlowContextMessenger};
pub use repo::{FlowContextRepo, MemoryContextRepo};
pub use rule::{RuleEvaluator, SimpleRuleEvaluator};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, WaterflowError>;
