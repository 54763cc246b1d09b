use crate::definition::{FlowNode, FlowNodeType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WaterflowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Per-node failures. Every variant maps to one of the stable error codes
/// surfaced to operators and logs (see [`NodeError::code`]).
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("FLOW_NODE_OPERATOR_NOT_SUPPORT: node {meta_id}({node_type}) does not support operation '{operation}'")]
    OperatorNotSupport {
        meta_id: String,
        node_type: FlowNodeType,
        operation: String,
    },

    #[error("FLOW_ENGINE_EXECUTOR_ERROR: stream {stream_id} node {meta_id}: {cause}")]
    Executor {
        stream_id: String,
        meta_id: String,
        cause: String,
    },

    #[error("FLOW_ENGINE_CONDITION_RULE_ERROR: rule `{rule}`: {cause}")]
    ConditionRule { rule: String, cause: String },

    #[error("Jober failed: {0}")]
    Jober(String),

    #[error("Context store failed: {0}")]
    Store(String),

    #[error("Cancelled")]
    Cancelled,
}

impl NodeError {
    /// Fail-fast error for asking a node for a reactive role it does not own.
    pub fn operator_not_support(node: &FlowNode, operation: impl Into<String>) -> Self {
        NodeError::OperatorNotSupport {
            meta_id: node.meta_id.clone(),
            node_type: node.node_type,
            operation: operation.into(),
        }
    }

    /// Stable identifier for operators and logs.
    pub fn code(&self) -> &'static str {
        match self {
            NodeError::OperatorNotSupport { .. } => "FLOW_NODE_OPERATOR_NOT_SUPPORT",
            NodeError::ConditionRule { .. } => "FLOW_ENGINE_CONDITION_RULE_ERROR",
            NodeError::Executor { .. }
            | NodeError::Jober(_)
            | NodeError::Store(_)
            | NodeError::Cancelled => "FLOW_ENGINE_EXECUTOR_ERROR",
        }
    }

    /// Human-readable cause, never empty.
    pub fn detail(&self) -> String {
        let detail = match self {
            NodeError::OperatorNotSupport { operation, .. } => {
                format!("operation '{}' not supported", operation)
            }
            NodeError::Executor { cause, .. } => cause.clone(),
            NodeError::ConditionRule { cause, .. } => cause.clone(),
            NodeError::Jober(cause) | NodeError::Store(cause) => cause.clone(),
            NodeError::Cancelled => "cancelled".to_string(),
        };
        if detail.trim().is_empty() {
            "internal error".to_string()
        } else {
            detail
        }
    }
}

#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Flow not found: {0}")]
    NotFound(String),

    #[error("Invalid flow: {0}")]
    Invalid(String),

    #[error("Cyclic flow graph detected")]
    CyclicGraph,

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Flow has no start node")]
    MissingStart,

    #[error("Flow has more than one start node")]
    MultipleStart,

    #[error("Flow has no end node")]
    MissingEnd,

    #[error("Event {event} points at unknown node {to}")]
    DanglingEvent { event: String, to: String },

    #[error("Event {event} leaves a condition node without a condition rule")]
    MissingConditionRule { event: String },

    #[error("Unknown jober type: {0}")]
    UnknownJoberType(String),

    #[error("Unknown filter type: {0}")]
    UnknownFilterType(String),
}
