use crate::error::DefinitionError;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Static type of a graph vertex; determines which reactive role the node
/// exposes at runtime (publisher for start, processor for state/condition/
/// fork, subscriber for end).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowNodeType {
    Start,
    State,
    Condition,
    Fork,
    End,
}

impl fmt::Display for FlowNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowNodeType::Start => "start",
            FlowNodeType::State => "state",
            FlowNodeType::Condition => "condition",
            FlowNodeType::Fork => "fork",
            FlowNodeType::End => "end",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    #[default]
    Auto,
    Manual,
}

/// The directed edge between two nodes. `condition_rule` is only meaningful
/// when the source node is a condition node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEvent {
    pub meta_id: String,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_rule: Option<String>,
}

impl FlowEvent {
    pub fn new(
        meta_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            meta_id: meta_id.into(),
            from: from.into(),
            to: to.into(),
            condition_rule: None,
        }
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.condition_rule = Some(rule.into());
        self
    }
}

/// Automatic task attached to a state node, resolved by type through the
/// jober registry at assembly time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoberSpec {
    pub jober_type: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl JoberSpec {
    pub fn new(jober_type: impl Into<String>) -> Self {
        Self {
            jober_type: jober_type.into(),
            properties: serde_json::Value::Null,
        }
    }

    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    pub filter_type: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl FilterSpec {
    pub fn new(filter_type: impl Into<String>) -> Self {
        Self {
            filter_type: filter_type.into(),
            properties: serde_json::Value::Null,
        }
    }

    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }
}

/// Manual (human-triggered) task metadata. Carried for fidelity with the
/// authoring model; this engine executes the owning node like any other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    pub task_type: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Completion callback configuration for an end node. When present, finished
/// contexts are forwarded through the messenger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackSpec {
    pub name: String,
    pub callback_type: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl CallbackSpec {
    pub fn new(name: impl Into<String>, callback_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            callback_type: callback_type.into(),
            properties: serde_json::Value::Null,
        }
    }
}

/// One graph vertex: the static definition bound to a reactive primitive at
/// assembly time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub meta_id: String,
    pub name: String,
    pub node_type: FlowNodeType,
    #[serde(default)]
    pub trigger_mode: TriggerMode,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    #[serde(default)]
    pub events: Vec<FlowEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jober: Option<JoberSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jober_filter: Option<FilterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_filter: Option<FilterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<CallbackSpec>,
}

impl FlowNode {
    pub fn new(
        meta_id: impl Into<String>,
        name: impl Into<String>,
        node_type: FlowNodeType,
    ) -> Self {
        Self {
            meta_id: meta_id.into(),
            name: name.into(),
            node_type,
            trigger_mode: TriggerMode::default(),
            properties: HashMap::new(),
            events: Vec::new(),
            jober: None,
            jober_filter: None,
            task: None,
            task_filter: None,
            callback: None,
        }
    }

    pub fn belongs_to(&self, node_type: FlowNodeType) -> bool {
        self.node_type == node_type
    }

    /// Add an outgoing event to `to`, with `from` set to this node.
    pub fn connect_to(mut self, event_id: impl Into<String>, to: impl Into<String>) -> Self {
        let from = self.meta_id.clone();
        self.events.push(FlowEvent::new(event_id, from, to));
        self
    }

    /// Add a condition-gated outgoing event to `to`.
    pub fn connect_when(
        mut self,
        event_id: impl Into<String>,
        to: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        let from = self.meta_id.clone();
        self.events
            .push(FlowEvent::new(event_id, from, to).with_rule(rule));
        self
    }

    pub fn with_event(mut self, event: FlowEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_trigger(mut self, trigger_mode: TriggerMode) -> Self {
        self.trigger_mode = trigger_mode;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_jober(mut self, jober: JoberSpec) -> Self {
        self.jober = Some(jober);
        self
    }

    pub fn with_jober_filter(mut self, filter: FilterSpec) -> Self {
        self.jober_filter = Some(filter);
        self
    }

    pub fn with_task(mut self, task: TaskSpec) -> Self {
        self.task = Some(task);
        self
    }

    pub fn with_task_filter(mut self, filter: FilterSpec) -> Self {
        self.task_filter = Some(filter);
        self
    }

    pub fn with_callback(mut self, callback: CallbackSpec) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// One executable flow version: the assembled set of nodes and events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowGraph {
    pub meta_id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub nodes: Vec<FlowNode>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl FlowGraph {
    pub fn new(meta_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            meta_id: meta_id.into(),
            name: name.into(),
            version: default_version(),
            nodes: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn add_node(&mut self, node: FlowNode) -> &mut Self {
        self.nodes.push(node);
        self
    }

    pub fn with_node(mut self, node: FlowNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn find_node(&self, meta_id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.meta_id == meta_id)
    }

    pub fn start_node(&self) -> Option<&FlowNode> {
        self.nodes
            .iter()
            .find(|n| n.belongs_to(FlowNodeType::Start))
    }

    pub fn end_nodes(&self) -> Vec<&FlowNode> {
        self.nodes
            .iter()
            .filter(|n| n.belongs_to(FlowNodeType::End))
            .collect()
    }

    pub fn events(&self) -> impl Iterator<Item = &FlowEvent> {
        self.nodes.iter().flat_map(|n| n.events.iter())
    }

    /// Check the graph is executable: exactly one start, at least one end,
    /// every event lands on a known node, condition events carry rules, end
    /// nodes are terminal, and the graph is acyclic.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.meta_id.as_str()) {
                return Err(DefinitionError::Invalid(format!(
                    "duplicate node meta id {}",
                    node.meta_id
                )));
            }
        }

        let starts = self
            .nodes
            .iter()
            .filter(|n| n.belongs_to(FlowNodeType::Start))
            .count();
        if starts == 0 {
            return Err(DefinitionError::MissingStart);
        }
        if starts > 1 {
            return Err(DefinitionError::MultipleStart);
        }
        if self.end_nodes().is_empty() {
            return Err(DefinitionError::MissingEnd);
        }

        for node in &self.nodes {
            if node.belongs_to(FlowNodeType::End) && !node.events.is_empty() {
                return Err(DefinitionError::Invalid(format!(
                    "end node {} has outgoing events",
                    node.meta_id
                )));
            }
            if !node.belongs_to(FlowNodeType::End) && node.events.is_empty() {
                return Err(DefinitionError::Invalid(format!(
                    "node {} has no outgoing events",
                    node.meta_id
                )));
            }
            for event in &node.events {
                if event.from != node.meta_id {
                    return Err(DefinitionError::Invalid(format!(
                        "event {} listed under node {} but starts from {}",
                        event.meta_id, node.meta_id, event.from
                    )));
                }
                if self.find_node(&event.to).is_none() {
                    return Err(DefinitionError::DanglingEvent {
                        event: event.meta_id.clone(),
                        to: event.to.clone(),
                    });
                }
                if node.belongs_to(FlowNodeType::Condition) && event.condition_rule.is_none() {
                    return Err(DefinitionError::MissingConditionRule {
                        event: event.meta_id.clone(),
                    });
                }
            }
        }

        self.check_cycles()
    }

    fn check_cycles(&self) -> Result<(), DefinitionError> {
        let mut graph = DiGraph::<&str, ()>::new();
        let mut indices = HashMap::new();
        for node in &self.nodes {
            let idx = graph.add_node(node.meta_id.as_str());
            indices.insert(node.meta_id.as_str(), idx);
        }
        for event in self.events() {
            let from = indices
                .get(event.from.as_str())
                .ok_or_else(|| DefinitionError::NodeNotFound(event.from.clone()))?;
            let to = indices
                .get(event.to.as_str())
                .ok_or_else(|| DefinitionError::NodeNotFound(event.to.clone()))?;
            graph.add_edge(*from, *to, ());
        }
        if toposort(&graph, None).is_err() {
            return Err(DefinitionError::CyclicGraph);
        }
        Ok(())
    }
}

/// Retry policy applied by a node's processor when a batch fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before re-delivering attempt `attempt` (1-based for retries).
    pub fn backoff_delay(&self, attempt: u32) -> std::time::Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier = self.backoff_multiplier.powi(exponent as i32);
        std::time::Duration::from_millis((self.delay_ms as f64 * multiplier) as u64)
    }
}
