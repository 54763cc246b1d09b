use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The payload traveling through a flow graph.
///
/// `business` holds the flow author's data as a JSON object. `error_message`
/// is the last-error slot: it is stamped by the node error handler on a
/// failing batch and is never cleared implicitly on success.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowData {
    pub business: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl FlowData {
    pub fn new(business: serde_json::Value) -> Self {
        Self {
            business,
            operator: None,
            started_at: Utc::now(),
            error_message: None,
        }
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    /// Look up a business field by dot-separated path, e.g. `"order.total"`.
    pub fn get(&self, path: &str) -> Option<&serde_json::Value> {
        let mut current = &self.business;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Set a top-level business field. A non-object payload is replaced by an
    /// object first so the write always lands.
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        if !self.business.is_object() {
            self.business = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(object) = self.business.as_object_mut() {
            object.insert(key.into(), value);
        }
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}
