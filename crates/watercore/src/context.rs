use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of one context at one node.
///
/// Transitions: `New` (created, not yet queued) → `Pending` (enqueued at a
/// node) → `Ready` (claimed by the node's worker) → `Processed` (transform
/// succeeded, handed downstream) → `Archived` (reached an end node, or was
/// dropped as a condition dead end). `Error` is set by the node error handler
/// on a failing batch; a successful retry moves the context back through
/// `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowContextStatus {
    New,
    Pending,
    Ready,
    Processed,
    Error,
    Archived,
}

/// One unit of work in flight through one node.
///
/// A context is exclusively owned by the executing node at any instant; the
/// hand-off to the next node produces a fresh context via [`advance`].
///
/// [`advance`]: FlowContext::advance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowContext<T> {
    pub id: Uuid,
    pub stream_id: String,
    /// Meta id of the node this context currently belongs to.
    pub position: String,
    pub status: FlowContextStatus,
    pub data: T,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<T: Clone> FlowContext<T> {
    pub fn new(stream_id: impl Into<String>, position: impl Into<String>, data: T) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            stream_id: stream_id.into(),
            position: position.into(),
            status: FlowContextStatus::New,
            data,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: FlowContextStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Hand this context's data off to the next node: a fresh context with a
    /// new identity, pending at `position`.
    pub fn advance(self, position: &str) -> FlowContext<T> {
        let now = Utc::now();
        FlowContext {
            id: Uuid::new_v4(),
            stream_id: self.stream_id,
            position: position.to_string(),
            status: FlowContextStatus::Pending,
            data: self.data,
            created_at: now,
            updated_at: now,
        }
    }
}
