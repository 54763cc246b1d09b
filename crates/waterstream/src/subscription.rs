use crate::subscriber::Subscriber;
use std::sync::Arc;
use watercore::{FlowContext, NodeError};

/// Edge predicate bound at subscribe time. A condition node builds one from
/// the edge's condition rule; unconditional edges have none.
pub type Whether<T> = Arc<dyn Fn(&FlowContext<T>) -> Result<bool, NodeError> + Send + Sync>;

/// One wired edge: where to deliver, and whether a given context travels it.
pub struct Subscription<T> {
    pub edge_id: String,
    pub whether: Option<Whether<T>>,
    pub target: Arc<dyn Subscriber<T>>,
}

impl<T> Subscription<T> {
    pub fn matches(&self, context: &FlowContext<T>) -> Result<bool, NodeError> {
        match &self.whether {
            None => Ok(true),
            Some(whether) => whether(context),
        }
    }
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            edge_id: self.edge_id.clone(),
            whether: self.whether.clone(),
            target: self.target.clone(),
        }
    }
}
