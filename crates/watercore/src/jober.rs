use crate::context::FlowContext;
use crate::data::FlowData;
use crate::error::NodeError;
use async_trait::async_trait;

/// An automatic task attached to a state node. The node's processor invokes
/// it with the payloads of one claimed batch; it returns exactly one output
/// payload per input, in order.
#[async_trait]
pub trait Jober: Send + Sync {
    /// Type identifier, e.g. "general.echo" or "http.request".
    fn jober_type(&self) -> &str;

    async fn execute(&self, batch: Vec<FlowData>) -> Result<Vec<FlowData>, NodeError>;
}

/// Selects which contexts of an incoming batch a processing round takes.
/// Deferred contexts are re-queued, not dropped.
pub trait FlowFilter<T>: Send + Sync {
    fn filter_type(&self) -> &str;

    /// Split a batch into (selected, deferred).
    fn split(&self, contexts: Vec<FlowContext<T>>) -> (Vec<FlowContext<T>>, Vec<FlowContext<T>>);
}
