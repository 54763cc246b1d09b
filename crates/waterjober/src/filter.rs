use std::sync::Arc;
use watercore::{FilterSpec, FlowContext, FlowData, FlowFilter, NodeError};
use waterstream::FilterFactory;

/// Caps one processing round at `threshold` contexts; the remainder is
/// deferred to a re-queued batch.
pub struct ThresholdFilter {
    threshold: usize,
}

impl ThresholdFilter {
    pub fn new(threshold: usize) -> Self {
        // A zero threshold would defer forever.
        Self {
            threshold: threshold.max(1),
        }
    }
}

impl<T> FlowFilter<T> for ThresholdFilter
where
    T: Clone + Send + Sync + 'static,
{
    fn filter_type(&self) -> &str {
        "filter.threshold"
    }

    fn split(&self, mut contexts: Vec<FlowContext<T>>) -> (Vec<FlowContext<T>>, Vec<FlowContext<T>>) {
        if contexts.len() <= self.threshold {
            return (contexts, Vec::new());
        }
        let deferred = contexts.split_off(self.threshold);
        (contexts, deferred)
    }
}

pub struct ThresholdFilterFactory;

impl FilterFactory for ThresholdFilterFactory {
    fn create(&self, spec: &FilterSpec) -> Result<Arc<dyn FlowFilter<FlowData>>, NodeError> {
        let threshold = spec
            .properties
            .get("threshold")
            .and_then(|v| v.as_u64())
            .unwrap_or(64) as usize;
        Ok(Arc::new(ThresholdFilter::new(threshold)))
    }

    fn filter_type(&self) -> &str {
        "filter.threshold"
    }
}
