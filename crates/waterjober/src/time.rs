use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use watercore::{FlowData, Jober, JoberSpec, NodeError};
use waterstream::{JoberFactory, JoberMetadata};

/// Delay a batch for a configured duration, then pass it through
pub struct DelayJober {
    delay_ms: u64,
}

#[async_trait]
impl Jober for DelayJober {
    fn jober_type(&self) -> &str {
        "time.delay"
    }

    async fn execute(&self, batch: Vec<FlowData>) -> Result<Vec<FlowData>, NodeError> {
        tracing::debug!(delay_ms = self.delay_ms, "delaying batch");
        sleep(Duration::from_millis(self.delay_ms)).await;
        Ok(batch)
    }
}

pub struct DelayJoberFactory;

impl JoberFactory for DelayJoberFactory {
    fn create(&self, spec: &JoberSpec) -> Result<Arc<dyn Jober>, NodeError> {
        let delay_ms = spec
            .properties
            .get("delay_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(1000); // Default to 1 second if not specified
        Ok(Arc::new(DelayJober { delay_ms }))
    }

    fn jober_type(&self) -> &str {
        "time.delay"
    }

    fn metadata(&self) -> JoberMetadata {
        JoberMetadata {
            description: "Delay a batch for the configured milliseconds".to_string(),
            category: "time".to_string(),
        }
    }
}
