use async_trait::async_trait;
use std::sync::Arc;
use watercore::{FlowData, Jober, JoberSpec, NodeError};
use waterstream::{JoberFactory, JoberMetadata};

/// Pass-through jober that logs the batch it sees
pub struct EchoJober;

#[async_trait]
impl Jober for EchoJober {
    fn jober_type(&self) -> &str {
        "general.echo"
    }

    async fn execute(&self, batch: Vec<FlowData>) -> Result<Vec<FlowData>, NodeError> {
        for data in &batch {
            tracing::debug!(business = %data.business, "echo");
        }
        Ok(batch)
    }
}

pub struct EchoJoberFactory;

impl JoberFactory for EchoJoberFactory {
    fn create(&self, _spec: &JoberSpec) -> Result<Arc<dyn Jober>, NodeError> {
        Ok(Arc::new(EchoJober))
    }

    fn jober_type(&self) -> &str {
        "general.echo"
    }

    fn metadata(&self) -> JoberMetadata {
        JoberMetadata {
            description: "Pass payloads through unchanged, logging them".to_string(),
            category: "general".to_string(),
        }
    }
}

/// Copy and set business fields according to the configured mappings.
///
/// Properties:
/// - `mappings`: object of `target_field: source_path` pairs; each target is
///   set to the value found at the (dot-separated) source path
/// - `set`: object of `field: literal` pairs written as-is
pub struct TransformJober {
    mappings: serde_json::Map<String, serde_json::Value>,
    set: serde_json::Map<String, serde_json::Value>,
}

#[async_trait]
impl Jober for TransformJober {
    fn jober_type(&self) -> &str {
        "general.transform"
    }

    async fn execute(&self, batch: Vec<FlowData>) -> Result<Vec<FlowData>, NodeError> {
        let mut out = Vec::with_capacity(batch.len());
        for mut data in batch {
            for (target, source) in &self.mappings {
                let source_path = source.as_str().ok_or_else(|| {
                    NodeError::Jober(format!("mapping for '{}' is not a string path", target))
                })?;
                let value = data
                    .get(source_path)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                data.set(target.clone(), value);
            }
            for (field, literal) in &self.set {
                data.set(field.clone(), literal.clone());
            }
            out.push(data);
        }
        Ok(out)
    }
}

pub struct TransformJoberFactory;

impl JoberFactory for TransformJoberFactory {
    fn create(&self, spec: &JoberSpec) -> Result<Arc<dyn Jober>, NodeError> {
        let object = |key: &str| {
            spec.properties
                .get(key)
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default()
        };
        Ok(Arc::new(TransformJober {
            mappings: object("mappings"),
            set: object("set"),
        }))
    }

    fn jober_type(&self) -> &str {
        "general.transform"
    }

    fn metadata(&self) -> JoberMetadata {
        JoberMetadata {
            description: "Copy and set business fields".to_string(),
            category: "general".to_string(),
        }
    }
}
