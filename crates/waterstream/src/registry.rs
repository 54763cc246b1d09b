use std::collections::HashMap;
use std::sync::Arc;
use watercore::{DefinitionError, FilterSpec, FlowData, FlowFilter, Jober, JoberSpec, NodeError};

/// Factory trait for creating jober instances
pub trait JoberFactory: Send + Sync {
    /// Create a new jober from the spec's properties
    fn create(&self, spec: &JoberSpec) -> Result<Arc<dyn Jober>, NodeError>;

    /// Get jober type identifier
    fn jober_type(&self) -> &str;

    /// Optional: Get jober metadata (description, category)
    fn metadata(&self) -> JoberMetadata {
        JoberMetadata::default()
    }
}

/// Factory trait for creating jober filters
pub trait FilterFactory: Send + Sync {
    fn create(&self, spec: &FilterSpec) -> Result<Arc<dyn FlowFilter<FlowData>>, NodeError>;

    fn filter_type(&self) -> &str;
}

/// Metadata about a jober type
#[derive(Debug, Clone)]
pub struct JoberMetadata {
    pub description: String,
    pub category: String,
}

impl Default for JoberMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Registry of available jober and filter types
pub struct JoberRegistry {
    jobers: HashMap<String, Arc<dyn JoberFactory>>,
    filters: HashMap<String, Arc<dyn FilterFactory>>,
}

impl JoberRegistry {
    pub fn new() -> Self {
        Self {
            jobers: HashMap::new(),
            filters: HashMap::new(),
        }
    }

    /// Register a jober factory
    pub fn register(&mut self, factory: Arc<dyn JoberFactory>) {
        let jober_type = factory.jober_type().to_string();
        tracing::info!("Registering jober type: {}", jober_type);
        self.jobers.insert(jober_type, factory);
    }

    /// Register a filter factory
    pub fn register_filter(&mut self, factory: Arc<dyn FilterFactory>) {
        let filter_type = factory.filter_type().to_string();
        tracing::info!("Registering filter type: {}", filter_type);
        self.filters.insert(filter_type, factory);
    }

    /// Create a jober instance from a node's jober spec
    pub fn create_jober(&self, spec: &JoberSpec) -> Result<Arc<dyn Jober>, DefinitionError> {
        let factory = self
            .jobers
            .get(&spec.jober_type)
            .ok_or_else(|| DefinitionError::UnknownJoberType(spec.jober_type.clone()))?;

        factory
            .create(spec)
            .map_err(|e| DefinitionError::Invalid(format!("Failed to create jober: {}", e)))
    }

    /// Create a filter instance from a node's filter spec
    pub fn create_filter(
        &self,
        spec: &FilterSpec,
    ) -> Result<Arc<dyn FlowFilter<FlowData>>, DefinitionError> {
        let factory = self
            .filters
            .get(&spec.filter_type)
            .ok_or_else(|| DefinitionError::UnknownFilterType(spec.filter_type.clone()))?;

        factory
            .create(spec)
            .map_err(|e| DefinitionError::Invalid(format!("Failed to create filter: {}", e)))
    }

    /// Get all registered jober types
    pub fn list_jober_types(&self) -> Vec<String> {
        self.jobers.keys().cloned().collect()
    }

    /// Get metadata for a jober type
    pub fn get_metadata(&self, jober_type: &str) -> Option<JoberMetadata> {
        self.jobers.get(jober_type).map(|f| f.metadata())
    }
}

impl Default for JoberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
