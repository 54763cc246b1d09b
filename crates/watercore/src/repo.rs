use crate::context::{FlowContext, FlowContextStatus};
use crate::error::NodeError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Durable store for in-flight execution contexts, keyed by stream and node.
///
/// The engine only writes through this trait; it never assumes a schema. A
/// production deployment plugs a database-backed implementation in here.
#[async_trait]
pub trait FlowContextRepo<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    /// Insert or update the given contexts.
    async fn save(&self, contexts: &[FlowContext<T>]) -> Result<(), NodeError>;

    async fn update_status(
        &self,
        ids: &[Uuid],
        status: FlowContextStatus,
    ) -> Result<(), NodeError>;

    async fn find_by_stream(&self, stream_id: &str) -> Result<Vec<FlowContext<T>>, NodeError>;

    async fn find_by_position(
        &self,
        stream_id: &str,
        position: &str,
    ) -> Result<Vec<FlowContext<T>>, NodeError>;

    async fn delete_stream(&self, stream_id: &str) -> Result<(), NodeError>;
}

/// In-process context store.
pub struct MemoryContextRepo<T> {
    contexts: RwLock<HashMap<Uuid, FlowContext<T>>>,
}

impl<T> MemoryContextRepo<T> {
    pub fn new() -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> Default for MemoryContextRepo<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> FlowContextRepo<T> for MemoryContextRepo<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn save(&self, contexts: &[FlowContext<T>]) -> Result<(), NodeError> {
        let mut store = self.contexts.write().await;
        for context in contexts {
            store.insert(context.id, context.clone());
        }
        Ok(())
    }

    async fn update_status(
        &self,
        ids: &[Uuid],
        status: FlowContextStatus,
    ) -> Result<(), NodeError> {
        let mut store = self.contexts.write().await;
        for id in ids {
            if let Some(context) = store.get_mut(id) {
                context.set_status(status);
            }
        }
        Ok(())
    }

    async fn find_by_stream(&self, stream_id: &str) -> Result<Vec<FlowContext<T>>, NodeError> {
        let store = self.contexts.read().await;
        let mut found: Vec<_> = store
            .values()
            .filter(|c| c.stream_id == stream_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn find_by_position(
        &self,
        stream_id: &str,
        position: &str,
    ) -> Result<Vec<FlowContext<T>>, NodeError> {
        let store = self.contexts.read().await;
        let mut found: Vec<_> = store
            .values()
            .filter(|c| c.stream_id == stream_id && c.position == position)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn delete_stream(&self, stream_id: &str) -> Result<(), NodeError> {
        let mut store = self.contexts.write().await;
        store.retain(|_, c| c.stream_id != stream_id);
        Ok(())
    }
}
