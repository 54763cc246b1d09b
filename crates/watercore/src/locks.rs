use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock name guarding the context state of one node in one stream.
pub fn node_lock_name(stream_id: &str, meta_id: &str) -> String {
    format!("waterflow-{}-{}", stream_id, meta_id)
}

/// Named advisory locks serializing context mutation per (stream, node).
///
/// The guard releases on drop. The primitive behind a name is left to the
/// implementation; a distributed deployment can back this with a lease-based
/// lock as long as per-(stream, node) granularity holds.
#[async_trait]
pub trait FlowLocks: Send + Sync {
    async fn acquire(&self, name: &str) -> OwnedMutexGuard<()>;
}

/// In-process named locks over a lazily grown mutex map.
pub struct LocalFlowLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LocalFlowLocks {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for LocalFlowLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlowLocks for LocalFlowLocks {
    async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
