use crate::context::FlowContext;
use crate::definition::{CallbackSpec, FlowNode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// Out-of-band notification carrying the contexts an end node finished.
#[derive(Debug, Clone)]
pub struct CallbackNotice<T> {
    pub stream_id: String,
    pub node_id: String,
    pub callback: Option<CallbackSpec>,
    pub contexts: Vec<FlowContext<T>>,
    pub sent_at: DateTime<Utc>,
}

/// Delivers "contexts finished" notifications to callback consumers,
/// decoupled from the main data path.
#[async_trait]
pub trait FlowContextMessenger<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    async fn send_callback(&self, stream_id: &str, node: &FlowNode, contexts: Vec<FlowContext<T>>);
}

/// In-process messenger over a broadcast channel. Sends are fire-and-forget;
/// a notice with no live receiver is dropped.
pub struct ChannelMessenger<T> {
    sender: broadcast::Sender<CallbackNotice<T>>,
}

impl<T: Clone + Send + Sync + 'static> ChannelMessenger<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallbackNotice<T>> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> FlowContextMessenger<T> for ChannelMessenger<T> {
    async fn send_callback(&self, stream_id: &str, node: &FlowNode, contexts: Vec<FlowContext<T>>) {
        tracing::debug!(
            stream = stream_id,
            node = %node.meta_id,
            count = contexts.len(),
            "sending completion callback"
        );
        let _ = self.sender.send(CallbackNotice {
            stream_id: stream_id.to_string(),
            node_id: node.meta_id.clone(),
            callback: node.callback.clone(),
            contexts,
            sent_at: Utc::now(),
        });
    }
}
