use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use gitlink_db::KvStore;
use gitlink_gateway::EventHub;
use gitlink_types::events::ClientEvent;

/// What the command dispatcher needs from the messaging platform besides
/// key-value storage.
#[async_trait]
pub trait Host: Send + Sync {
    /// Remove the platform-side marker that says a user has a linked account.
    async fn clear_account_marker(&self, user_id: &str) -> Result<()>;

    /// Push an event to one user's client surface. Delivery is best effort.
    async fn publish(&self, user_id: &str, event: ClientEvent);
}

pub fn account_marker_key(user_id: &str) -> String {
    format!("{}_gitlab_user", user_id)
}

/// `Host` backed by the event socket hub and the shared key-value store.
/// The account marker is the `{user_id}_gitlab_user` entry the link flow writes.
#[derive(Clone)]
pub struct GatewayHost {
    hub: EventHub,
    store: Arc<dyn KvStore>,
}

impl GatewayHost {
    pub fn new(hub: EventHub, store: Arc<dyn KvStore>) -> Self {
        Self { hub, store }
    }
}

#[async_trait]
impl Host for GatewayHost {
    async fn clear_account_marker(&self, user_id: &str) -> Result<()> {
        let store = self.store.clone();
        let key = account_marker_key(user_id);
        tokio::task::spawn_blocking(move || store.delete(&key)).await?
    }

    async fn publish(&self, user_id: &str, event: ClientEvent) {
        self.hub.publish(user_id, event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitlink_db::MemoryStore;

    #[tokio::test]
    async fn clears_marker_and_publishes_to_hub() {
        let store = Arc::new(MemoryStore::new());
        store.set("user-1_gitlab_user", b"alice").unwrap();
        let hub = EventHub::new();
        let (_, mut rx) = hub.register("user-1").await;
        let host = GatewayHost::new(hub, store.clone());

        host.clear_account_marker("user-1").await.unwrap();
        host.publish("user-1", ClientEvent::Disconnect).await;

        assert!(!store.contains("user-1_gitlab_user"));
        assert_eq!(rx.recv().await, Some(ClientEvent::Disconnect));
    }
}
