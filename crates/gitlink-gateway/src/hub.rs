use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use gitlink_types::events::ClientEvent;

/// Routes events to the open sockets of individual platform users.
/// A user may have several sockets open (one per client); each receives
/// every event targeted at that user.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<EventHubInner>,
}

#[derive(Default)]
struct EventHubInner {
    /// user_id -> [(conn_id, sender)]
    user_channels: RwLock<HashMap<String, Vec<(Uuid, mpsc::UnboundedSender<ClientEvent>)>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket for `user_id`. Returns (conn_id, receiver).
    pub async fn register(&self, user_id: &str) -> (Uuid, mpsc::UnboundedReceiver<ClientEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push((conn_id, tx));
        (conn_id, rx)
    }

    /// Drop one socket registration; other sockets of the same user stay.
    pub async fn unregister(&self, user_id: &str, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some(conns) = channels.get_mut(user_id) {
            conns.retain(|(id, _)| *id != conn_id);
            if conns.is_empty() {
                channels.remove(user_id);
            }
        }
    }

    /// Send an event to every open socket of `user_id`.
    /// Returns how many sockets it was handed to; zero is not an error.
    pub async fn publish(&self, user_id: &str, event: ClientEvent) -> usize {
        let channels = self.inner.user_channels.read().await;
        let delivered = channels
            .get(user_id)
            .map(|conns| {
                conns
                    .iter()
                    .filter(|(_, tx)| tx.send(event.clone()).is_ok())
                    .count()
            })
            .unwrap_or(0);

        debug!(user_id = %user_id, event = event.name(), delivered, "Published client event");
        delivered
    }

    pub async fn connection_count(&self, user_id: &str) -> usize {
        self.inner
            .user_channels
            .read()
            .await
            .get(user_id)
            .map_or(0, Vec::len)
    }
}
