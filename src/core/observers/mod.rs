//! Live-observer registry for dispatch outcomes.
//!
//! Subscribers (websocket connections) register under a fresh UUID and
//! receive every outcome published after they joined; there is no replay.
//! Delivery is best-effort per subscriber: a dead receiver is logged and
//! dropped without affecting the others.

use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

pub struct ObserverRegistry {
    subscribers: Mutex<HashMap<Uuid, mpsc::UnboundedSender<serde_json::Value>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub async fn subscribe(&self) -> (Uuid, mpsc::UnboundedReceiver<serde_json::Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.subscribers.lock().await.insert(id, tx);
        (id, rx)
    }

    pub async fn unsubscribe(&self, id: &Uuid) -> bool {
        self.subscribers.lock().await.remove(id).is_some()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    pub async fn publish(&self, message: &serde_json::Value) {
        let mut subscribers = self.subscribers.lock().await;
        let mut dead = Vec::new();
        for (id, tx) in subscribers.iter() {
            if tx.send(message.clone()).is_err() {
                warn!("Failed to deliver dispatch notification to observer {}", id);
                dead.push(*id);
            }
        }
        for id in dead {
            subscribers.remove(&id);
        }
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
