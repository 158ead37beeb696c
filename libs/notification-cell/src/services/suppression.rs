use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::NotificationChannel;

/// Recipients who opted out of a channel.
#[derive(Debug, Clone, Default)]
pub struct SuppressionList {
    entries: Arc<RwLock<HashSet<(Uuid, NotificationChannel)>>>,
}

impl SuppressionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn suppress(&self, recipient_id: Uuid, channel: NotificationChannel) {
        self.entries.write().await.insert((recipient_id, channel));
    }

    pub async fn lift(&self, recipient_id: Uuid, channel: NotificationChannel) {
        self.entries.write().await.remove(&(recipient_id, channel));
    }

    pub async fn is_suppressed(&self, recipient_id: Uuid, channel: NotificationChannel) -> bool {
        self.entries.read().await.contains(&(recipient_id, channel))
    }
}
