use async_trait::async_trait;

use crate::error::NotificationError;
use crate::models::{NotificationHandle, NotificationRequest};

/// Accepts a notification and returns without waiting for delivery. Template
/// lookup, suppression and retries are the dispatcher's concern.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, request: NotificationRequest) -> Result<NotificationHandle, NotificationError>;
}
