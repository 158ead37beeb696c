use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Unknown notification template: {0}")]
    UnknownTemplate(String),

    #[error("Notification webhook is not configured")]
    NotConfigured,

    #[error("Invalid notification channel: {0}")]
    InvalidChannel(String),

    #[error("Notification queue is closed")]
    QueueClosed,

    #[error("Webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
}
