use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NotificationError;

// ==============================================================================
// ADDRESSING
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Sms,
    InApp,
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationChannel::Email => write!(f, "email"),
            NotificationChannel::Sms => write!(f, "sms"),
            NotificationChannel::InApp => write!(f, "in_app"),
        }
    }
}

impl FromStr for NotificationChannel {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(NotificationChannel::Email),
            "sms" => Ok(NotificationChannel::Sms),
            "in_app" | "inapp" => Ok(NotificationChannel::InApp),
            other => Err(NotificationError::InvalidChannel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
    Patient,
    Practitioner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub id: Uuid,
    pub kind: RecipientKind,
}

impl Recipient {
    pub fn patient(id: Uuid) -> Self {
        Self {
            id,
            kind: RecipientKind::Patient,
        }
    }

    pub fn practitioner(id: Uuid) -> Self {
        Self {
            id,
            kind: RecipientKind::Practitioner,
        }
    }
}

// ==============================================================================
// REQUESTS AND DELIVERY STATE
// ==============================================================================

/// Flat key/value pairs interpolated into `:placeholder` tokens.
pub type NotificationContext = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub recipient: Recipient,
    pub template_key: String,
    pub context: NotificationContext,
    pub channel: NotificationChannel,
}

impl NotificationRequest {
    pub fn new(
        recipient: Recipient,
        template_key: impl Into<String>,
        context: NotificationContext,
        channel: NotificationChannel,
    ) -> Self {
        Self {
            recipient,
            template_key: template_key.into(),
            context,
            channel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Suppressed,
    Failed,
}

/// Returned by a dispatcher as soon as a request is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationHandle {
    pub id: Uuid,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub notification_id: Uuid,
    pub recipient: Recipient,
    pub template_key: String,
    pub channel: NotificationChannel,
    pub attempts: u32,
    pub status: DeliveryStatus,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A rendered message kept by the outbox dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub notification_id: Uuid,
    pub recipient: Recipient,
    pub channel: NotificationChannel,
    pub template_key: String,
    pub body: String,
    pub context: NotificationContext,
}

/// JSON body posted to the delivery webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub notification_id: Uuid,
    pub recipient: Recipient,
    pub channel: NotificationChannel,
    pub template_key: String,
    pub body: String,
    pub context: NotificationContext,
    pub attempt: u32,
}
