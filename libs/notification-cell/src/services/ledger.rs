use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{DeliveryRecord, DeliveryStatus, NotificationRequest};

/// Attempt counts and final status per notification.
#[derive(Debug, Clone, Default)]
pub struct DeliveryLedger {
    records: Arc<RwLock<HashMap<Uuid, DeliveryRecord>>>,
}

impl DeliveryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(&self, notification_id: Uuid, request: &NotificationRequest) {
        let record = DeliveryRecord {
            notification_id,
            recipient: request.recipient,
            template_key: request.template_key.clone(),
            channel: request.channel,
            attempts: 0,
            status: DeliveryStatus::Queued,
            last_error: None,
            updated_at: Utc::now(),
        };
        self.records.write().await.insert(notification_id, record);
    }

    /// Bumps the attempt counter and returns the new count.
    pub async fn record_attempt(&self, notification_id: Uuid) -> u32 {
        let mut records = self.records.write().await;
        match records.get_mut(&notification_id) {
            Some(record) => {
                record.attempts += 1;
                record.updated_at = Utc::now();
                record.attempts
            }
            None => 0,
        }
    }

    pub async fn record_error(&self, notification_id: Uuid, error: impl Into<String>) {
        if let Some(record) = self.records.write().await.get_mut(&notification_id) {
            record.last_error = Some(error.into());
            record.updated_at = Utc::now();
        }
    }

    pub async fn finish(&self, notification_id: Uuid, status: DeliveryStatus) {
        if let Some(record) = self.records.write().await.get_mut(&notification_id) {
            record.status = status;
            record.updated_at = Utc::now();
        }
    }

    pub async fn get(&self, notification_id: Uuid) -> Option<DeliveryRecord> {
        self.records.read().await.get(&notification_id).cloned()
    }

    pub async fn records(&self) -> Vec<DeliveryRecord> {
        let mut records: Vec<DeliveryRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.updated_at);
        records
    }

    /// Drops sent, suppressed and failed records last touched before
    /// `older_than`. Queued records are kept whatever their age.
    pub async fn prune_finished(&self, older_than: DateTime<Utc>) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.status == DeliveryStatus::Queued || record.updated_at >= older_than);
        before - records.len()
    }
}
