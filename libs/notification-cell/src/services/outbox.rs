use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::NotificationError;
use crate::models::{DeliveryStatus, NotificationHandle, NotificationRequest, OutboxMessage};
use crate::services::dispatcher::NotificationDispatcher;
use crate::services::ledger::DeliveryLedger;
use crate::services::suppression::SuppressionList;
use crate::templates::TemplateRenderer;

/// Renders and keeps every message in memory instead of delivering it. Used
/// in development and as the observable dispatcher in tests.
#[derive(Clone)]
pub struct OutboxDispatcher {
    renderer: Arc<TemplateRenderer>,
    suppression: SuppressionList,
    ledger: DeliveryLedger,
    outbox: Arc<Mutex<Vec<OutboxMessage>>>,
}

impl Default for OutboxDispatcher {
    fn default() -> Self {
        Self::new(TemplateRenderer::with_defaults(), SuppressionList::new())
    }
}

impl OutboxDispatcher {
    pub fn new(renderer: TemplateRenderer, suppression: SuppressionList) -> Self {
        Self {
            renderer: Arc::new(renderer),
            suppression,
            ledger: DeliveryLedger::new(),
            outbox: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn ledger(&self) -> &DeliveryLedger {
        &self.ledger
    }

    pub async fn messages(&self) -> Vec<OutboxMessage> {
        self.outbox.lock().await.clone()
    }

    pub async fn messages_for(&self, recipient_id: Uuid) -> Vec<OutboxMessage> {
        self.outbox
            .lock()
            .await
            .iter()
            .filter(|m| m.recipient.id == recipient_id)
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.outbox.lock().await.clear();
    }
}

#[async_trait]
impl NotificationDispatcher for OutboxDispatcher {
    async fn dispatch(&self, request: NotificationRequest) -> Result<NotificationHandle, NotificationError> {
        let id = Uuid::new_v4();
        self.ledger.open(id, &request).await;

        if self
            .suppression
            .is_suppressed(request.recipient.id, request.channel)
            .await
        {
            debug!("Suppressed {} for {} on {}", request.template_key, request.recipient.id, request.channel);
            self.ledger.finish(id, DeliveryStatus::Suppressed).await;
            return Ok(NotificationHandle {
                id,
                status: DeliveryStatus::Suppressed,
            });
        }

        let body = match self.renderer.render(&request.template_key, &request.context) {
            Ok(body) => body,
            Err(err) => {
                self.ledger.record_error(id, err.to_string()).await;
                self.ledger.finish(id, DeliveryStatus::Failed).await;
                return Err(err);
            }
        };

        self.ledger.record_attempt(id).await;
        self.outbox.lock().await.push(OutboxMessage {
            notification_id: id,
            recipient: request.recipient,
            channel: request.channel,
            template_key: request.template_key,
            body,
            context: request.context,
        });
        self.ledger.finish(id, DeliveryStatus::Sent).await;

        Ok(NotificationHandle {
            id,
            status: DeliveryStatus::Sent,
        })
    }
}
