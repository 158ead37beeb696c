use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_config::NotificationSettings;

use crate::error::NotificationError;
use crate::models::{DeliveryStatus, NotificationHandle, NotificationRequest, WebhookPayload};
use crate::services::dispatcher::NotificationDispatcher;
use crate::services::ledger::DeliveryLedger;
use crate::services::suppression::SuppressionList;
use crate::templates::TemplateRenderer;

struct QueuedNotification {
    id: Uuid,
    request: NotificationRequest,
}

/// Queues notifications for a background worker that posts them to the
/// configured webhook, retrying with exponential backoff. Up to
/// `max_in_flight` deliveries run at once, so one failing recipient does not
/// hold up the rest of the queue.
#[derive(Debug)]
pub struct WebhookDispatcher {
    sender: mpsc::UnboundedSender<QueuedNotification>,
    ledger: DeliveryLedger,
    worker: JoinHandle<()>,
}

impl WebhookDispatcher {
    /// Spawns the delivery worker on the current tokio runtime.
    pub fn spawn(
        settings: &NotificationSettings,
        renderer: TemplateRenderer,
        suppression: SuppressionList,
    ) -> Result<Self, NotificationError> {
        let webhook_url = settings
            .webhook_url
            .clone()
            .ok_or(NotificationError::NotConfigured)?;

        let ledger = DeliveryLedger::new();
        let (sender, receiver) = mpsc::unbounded_channel();

        let worker = DeliveryWorker {
            client: reqwest::Client::new(),
            webhook_url,
            max_attempts: settings.max_attempts.max(1),
            backoff: Duration::from_millis(settings.backoff_ms),
            renderer: Arc::new(renderer),
            suppression,
            ledger: ledger.clone(),
            retention: retention(settings.retention_secs),
            max_in_flight: settings.max_in_flight.max(1),
        };

        info!("Starting notification delivery worker for {}", worker.webhook_url);
        let worker = tokio::spawn(worker.run(receiver));

        Ok(Self { sender, ledger, worker })
    }

    pub fn ledger(&self) -> &DeliveryLedger {
        &self.ledger
    }

    /// Stops accepting work and waits until everything already queued has
    /// been delivered or given up on.
    pub async fn shutdown(self) {
        let Self { sender, worker, .. } = self;
        drop(sender);
        if let Err(e) = worker.await {
            error!("Notification delivery worker ended abnormally: {}", e);
        }
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn dispatch(&self, request: NotificationRequest) -> Result<NotificationHandle, NotificationError> {
        let id = Uuid::new_v4();
        self.ledger.open(id, &request).await;

        self.sender
            .send(QueuedNotification { id, request })
            .map_err(|_| NotificationError::QueueClosed)?;

        debug!("Queued notification {}", id);
        Ok(NotificationHandle {
            id,
            status: DeliveryStatus::Queued,
        })
    }
}

struct DeliveryWorker {
    client: reqwest::Client,
    webhook_url: String,
    max_attempts: u32,
    backoff: Duration,
    renderer: Arc<TemplateRenderer>,
    suppression: SuppressionList,
    ledger: DeliveryLedger,
    retention: chrono::Duration,
    max_in_flight: usize,
}

// Ten years, well inside what chrono can represent.
const MAX_RETENTION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn retention(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_RETENTION_SECS) as i64)
}

impl DeliveryWorker {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<QueuedNotification>) {
        let worker = Arc::new(self);
        let permits = Arc::new(Semaphore::new(worker.max_in_flight));
        let mut in_flight = JoinSet::new();

        while let Some(job) = receiver.recv().await {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                error!("Delivery permits closed, dropping notification {}", job.id);
                break;
            };
            let delivery = worker.clone();
            in_flight.spawn(async move {
                delivery.deliver(job).await;
                drop(permit);
            });

            while let Some(finished) = in_flight.try_join_next() {
                report_join(finished);
            }
            worker.prune_ledger().await;
        }

        while let Some(finished) = in_flight.join_next().await {
            report_join(finished);
        }
        worker.prune_ledger().await;
        debug!("Notification queue drained, worker stopping");
    }

    async fn prune_ledger(&self) {
        let pruned = self.ledger.prune_finished(Utc::now() - self.retention).await;
        if pruned > 0 {
            debug!("Pruned {} finished delivery records", pruned);
        }
    }

    #[instrument(skip(self, job), fields(notification_id = %job.id, template = %job.request.template_key))]
    async fn deliver(&self, job: QueuedNotification) {
        let QueuedNotification { id, request } = job;

        if self
            .suppression
            .is_suppressed(request.recipient.id, request.channel)
            .await
        {
            debug!("Recipient {} opted out of {}", request.recipient.id, request.channel);
            self.ledger.finish(id, DeliveryStatus::Suppressed).await;
            return;
        }

        let body = match self.renderer.render(&request.template_key, &request.context) {
            Ok(body) => body,
            Err(e) => {
                error!("Cannot render notification {}: {}", id, e);
                self.ledger.record_error(id, e.to_string()).await;
                self.ledger.finish(id, DeliveryStatus::Failed).await;
                return;
            }
        };

        let mut payload = WebhookPayload {
            notification_id: id,
            recipient: request.recipient,
            channel: request.channel,
            template_key: request.template_key,
            body,
            context: request.context,
            attempt: 0,
        };

        for attempt in 1..=self.max_attempts {
            payload.attempt = self.ledger.record_attempt(id).await;

            match self.post(&payload).await {
                Ok(()) => {
                    info!("Delivered notification {} on attempt {}", id, attempt);
                    self.ledger.finish(id, DeliveryStatus::Sent).await;
                    return;
                }
                Err(e) => {
                    warn!(
                        "Delivery of notification {} failed (attempt {}/{}): {}",
                        id, attempt, self.max_attempts, e
                    );
                    self.ledger.record_error(id, e.to_string()).await;
                    if attempt < self.max_attempts {
                        sleep(self.backoff * 2u32.saturating_pow(attempt - 1)).await;
                    }
                }
            }
        }

        error!("Giving up on notification {} after {} attempts", id, self.max_attempts);
        self.ledger.finish(id, DeliveryStatus::Failed).await;
    }

    async fn post(&self, payload: &WebhookPayload) -> Result<(), NotificationError> {
        self.client
            .post(&self.webhook_url)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn report_join(finished: Result<(), JoinError>) {
    if let Err(e) = finished {
        error!("Notification delivery task ended abnormally: {}", e);
    }
}
