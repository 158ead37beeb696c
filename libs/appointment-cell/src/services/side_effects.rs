// libs/appointment-cell/src/services/side_effects.rs
//
// Post-commit work. Nothing here can fail the operation that triggered it.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use cache_cell::CacheInvalidator;
use notification_cell::{
    NotificationChannel, NotificationContext, NotificationDispatcher, NotificationRequest, Recipient,
};
use shared_models::{Actor, Appointment, Role};

pub struct SideEffects {
    notifier: Arc<dyn NotificationDispatcher>,
    cache: Arc<dyn CacheInvalidator>,
    channel: NotificationChannel,
}

impl SideEffects {
    pub fn new(
        notifier: Arc<dyn NotificationDispatcher>,
        cache: Arc<dyn CacheInvalidator>,
        channel: NotificationChannel,
    ) -> Self {
        Self {
            notifier,
            cache,
            channel,
        }
    }

    pub fn request(&self, recipient: Recipient, template_key: &str, context: NotificationContext) -> NotificationRequest {
        NotificationRequest::new(recipient, template_key, context, self.channel)
    }

    /// Hands every request to the dispatcher. Rejections are logged and
    /// dropped; delivery retries belong to the dispatcher.
    pub async fn notify(&self, requests: Vec<NotificationRequest>) {
        let dispatches = requests.into_iter().map(|request| {
            let template_key = request.template_key.clone();
            let recipient = request.recipient.id;
            async move {
                match self.notifier.dispatch(request).await {
                    Ok(handle) => debug!(
                        "Dispatched {} to {} as {} ({:?})",
                        template_key, recipient, handle.id, handle.status
                    ),
                    Err(e) => warn!("Failed to dispatch {} to {}: {}", template_key, recipient, e),
                }
            }
        });
        join_all(dispatches).await;
    }

    /// One invalidation covering both parties of the appointment.
    pub async fn invalidate(&self, appointment: &Appointment) {
        if let Err(e) = self
            .cache
            .invalidate_appointment_cache(Some(appointment.patient_id), Some(appointment.practitioner_id))
            .await
        {
            warn!("Cache invalidation for appointment {} failed: {}", appointment.id, e);
        }
    }
}

/// The party that did not act: patients notify the practitioner, staff
/// notify the patient.
pub fn counterparty(actor: &Actor, appointment: &Appointment) -> Recipient {
    match actor.role {
        Role::Patient => Recipient::practitioner(appointment.practitioner_id),
        Role::Practitioner | Role::Admin => Recipient::patient(appointment.patient_id),
    }
}

pub fn appointment_context(appointment: &Appointment) -> NotificationContext {
    let mut context = NotificationContext::new();
    context.insert("appointment_id".into(), appointment.id.to_string());
    context.insert("patient_id".into(), appointment.patient_id.to_string());
    context.insert("practitioner_id".into(), appointment.practitioner_id.to_string());
    context.insert("scheduled_at".into(), format_instant(appointment.scheduled_at));
    context.insert("duration_minutes".into(), appointment.duration_minutes.to_string());
    context.insert("status".into(), appointment.status.to_string());
    context
}

pub fn format_instant(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}
