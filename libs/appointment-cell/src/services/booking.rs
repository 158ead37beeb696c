// libs/appointment-cell/src/services/booking.rs
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use cache_cell::CacheInvalidator;
use notification_cell::templates::keys;
use notification_cell::{NotificationChannel, NotificationDispatcher, Recipient};
use schedule_cell::AvailabilityValidator;
use shared_config::AppConfig;
use shared_database::{complete, SchedulingStore, SchedulingTransaction};
use shared_models::{
    Actor, Appointment, AppointmentLog, AppointmentStatus, EntityKind, Role, SchedulingError, SchedulingResult,
};
use shared_utils::Clock;

use crate::models::{CreateAppointmentRequest, RescheduleRequest, TransitionOutcome};
use crate::services::side_effects::{appointment_context, counterparty, format_instant, SideEffects};
use crate::services::workflow::AppointmentWorkflow;

/// Appointment orchestrator. Each command validates and writes inside one
/// transaction; notifications and cache invalidation follow the commit and
/// never undo it.
pub struct AppointmentService {
    store: Arc<dyn SchedulingStore>,
    clock: Arc<dyn Clock>,
    validator: AvailabilityValidator,
    workflow: AppointmentWorkflow,
    effects: SideEffects,
    conflict_retry_attempts: u32,
}

impl AppointmentService {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationDispatcher>,
        cache: Arc<dyn CacheInvalidator>,
        config: &AppConfig,
    ) -> Self {
        let channel = config
            .notifications
            .default_channel
            .parse::<NotificationChannel>()
            .unwrap_or_else(|e| {
                warn!("{}, notifications fall back to email", e);
                NotificationChannel::Email
            });

        Self {
            store,
            clock,
            validator: AvailabilityValidator::new(config.scheduling.clone()),
            workflow: AppointmentWorkflow::new(),
            effects: SideEffects::new(notifier, cache, channel),
            conflict_retry_attempts: config.scheduling.conflict_retry_attempts,
        }
    }

    pub fn workflow(&self) -> &AppointmentWorkflow {
        &self.workflow
    }

    // ==============================================================================
    // COMMANDS
    // ==============================================================================

    #[instrument(skip(self, actor, request), fields(role = %actor.role, practitioner_id = %request.practitioner_id))]
    pub async fn create_appointment(
        &self,
        actor: &Actor,
        request: CreateAppointmentRequest,
    ) -> SchedulingResult<Appointment> {
        ensure_can_book_for(actor, request.patient_id)?;

        let appointment = self
            .retry_on_conflict("create_appointment", || self.try_create(actor, &request))
            .await?;

        info!(
            "Appointment {} booked with practitioner {} at {}",
            appointment.id, appointment.practitioner_id, appointment.scheduled_at
        );

        let context = appointment_context(&appointment);
        self.effects
            .notify(vec![
                self.effects.request(
                    Recipient::patient(appointment.patient_id),
                    keys::APPOINTMENT_CREATED,
                    context.clone(),
                ),
                self.effects.request(
                    Recipient::practitioner(appointment.practitioner_id),
                    keys::APPOINTMENT_CREATED,
                    context,
                ),
            ])
            .await;
        self.effects.invalidate(&appointment).await;

        Ok(appointment)
    }

    pub async fn confirm(&self, actor: &Actor, appointment_id: Uuid) -> SchedulingResult<TransitionOutcome> {
        self.transition(actor, appointment_id, AppointmentStatus::Confirmed, None)
            .await
    }

    pub async fn complete(&self, actor: &Actor, appointment_id: Uuid) -> SchedulingResult<TransitionOutcome> {
        self.transition(actor, appointment_id, AppointmentStatus::Completed, None)
            .await
    }

    /// Staff must say why; the owning patient may cancel without a reason.
    pub async fn cancel(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        reason: Option<String>,
    ) -> SchedulingResult<TransitionOutcome> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        self.transition(actor, appointment_id, AppointmentStatus::Cancelled, reason)
            .await
    }

    pub async fn mark_no_show(&self, actor: &Actor, appointment_id: Uuid) -> SchedulingResult<TransitionOutcome> {
        self.transition(actor, appointment_id, AppointmentStatus::NoShow, None)
            .await
    }

    #[instrument(skip(self, actor, request), fields(role = %actor.role))]
    pub async fn reschedule(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        request: RescheduleRequest,
    ) -> SchedulingResult<Appointment> {
        let (before, after) = self
            .retry_on_conflict("reschedule", || self.try_reschedule(actor, appointment_id, &request))
            .await?;

        info!(
            "Appointment {} moved from {} to {}",
            after.id, before.scheduled_at, after.scheduled_at
        );

        let recipient = counterparty(actor, &after);
        let mut released = appointment_context(&before);
        released.insert("previous_scheduled_at".into(), format_instant(before.scheduled_at));
        let mut booked = appointment_context(&after);
        booked.insert("previous_scheduled_at".into(), format_instant(before.scheduled_at));

        self.effects
            .notify(vec![
                self.effects
                    .request(recipient, keys::APPOINTMENT_RESCHEDULED_FROM, released),
                self.effects
                    .request(recipient, keys::APPOINTMENT_RESCHEDULED_TO, booked),
            ])
            .await;
        self.effects.invalidate(&after).await;

        Ok(after)
    }

    /// Soft-deletes an appointment. Its audit trail stays.
    #[instrument(skip(self, actor), fields(role = %actor.role))]
    pub async fn archive(&self, actor: &Actor, appointment_id: Uuid) -> SchedulingResult<Appointment> {
        if !actor.is_admin() {
            return Err(SchedulingError::NotAuthorized(
                "only administrators may archive appointments".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = archive_in(tx.as_mut(), appointment_id, now).await;
        let archived = complete(tx, result).await?;

        info!("Appointment {} archived", archived.id);
        self.effects.invalidate(&archived).await;
        Ok(archived)
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get_appointment(&self, actor: &Actor, appointment_id: Uuid) -> SchedulingResult<Appointment> {
        let mut tx = self.store.begin().await?;
        let result = load_owned(tx.as_mut(), actor, appointment_id).await;
        complete(tx, result).await
    }

    /// Audit rows in the order they were written.
    pub async fn appointment_history(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
    ) -> SchedulingResult<Vec<AppointmentLog>> {
        let mut tx = self.store.begin().await?;
        let result = history_in(tx.as_mut(), actor, appointment_id).await;
        complete(tx, result).await
    }

    pub async fn list_for_patient(&self, actor: &Actor, patient_id: Uuid) -> SchedulingResult<Vec<Appointment>> {
        let allowed = match actor.role {
            Role::Admin => true,
            Role::Patient => actor.patient_id == Some(patient_id),
            Role::Practitioner => false,
        };
        if !allowed {
            return Err(SchedulingError::NotAuthorized(format!(
                "{} cannot list appointments of patient {}",
                actor.role, patient_id
            )));
        }

        let mut tx = self.store.begin().await?;
        let result = tx
            .appointments_for_patient(patient_id)
            .await
            .map_err(SchedulingError::from);
        complete(tx, result).await
    }

    pub async fn list_for_practitioner(
        &self,
        actor: &Actor,
        practitioner_id: Uuid,
    ) -> SchedulingResult<Vec<Appointment>> {
        if !actor.can_manage_practitioner(practitioner_id) {
            return Err(SchedulingError::NotAuthorized(format!(
                "{} cannot list appointments of practitioner {}",
                actor.role, practitioner_id
            )));
        }

        let mut tx = self.store.begin().await?;
        let result = tx
            .appointments_for_practitioner(practitioner_id)
            .await
            .map_err(SchedulingError::from);
        complete(tx, result).await
    }

    // ==============================================================================
    // TRANSITIONS
    // ==============================================================================

    #[instrument(skip(self, actor, reason), fields(role = %actor.role))]
    async fn transition(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        target: AppointmentStatus,
        reason: Option<String>,
    ) -> SchedulingResult<TransitionOutcome> {
        let outcome = self
            .retry_on_conflict("transition", || {
                self.try_transition(actor, appointment_id, target, reason.clone())
            })
            .await?;

        if !outcome.changed {
            debug!("Appointment {} already {}, nothing to do", appointment_id, target);
            return Ok(outcome);
        }

        let appointment = &outcome.appointment;
        info!("Appointment {} is now {}", appointment.id, appointment.status);

        let template_key = match target {
            AppointmentStatus::Confirmed => keys::APPOINTMENT_CONFIRMED,
            AppointmentStatus::Completed => keys::APPOINTMENT_COMPLETED,
            AppointmentStatus::Cancelled => keys::APPOINTMENT_CANCELLED,
            AppointmentStatus::NoShow => keys::APPOINTMENT_NO_SHOW,
            AppointmentStatus::Pending => keys::APPOINTMENT_CREATED,
        };
        let mut context = appointment_context(appointment);
        if let Some(reason) = &appointment.cancellation_reason {
            context.insert("reason".into(), reason.clone());
        } else if target == AppointmentStatus::Cancelled {
            context.insert("reason".into(), "cancelled by the patient".into());
        }

        self.effects
            .notify(vec![self.effects.request(
                counterparty(actor, appointment),
                template_key,
                context,
            )])
            .await;
        self.effects.invalidate(appointment).await;

        Ok(outcome)
    }

    async fn try_transition(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        target: AppointmentStatus,
        reason: Option<String>,
    ) -> SchedulingResult<TransitionOutcome> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = self
            .transition_in(tx.as_mut(), actor, appointment_id, target, reason, now)
            .await;
        complete(tx, result).await
    }

    async fn transition_in(
        &self,
        tx: &mut dyn SchedulingTransaction,
        actor: &Actor,
        appointment_id: Uuid,
        target: AppointmentStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> SchedulingResult<TransitionOutcome> {
        let mut appointment = load_owned(tx, actor, appointment_id).await?;
        let current = appointment.status;

        if current == target {
            return Ok(TransitionOutcome {
                appointment,
                changed: false,
            });
        }

        self.workflow.validate_transition(current, target, actor.role)?;

        if target == AppointmentStatus::Cancelled && actor.role != Role::Patient && reason.is_none() {
            return Err(SchedulingError::invalid_input(
                "reason",
                "a cancellation reason is required",
            ));
        }

        appointment.status = target;
        appointment.updated_at = now;
        match target {
            AppointmentStatus::Confirmed => appointment.confirmed_at = Some(now),
            AppointmentStatus::Completed => appointment.completed_at = Some(now),
            AppointmentStatus::Cancelled => {
                appointment.cancelled_at = Some(now);
                appointment.cancellation_reason = reason.clone();
            }
            AppointmentStatus::NoShow | AppointmentStatus::Pending => {}
        }

        tx.update_appointment(appointment.clone()).await?;
        tx.append_log(AppointmentLog::status_change(
            appointment.id,
            current,
            target,
            actor.user_id,
            reason,
            now,
        ))
        .await?;

        Ok(TransitionOutcome {
            appointment,
            changed: true,
        })
    }

    // ==============================================================================
    // TRANSACTION BODIES
    // ==============================================================================

    async fn try_create(&self, actor: &Actor, request: &CreateAppointmentRequest) -> SchedulingResult<Appointment> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = self.create_in(tx.as_mut(), actor, request, now).await;
        complete(tx, result).await
    }

    async fn create_in(
        &self,
        tx: &mut dyn SchedulingTransaction,
        actor: &Actor,
        request: &CreateAppointmentRequest,
        now: DateTime<Utc>,
    ) -> SchedulingResult<Appointment> {
        if let Some(price) = request.price {
            if !price.is_finite() || price < 0.0 {
                return Err(SchedulingError::invalid_input("price", "price must be a non-negative amount"));
            }
        }

        self.validator
            .ensure_bookable(
                tx,
                request.practitioner_id,
                request.scheduled_at,
                request.duration_minutes,
                None,
                now,
            )
            .await?;
        ensure_patient_free(
            tx,
            request.patient_id,
            request.scheduled_at,
            request.duration_minutes,
            None,
        )
        .await?;

        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            practitioner_id: request.practitioner_id,
            scheduled_at: request.scheduled_at,
            duration_minutes: request.duration_minutes,
            status: AppointmentStatus::Pending,
            appointment_type: request.appointment_type,
            price: request.price,
            notes: request.notes.clone(),
            created_by: actor.user_id,
            confirmed_at: None,
            cancelled_at: None,
            completed_at: None,
            reminder_sent_at: None,
            cancellation_reason: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };

        tx.insert_appointment(appointment.clone()).await?;
        tx.append_log(AppointmentLog::created(&appointment, actor.user_id, now))
            .await?;

        Ok(appointment)
    }

    async fn try_reschedule(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        request: &RescheduleRequest,
    ) -> SchedulingResult<(Appointment, Appointment)> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = self
            .reschedule_in(tx.as_mut(), actor, appointment_id, request, now)
            .await;
        complete(tx, result).await
    }

    async fn reschedule_in(
        &self,
        tx: &mut dyn SchedulingTransaction,
        actor: &Actor,
        appointment_id: Uuid,
        request: &RescheduleRequest,
        now: DateTime<Utc>,
    ) -> SchedulingResult<(Appointment, Appointment)> {
        let before = load_owned(tx, actor, appointment_id).await?;

        if self.workflow.is_final(before.status) {
            warn!("Cannot reschedule appointment {} in status {}", before.id, before.status);
            return Err(SchedulingError::IllegalTransition {
                from: before.status,
                to: AppointmentStatus::Pending,
                role: actor.role,
            });
        }

        let duration_minutes = request.new_duration_minutes.unwrap_or(before.duration_minutes);
        self.validator
            .ensure_bookable(
                tx,
                before.practitioner_id,
                request.new_scheduled_at,
                duration_minutes,
                Some(before.id),
                now,
            )
            .await?;
        ensure_patient_free(
            tx,
            before.patient_id,
            request.new_scheduled_at,
            duration_minutes,
            Some(before.id),
        )
        .await?;

        let mut after = before.clone();
        after.scheduled_at = request.new_scheduled_at;
        after.duration_minutes = duration_minutes;
        after.reminder_sent_at = None;
        after.updated_at = now;
        if after.status == AppointmentStatus::Confirmed {
            after.status = AppointmentStatus::Pending;
            after.confirmed_at = None;
        }

        tx.update_appointment(after.clone()).await?;
        tx.append_log(AppointmentLog::rescheduled(&before, &after, actor.user_id, now))
            .await?;

        Ok((before, after))
    }

    /// Runs `attempt` again with fresh reads when it loses a write race, up to
    /// the configured number of retries.
    async fn retry_on_conflict<T, F, Fut>(&self, operation: &str, mut attempt: F) -> SchedulingResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SchedulingResult<T>>,
    {
        let mut retries_left = self.conflict_retry_attempts;
        loop {
            match attempt().await {
                Err(err) if err.is_retryable() && retries_left > 0 => {
                    retries_left -= 1;
                    warn!("{} lost a write race, retrying: {}", operation, err);
                }
                other => return other,
            }
        }
    }
}

fn ensure_can_book_for(actor: &Actor, patient_id: Uuid) -> SchedulingResult<()> {
    let allowed = match actor.role {
        Role::Admin => true,
        Role::Patient => actor.patient_id == Some(patient_id),
        Role::Practitioner => false,
    };
    if allowed {
        return Ok(());
    }

    warn!("{} {} may not book for patient {}", actor.role, actor.user_id, patient_id);
    Err(SchedulingError::NotAuthorized(format!(
        "{} cannot book appointments for patient {}",
        actor.role, patient_id
    )))
}

async fn load_owned(
    tx: &mut dyn SchedulingTransaction,
    actor: &Actor,
    appointment_id: Uuid,
) -> SchedulingResult<Appointment> {
    let appointment = tx
        .find_appointment(appointment_id)
        .await?
        .ok_or_else(|| SchedulingError::not_found(EntityKind::Appointment, appointment_id))?;

    if !actor.owns_appointment(&appointment) {
        warn!("{} {} does not own appointment {}", actor.role, actor.user_id, appointment_id);
        return Err(SchedulingError::NotAuthorized(format!(
            "{} cannot act on appointment {}",
            actor.role, appointment_id
        )));
    }
    Ok(appointment)
}

async fn history_in(
    tx: &mut dyn SchedulingTransaction,
    actor: &Actor,
    appointment_id: Uuid,
) -> SchedulingResult<Vec<AppointmentLog>> {
    load_owned(tx, actor, appointment_id).await?;
    Ok(tx.logs_for(appointment_id).await?)
}

/// A patient cannot hold two active appointments that overlap in time.
async fn ensure_patient_free(
    tx: &mut dyn SchedulingTransaction,
    patient_id: Uuid,
    start: DateTime<Utc>,
    duration_minutes: i32,
    exclude_appointment_id: Option<Uuid>,
) -> SchedulingResult<()> {
    let end = start + Duration::minutes(duration_minutes as i64);
    let booked = tx.appointments_for_patient(patient_id).await?;

    match booked
        .iter()
        .filter(|apt| apt.is_active() && Some(apt.id) != exclude_appointment_id)
        .find(|apt| apt.overlaps(start, end))
    {
        Some(existing) => {
            warn!("Patient {} already booked at {} ({})", patient_id, existing.scheduled_at, existing.id);
            Err(SchedulingError::SlotTaken {
                conflicting_appointment_id: existing.id,
                scheduled_at: existing.scheduled_at,
            })
        }
        None => Ok(()),
    }
}

async fn archive_in(
    tx: &mut dyn SchedulingTransaction,
    appointment_id: Uuid,
    now: DateTime<Utc>,
) -> SchedulingResult<Appointment> {
    let mut appointment = tx
        .find_appointment(appointment_id)
        .await?
        .ok_or_else(|| SchedulingError::not_found(EntityKind::Appointment, appointment_id))?;

    appointment.deleted_at = Some(now);
    appointment.updated_at = now;
    tx.update_appointment(appointment.clone()).await?;
    Ok(appointment)
}
