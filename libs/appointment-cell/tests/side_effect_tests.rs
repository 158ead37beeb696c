mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use mockall::mock;
use mockall::predicate::eq;
use uuid::Uuid;

use appointment_cell::RescheduleRequest;
use cache_cell::{CacheError, CacheInvalidator};
use common::{harness, harness_with_cache, monday};
use notification_cell::templates::keys;
use notification_cell::{DeliveryStatus, RecipientKind};
use shared_models::{AppointmentStatus, SchedulingError};
use shared_utils::test_utils::{at, TestActors};

mock! {
    pub Cache {}

    #[async_trait]
    impl CacheInvalidator for Cache {
        async fn invalidate_appointment_cache(
            &self,
            patient_id: Option<Uuid>,
            practitioner_id: Option<Uuid>,
        ) -> Result<(), CacheError>;
    }
}

#[tokio::test]
async fn booking_notifies_both_parties() {
    let h = harness().await;
    let appointment = h.book("08:00", 30).await;

    let messages = h.outbox.messages().await;
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.template_key == keys::APPOINTMENT_CREATED));
    assert!(messages
        .iter()
        .any(|m| m.recipient.kind == RecipientKind::Patient && m.recipient.id == appointment.patient_id));
    assert!(messages.iter().any(|m| m.recipient.kind == RecipientKind::Practitioner
        && m.recipient.id == appointment.practitioner_id));
    assert!(messages.iter().all(|m| m.body.contains("2025-12-01 08:00 UTC")));

    let ledger = h.outbox.ledger().records().await;
    assert_eq!(ledger.len(), 2);
    assert!(ledger.iter().all(|r| r.status == DeliveryStatus::Sent));
}

#[tokio::test]
async fn transitions_notify_the_other_party_once() {
    let h = harness().await;
    let appointment = h.book("08:00", 30).await;
    h.outbox.clear().await;

    h.service.confirm(&h.actors.practitioner, appointment.id).await.unwrap();
    h.service.confirm(&h.actors.practitioner, appointment.id).await.unwrap();

    let messages = h.outbox.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].template_key, keys::APPOINTMENT_CONFIRMED);
    assert_eq!(messages[0].recipient.id, appointment.patient_id);
}

#[tokio::test]
async fn staff_cancellation_reason_reaches_the_patient() {
    let h = harness().await;
    let appointment = h.book("08:00", 30).await;
    h.outbox.clear().await;

    h.service
        .cancel(&h.actors.admin, appointment.id, Some("Clinic closed".into()))
        .await
        .unwrap();

    let to_patient = h.outbox.messages_for(appointment.patient_id).await;
    assert_eq!(to_patient.len(), 1);
    assert_eq!(to_patient[0].template_key, keys::APPOINTMENT_CANCELLED);
    assert!(to_patient[0].body.contains("Reason: Clinic closed"));
    assert!(h.outbox.messages_for(appointment.practitioner_id).await.is_empty());
}

#[tokio::test]
async fn patient_reschedule_tells_the_practitioner_both_halves() {
    let h = harness().await;
    let appointment = h.book("08:00", 30).await;
    h.outbox.clear().await;

    h.service
        .reschedule(&h.actors.patient, appointment.id, RescheduleRequest::to(at(monday(), "10:30")))
        .await
        .unwrap();

    let messages = h.outbox.messages_for(appointment.practitioner_id).await;
    let keys_sent: Vec<&str> = messages.iter().map(|m| m.template_key.as_str()).collect();
    assert_eq!(keys_sent.len(), 2);
    assert!(keys_sent.contains(&keys::APPOINTMENT_RESCHEDULED_FROM));
    assert!(keys_sent.contains(&keys::APPOINTMENT_RESCHEDULED_TO));
    assert!(h.outbox.messages_for(appointment.patient_id).await.is_empty());
}

#[tokio::test]
async fn failed_operations_send_nothing() {
    let h = harness().await;
    let appointment = h.book("08:00", 30).await;
    h.outbox.clear().await;

    let other = h.actors.stranger_patient();
    let _ = h
        .service
        .create_appointment(&other, h.request_for(&other, "08:00", 30))
        .await;
    let _ = h.service.mark_no_show(&h.actors.admin, appointment.id).await;

    assert!(h.outbox.messages().await.is_empty());
}

#[tokio::test]
async fn cache_is_invalidated_once_per_real_mutation() {
    let actors = TestActors::new();
    let mut cache = MockCache::new();
    cache
        .expect_invalidate_appointment_cache()
        .with(eq(Some(actors.patient_id)), eq(Some(actors.practitioner_id)))
        .times(2)
        .returning(|_, _| Ok(()));

    let h = harness_with_cache(Arc::new(cache)).await;
    // The harness builds its own fixture actors; only the ids above matter.
    let patient = shared_models::Actor::patient(Uuid::new_v4(), actors.patient_id);
    let practitioner = shared_models::Actor::practitioner(Uuid::new_v4(), actors.practitioner_id);
    h.store
        .seed_schedules(vec![shared_utils::test_utils::schedule(
            actors.practitioner_id,
            1,
            "08:00",
            "12:00",
            30,
        )])
        .await;

    let request = appointment_cell::CreateAppointmentRequest::new(
        actors.patient_id,
        actors.practitioner_id,
        at(monday(), "08:00"),
        30,
    );
    let appointment = h.service.create_appointment(&patient, request).await.unwrap();
    h.service.confirm(&practitioner, appointment.id).await.unwrap();
    h.service.confirm(&practitioner, appointment.id).await.unwrap();
}

#[tokio::test]
async fn cache_failures_do_not_fail_the_operation() {
    let mut cache = MockCache::new();
    cache
        .expect_invalidate_appointment_cache()
        .returning(|_, _| Err(CacheError::Pool("connection refused".to_string())));

    let h = harness_with_cache(Arc::new(cache)).await;
    let appointment = h.book("08:00", 30).await;
    let outcome = h.service.cancel(&h.actors.patient, appointment.id, None).await.unwrap();

    assert_eq!(outcome.appointment.status, AppointmentStatus::Cancelled);
    assert_eq!(
        h.store.all_appointments().await[0].status,
        AppointmentStatus::Cancelled
    );
}

#[tokio::test]
async fn a_lost_write_race_is_retried_once() {
    let h = harness().await;
    h.store.fail_next_commits(1);

    let appointment = h.book("09:00", 30).await;

    let stored = h.store.all_appointments().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, appointment.id);
    assert_eq!(h.store.all_logs().await.len(), 1);
    assert_eq!(h.outbox.messages().await.len(), 2);
}

#[tokio::test]
async fn repeated_write_races_surface_as_conflict() {
    let h = harness().await;
    h.store.fail_next_commits(2);

    let result = h
        .service
        .create_appointment(&h.actors.patient, h.request_for(&h.actors.patient, "09:00", 30))
        .await;

    assert_matches!(result, Err(SchedulingError::Conflict(_)));
    assert!(h.store.all_appointments().await.is_empty());
    assert!(h.store.all_logs().await.is_empty());
    assert!(h.outbox.messages().await.is_empty());
}
