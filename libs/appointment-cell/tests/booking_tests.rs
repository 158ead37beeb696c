mod common;

use assert_matches::assert_matches;
use chrono::Duration;

use appointment_cell::{CreateAppointmentRequest, RescheduleRequest};
use common::{harness, monday};
use shared_models::{Actor, AppointmentStatus, EntityKind, LogKind, Role, SchedulingError};
use shared_utils::test_utils::{at, date, full_day_block, schedule};

#[tokio::test]
async fn partially_overlapping_booking_is_slot_taken() {
    let h = harness().await;
    let first = h.book("08:00", 30).await;
    assert_eq!(first.status, AppointmentStatus::Pending);

    let other = h.actors.stranger_patient();
    let result = h
        .service
        .create_appointment(&other, h.request_for(&other, "08:15", 30))
        .await;

    assert_matches!(
        result,
        Err(SchedulingError::SlotTaken { conflicting_appointment_id, .. }) if conflicting_appointment_id == first.id
    );
    assert_eq!(h.store.all_appointments().await.len(), 1);
}

#[tokio::test]
async fn booking_on_a_blocked_day_is_refused() {
    let h = harness().await;
    let block = full_day_block(h.actors.practitioner_id, monday());
    h.store.seed_blocks(vec![block.clone()]).await;

    let result = h
        .service
        .create_appointment(&h.actors.patient, h.request_for(&h.actors.patient, "09:00", 30))
        .await;

    assert_matches!(
        result,
        Err(SchedulingError::BlockedByPractitioner { block_id, blocked_date }) if block_id == block.id && blocked_date == monday()
    );
}

#[tokio::test]
async fn created_appointment_is_logged_as_created() {
    let h = harness().await;
    let appointment = h.book("10:00", 45).await;

    let history = h
        .service
        .appointment_history(&h.actors.patient, appointment.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, LogKind::Created);
    assert_eq!(history[0].old_status, None);
    assert_eq!(history[0].new_status, AppointmentStatus::Pending);
    assert_eq!(history[0].changed_by, h.actors.patient.user_id);
    assert_eq!(appointment.created_by, h.actors.patient.user_id);
}

#[tokio::test]
async fn patient_cancels_own_pending_appointment() {
    let h = harness().await;
    let appointment = h.book("08:00", 30).await;

    let outcome = h
        .service
        .cancel(&h.actors.patient, appointment.id, None)
        .await
        .unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.appointment.status, AppointmentStatus::Cancelled);
    assert_eq!(outcome.appointment.cancelled_at, Some(h.clock_now()));

    let logs = h.store.all_logs().await;
    let change = logs.iter().find(|l| l.kind == LogKind::StatusChange).unwrap();
    assert_eq!(change.old_status, Some(AppointmentStatus::Pending));
    assert_eq!(change.new_status, AppointmentStatus::Cancelled);
    assert_eq!(change.changed_by, h.actors.patient.user_id);
}

#[tokio::test]
async fn no_show_is_only_reachable_from_confirmed() {
    let h = harness().await;
    let appointment = h.book("08:00", 30).await;

    let result = h.service.mark_no_show(&h.actors.admin, appointment.id).await;
    assert_matches!(
        result,
        Err(SchedulingError::IllegalTransition {
            from: AppointmentStatus::Pending,
            to: AppointmentStatus::NoShow,
            role: Role::Admin,
        })
    );

    h.service.confirm(&h.actors.admin, appointment.id).await.unwrap();
    let outcome = h.service.mark_no_show(&h.actors.admin, appointment.id).await.unwrap();
    assert_eq!(outcome.appointment.status, AppointmentStatus::NoShow);
}

#[tokio::test]
async fn confirming_twice_writes_one_status_change() {
    let h = harness().await;
    let appointment = h.book("08:00", 30).await;

    let first = h.service.confirm(&h.actors.practitioner, appointment.id).await.unwrap();
    let second = h.service.confirm(&h.actors.practitioner, appointment.id).await.unwrap();

    assert!(first.changed);
    assert!(!second.changed);
    assert_eq!(second.appointment.confirmed_at, first.appointment.confirmed_at);

    let changes = h
        .store
        .all_logs()
        .await
        .into_iter()
        .filter(|l| l.kind == LogKind::StatusChange)
        .count();
    assert_eq!(changes, 1);
}

#[tokio::test]
async fn patients_cannot_confirm_or_complete() {
    let h = harness().await;
    let appointment = h.book("08:00", 30).await;

    assert_matches!(
        h.service.confirm(&h.actors.patient, appointment.id).await,
        Err(SchedulingError::IllegalTransition { role: Role::Patient, .. })
    );

    h.service.confirm(&h.actors.practitioner, appointment.id).await.unwrap();
    assert_matches!(
        h.service.complete(&h.actors.patient, appointment.id).await,
        Err(SchedulingError::IllegalTransition { .. })
    );

    let done = h.service.complete(&h.actors.practitioner, appointment.id).await.unwrap();
    assert_eq!(done.appointment.status, AppointmentStatus::Completed);
    assert!(done.appointment.completed_at.is_some());

    // Terminal: nothing moves it any more.
    assert_matches!(
        h.service.cancel(&h.actors.admin, appointment.id, Some("late".into())).await,
        Err(SchedulingError::IllegalTransition { from: AppointmentStatus::Completed, .. })
    );
}

#[tokio::test]
async fn staff_cancellation_needs_a_reason() {
    let h = harness().await;
    let appointment = h.book("08:00", 30).await;

    let result = h
        .service
        .cancel(&h.actors.practitioner, appointment.id, Some("   ".into()))
        .await;
    assert_matches!(result, Err(ref err) if err.field() == Some("reason"));

    let outcome = h
        .service
        .cancel(&h.actors.practitioner, appointment.id, Some("Practitioner ill".into()))
        .await
        .unwrap();
    assert_eq!(outcome.appointment.cancellation_reason.as_deref(), Some("Practitioner ill"));

    let history = h
        .service
        .appointment_history(&h.actors.admin, appointment.id)
        .await
        .unwrap();
    assert_eq!(history.last().unwrap().reason.as_deref(), Some("Practitioner ill"));
}

#[tokio::test]
async fn cancelled_slot_is_immediately_bookable() {
    let h = harness().await;
    let appointment = h.book("08:00", 30).await;
    h.service.cancel(&h.actors.patient, appointment.id, None).await.unwrap();

    let other = h.actors.stranger_patient();
    let rebooked = h
        .service
        .create_appointment(&other, h.request_for(&other, "08:00", 30))
        .await
        .unwrap();
    assert_eq!(rebooked.scheduled_at, appointment.scheduled_at);
}

#[tokio::test]
async fn reschedule_round_trip_returns_to_pending_at_the_original_slot() {
    let h = harness().await;
    let original = h.book("08:00", 30).await;
    h.service.confirm(&h.actors.practitioner, original.id).await.unwrap();

    let moved = h
        .service
        .reschedule(&h.actors.patient, original.id, RescheduleRequest::to(at(monday(), "09:00")))
        .await
        .unwrap();
    assert_eq!(moved.status, AppointmentStatus::Pending);
    assert_eq!(moved.confirmed_at, None);

    let back = h
        .service
        .reschedule(&h.actors.patient, original.id, RescheduleRequest::to(original.scheduled_at))
        .await
        .unwrap();
    assert_eq!(back.scheduled_at, original.scheduled_at);
    assert_eq!(back.status, AppointmentStatus::Pending);

    let history = h
        .service
        .appointment_history(&h.actors.patient, original.id)
        .await
        .unwrap();
    let kinds: Vec<LogKind> = history.iter().map(|l| l.kind).collect();
    assert_eq!(
        kinds,
        vec![LogKind::Created, LogKind::StatusChange, LogKind::Rescheduled, LogKind::Rescheduled]
    );
    assert_eq!(history[2].old_status, Some(AppointmentStatus::Confirmed));
    assert_eq!(history[2].new_status, AppointmentStatus::Pending);
    assert_eq!(history[2].previous_scheduled_at, Some(original.scheduled_at));
    assert_eq!(history[2].new_scheduled_at, Some(at(monday(), "09:00")));
}

#[tokio::test]
async fn reschedule_ignores_its_own_current_slot() {
    let h = harness().await;
    let appointment = h.book("08:00", 30).await;

    let shifted = h
        .service
        .reschedule(
            &h.actors.practitioner,
            appointment.id,
            RescheduleRequest {
                new_scheduled_at: at(monday(), "08:15"),
                new_duration_minutes: Some(45),
            },
        )
        .await
        .unwrap();
    assert_eq!(shifted.scheduled_at, at(monday(), "08:15"));
    assert_eq!(shifted.duration_minutes, 45);
}

#[tokio::test]
async fn reschedule_is_validated_against_the_new_slot() {
    let h = harness().await;
    let mine = h.book("08:00", 30).await;
    let other = h.actors.stranger_patient();
    let theirs = h
        .service
        .create_appointment(&other, h.request_for(&other, "09:00", 30))
        .await
        .unwrap();

    assert_matches!(
        h.service
            .reschedule(&h.actors.patient, mine.id, RescheduleRequest::to(at(monday(), "09:15")))
            .await,
        Err(SchedulingError::SlotTaken { conflicting_appointment_id, .. }) if conflicting_appointment_id == theirs.id
    );
    assert_matches!(
        h.service
            .reschedule(&h.actors.patient, mine.id, RescheduleRequest::to(at(monday(), "13:00")))
            .await,
        Err(SchedulingError::OutsideAvailability { .. })
    );

    let unchanged = h.service.get_appointment(&h.actors.patient, mine.id).await.unwrap();
    assert_eq!(unchanged.scheduled_at, mine.scheduled_at);
}

#[tokio::test]
async fn terminal_appointments_cannot_be_rescheduled() {
    let h = harness().await;
    let appointment = h.book("08:00", 30).await;
    h.service.cancel(&h.actors.patient, appointment.id, None).await.unwrap();

    let result = h
        .service
        .reschedule(&h.actors.patient, appointment.id, RescheduleRequest::to(at(monday(), "10:00")))
        .await;
    assert_matches!(
        result,
        Err(SchedulingError::IllegalTransition { from: AppointmentStatus::Cancelled, .. })
    );
}

#[tokio::test]
async fn past_and_oversized_bookings_are_invalid_input() {
    let h = harness().await;
    let past = CreateAppointmentRequest::new(
        h.actors.patient_id,
        h.actors.practitioner_id,
        at(date(2025, 11, 17), "08:00"),
        30,
    );
    assert_matches!(
        h.service.create_appointment(&h.actors.patient, past).await,
        Err(ref err) if err.field() == Some("scheduled_at")
    );

    let oversized = h.request_for(&h.actors.patient, "08:00", 241);
    assert_matches!(
        h.service.create_appointment(&h.actors.patient, oversized).await,
        Err(ref err) if err.field() == Some("duration_minutes")
    );
}

#[tokio::test]
async fn patient_cannot_be_in_two_places_at_once() {
    let h = harness().await;
    let second_practitioner = h.actors.other_practitioner();
    let second_id = second_practitioner.practitioner_id.unwrap();
    h.store
        .seed_schedules(vec![schedule(second_id, 1, "08:00", "12:00", 30)])
        .await;

    let first = h.book("08:00", 60).await;
    let elsewhere = CreateAppointmentRequest::new(h.actors.patient_id, second_id, at(monday(), "08:30"), 30);
    assert_matches!(
        h.service.create_appointment(&h.actors.patient, elsewhere).await,
        Err(SchedulingError::SlotTaken { conflicting_appointment_id, .. }) if conflicting_appointment_id == first.id
    );
}

#[tokio::test]
async fn ownership_is_enforced() {
    let h = harness().await;
    let appointment = h.book("08:00", 30).await;

    let stranger = h.actors.stranger_patient();
    assert_matches!(
        h.service.cancel(&stranger, appointment.id, None).await,
        Err(SchedulingError::NotAuthorized(_))
    );
    assert_matches!(
        h.service.confirm(&h.actors.other_practitioner(), appointment.id).await,
        Err(SchedulingError::NotAuthorized(_))
    );
    assert_matches!(
        h.service.get_appointment(&stranger, appointment.id).await,
        Err(SchedulingError::NotAuthorized(_))
    );

    // Practitioners do not book, and patients only book for themselves.
    let request = h.request_for(&h.actors.patient, "10:00", 30);
    assert_matches!(
        h.service.create_appointment(&h.actors.practitioner, request.clone()).await,
        Err(SchedulingError::NotAuthorized(_))
    );
    assert_matches!(
        h.service.create_appointment(&stranger, request.clone()).await,
        Err(SchedulingError::NotAuthorized(_))
    );
    assert!(h.service.create_appointment(&h.actors.admin, request).await.is_ok());
}

#[tokio::test]
async fn archived_appointments_disappear_but_keep_their_logs() {
    let h = harness().await;
    let appointment = h.book("08:00", 30).await;

    assert_matches!(
        h.service.archive(&h.actors.practitioner, appointment.id).await,
        Err(SchedulingError::NotAuthorized(_))
    );

    let archived = h.service.archive(&h.actors.admin, appointment.id).await.unwrap();
    assert!(archived.deleted_at.is_some());

    assert_matches!(
        h.service.get_appointment(&h.actors.admin, appointment.id).await,
        Err(SchedulingError::NotFound { entity: EntityKind::Appointment, id }) if id == appointment.id
    );
    assert!(h
        .service
        .list_for_patient(&h.actors.patient, h.actors.patient_id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(h.store.all_appointments().await.len(), 1);
    assert_eq!(h.store.all_logs().await.len(), 1);

    // The archived row no longer holds its slot.
    assert!(h
        .service
        .create_appointment(&h.actors.patient, h.request_for(&h.actors.patient, "08:00", 30))
        .await
        .is_ok());
}

#[tokio::test]
async fn listings_are_scoped_to_their_owner() {
    let h = harness().await;
    h.book("08:00", 30).await;
    h.book("10:00", 30).await;

    let mine = h
        .service
        .list_for_patient(&h.actors.patient, h.actors.patient_id)
        .await
        .unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine[0].scheduled_at < mine[1].scheduled_at);

    let booked = h
        .service
        .list_for_practitioner(&h.actors.practitioner, h.actors.practitioner_id)
        .await
        .unwrap();
    assert_eq!(booked.len(), 2);

    let stranger: Actor = h.actors.stranger_patient();
    assert_matches!(
        h.service.list_for_patient(&stranger, h.actors.patient_id).await,
        Err(SchedulingError::NotAuthorized(_))
    );
    assert_matches!(
        h.service
            .list_for_practitioner(&h.actors.other_practitioner(), h.actors.practitioner_id)
            .await,
        Err(SchedulingError::NotAuthorized(_))
    );
}

#[tokio::test]
async fn active_bookings_never_overlap() {
    let h = harness().await;
    let mut offset = 0;
    while offset < 240 {
        let patient = h.actors.stranger_patient();
        let start = at(monday(), "08:00") + Duration::minutes(offset);
        let duration = if offset % 2 == 0 { 45 } else { 30 };
        let request = CreateAppointmentRequest::new(
            patient.patient_id.unwrap(),
            h.actors.practitioner_id,
            start,
            duration,
        );
        let _ = h.service.create_appointment(&patient, request).await;
        offset += 15;
    }

    let active: Vec<_> = h
        .store
        .all_appointments()
        .await
        .into_iter()
        .filter(|apt| apt.is_active())
        .collect();
    assert!(!active.is_empty());
    for (i, a) in active.iter().enumerate() {
        for b in active.iter().skip(i + 1) {
            assert!(
                !a.overlaps(b.scheduled_at, b.end_time()),
                "{} overlaps {}",
                a.scheduled_at,
                b.scheduled_at
            );
        }
    }
}

impl common::Harness {
    fn clock_now(&self) -> chrono::DateTime<chrono::Utc> {
        use shared_utils::Clock;
        self.clock.now()
    }
}
