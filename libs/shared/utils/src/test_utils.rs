use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use shared_models::{
    Actor, Appointment, AppointmentStatus, AppointmentType, Schedule, ScheduleBlock,
};

pub use crate::telemetry::init_test_tracing;

/// Parses `"HH:MM"`. Fixture input only.
pub fn hm(value: &str) -> NaiveTime {
    NaiveTime::parse_from_str(value, "%H:%M").expect("fixture time must be HH:MM")
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("fixture date must be valid")
}

pub fn at(day: NaiveDate, time: &str) -> DateTime<Utc> {
    day.and_time(hm(time)).and_utc()
}

/// One practitioner, one patient, and an admin, each with their own actor.
pub struct TestActors {
    pub practitioner_id: Uuid,
    pub patient_id: Uuid,
    pub admin: Actor,
    pub practitioner: Actor,
    pub patient: Actor,
}

impl Default for TestActors {
    fn default() -> Self {
        Self::new()
    }
}

impl TestActors {
    pub fn new() -> Self {
        let practitioner_id = Uuid::new_v4();
        let patient_id = Uuid::new_v4();
        Self {
            practitioner_id,
            patient_id,
            admin: Actor::admin(Uuid::new_v4()),
            practitioner: Actor::practitioner(Uuid::new_v4(), practitioner_id),
            patient: Actor::patient(Uuid::new_v4(), patient_id),
        }
    }

    /// A patient with no relation to the fixture's appointments.
    pub fn stranger_patient(&self) -> Actor {
        Actor::patient(Uuid::new_v4(), Uuid::new_v4())
    }

    pub fn other_practitioner(&self) -> Actor {
        Actor::practitioner(Uuid::new_v4(), Uuid::new_v4())
    }
}

pub fn schedule(practitioner_id: Uuid, day_of_week: u32, start: &str, end: &str, slot_duration: i32) -> Schedule {
    let now = Utc::now();
    Schedule {
        id: Uuid::new_v4(),
        practitioner_id,
        day_of_week,
        start_time: hm(start),
        end_time: hm(end),
        slot_duration,
        is_blocked: false,
        blocked_reason: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn full_day_block(practitioner_id: Uuid, blocked_date: NaiveDate) -> ScheduleBlock {
    ScheduleBlock {
        id: Uuid::new_v4(),
        practitioner_id,
        blocked_date,
        start_time: None,
        end_time: None,
        reason: Some("Leave".to_string()),
        created_at: Utc::now(),
    }
}

pub fn appointment(
    patient_id: Uuid,
    practitioner_id: Uuid,
    scheduled_at: DateTime<Utc>,
    duration_minutes: i32,
    status: AppointmentStatus,
) -> Appointment {
    let now = Utc::now();
    Appointment {
        id: Uuid::new_v4(),
        patient_id,
        practitioner_id,
        scheduled_at,
        duration_minutes,
        status,
        appointment_type: AppointmentType::GeneralConsultation,
        price: None,
        notes: None,
        created_by: patient_id,
        confirmed_at: None,
        cancelled_at: None,
        completed_at: None,
        reminder_sent_at: None,
        cancellation_reason: None,
        deleted_at: None,
        created_at: now,
        updated_at: now,
    }
}
