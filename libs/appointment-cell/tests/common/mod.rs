#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;

use appointment_cell::{AppointmentService, CreateAppointmentRequest};
use cache_cell::{CacheInvalidator, NoopCacheInvalidator};
use notification_cell::OutboxDispatcher;
use shared_config::AppConfig;
use shared_database::MemoryStore;
use shared_models::{Actor, Appointment};
use shared_utils::test_utils::{at, date, init_test_tracing, schedule, TestActors};
use shared_utils::FixedClock;

pub struct Harness {
    pub store: MemoryStore,
    pub clock: Arc<FixedClock>,
    pub outbox: OutboxDispatcher,
    pub service: AppointmentService,
    pub actors: TestActors,
}

/// Monday 2025-12-01, inside the practitioner's 08:00-12:00 window.
pub fn monday() -> NaiveDate {
    date(2025, 12, 1)
}

pub async fn harness() -> Harness {
    harness_with_cache(Arc::new(NoopCacheInvalidator)).await
}

pub async fn harness_with_cache(cache: Arc<dyn CacheInvalidator>) -> Harness {
    init_test_tracing();

    let actors = TestActors::new();
    let store = MemoryStore::new();
    store
        .seed_schedules(vec![
            schedule(actors.practitioner_id, 1, "08:00", "12:00", 30),
            schedule(actors.practitioner_id, 2, "08:00", "12:00", 30),
        ])
        .await;

    let clock = Arc::new(FixedClock::new(at(date(2025, 11, 20), "09:00")));
    let outbox = OutboxDispatcher::default();
    let service = AppointmentService::new(
        Arc::new(store.clone()),
        clock.clone(),
        Arc::new(outbox.clone()),
        cache,
        &AppConfig::default(),
    );

    Harness {
        store,
        clock,
        outbox,
        service,
        actors,
    }
}

impl Harness {
    pub fn request_for(&self, patient: &Actor, time: &str, duration_minutes: i32) -> CreateAppointmentRequest {
        CreateAppointmentRequest::new(
            patient.patient_id.expect("patient actor"),
            self.actors.practitioner_id,
            at(monday(), time),
            duration_minutes,
        )
    }

    /// Books `time` on Monday for the fixture patient.
    pub async fn book(&self, time: &str, duration_minutes: i32) -> Appointment {
        let request = self.request_for(&self.actors.patient, time, duration_minutes);
        self.service
            .create_appointment(&self.actors.patient, request)
            .await
            .expect("booking should succeed")
    }
}
