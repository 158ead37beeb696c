// libs/shared/database/src/memory.rs
//
// In-process store. A transaction holds the store lock from `begin` until it
// commits or is dropped, so transactions are serializable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use shared_models::{Appointment, AppointmentLog, Schedule, ScheduleBlock};

use crate::store::{SchedulingStore, SchedulingTransaction, StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
struct StoreState {
    schedules: HashMap<Uuid, Schedule>,
    blocks: HashMap<Uuid, ScheduleBlock>,
    appointments: HashMap<Uuid, Appointment>,
    logs: Vec<AppointmentLog>,
}

impl StoreState {
    fn check_unique(&self, candidate: &Appointment) -> StoreResult<()> {
        if !candidate.is_active() {
            return Ok(());
        }
        for existing in self.appointments.values() {
            if existing.id == candidate.id || !existing.is_active() {
                continue;
            }
            if existing.scheduled_at != candidate.scheduled_at {
                continue;
            }
            if existing.practitioner_id == candidate.practitioner_id {
                return Err(StoreError::UniqueViolation {
                    constraint: "appointments_practitioner_id_scheduled_at_key".to_string(),
                });
            }
            if existing.patient_id == candidate.patient_id {
                return Err(StoreError::UniqueViolation {
                    constraint: "appointments_patient_id_scheduled_at_key".to_string(),
                });
            }
        }
        Ok(())
    }

    fn visible_appointments(&self) -> impl Iterator<Item = &Appointment> {
        self.appointments.values().filter(|apt| !apt.is_deleted())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    commit_conflicts: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes rows directly, bypassing every business rule. Fixture setup only.
    pub async fn seed_schedules(&self, schedules: impl IntoIterator<Item = Schedule>) {
        let mut state = self.state.lock().await;
        for schedule in schedules {
            state.schedules.insert(schedule.id, schedule);
        }
    }

    pub async fn seed_blocks(&self, blocks: impl IntoIterator<Item = ScheduleBlock>) {
        let mut state = self.state.lock().await;
        for block in blocks {
            state.blocks.insert(block.id, block);
        }
    }

    pub async fn seed_appointments(&self, appointments: impl IntoIterator<Item = Appointment>) {
        let mut state = self.state.lock().await;
        for appointment in appointments {
            state.appointments.insert(appointment.id, appointment);
        }
    }

    /// Every appointment row, soft-deleted ones included, ordered by start.
    pub async fn all_appointments(&self) -> Vec<Appointment> {
        let state = self.state.lock().await;
        let mut rows: Vec<Appointment> = state.appointments.values().cloned().collect();
        rows.sort_by_key(|apt| (apt.scheduled_at, apt.created_at));
        rows
    }

    pub async fn all_logs(&self) -> Vec<AppointmentLog> {
        self.state.lock().await.logs.clone()
    }

    /// Makes the next `count` commits fail with a unique violation, as if a
    /// concurrent writer got there first. Their writes are discarded.
    pub fn fail_next_commits(&self, count: u32) {
        self.commit_conflicts.store(count, Ordering::SeqCst);
    }

    pub async fn all_schedules(&self) -> Vec<Schedule> {
        let state = self.state.lock().await;
        let mut rows: Vec<Schedule> = state.schedules.values().cloned().collect();
        sort_schedules(&mut rows);
        rows
    }
}

#[async_trait]
impl SchedulingStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn SchedulingTransaction>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard: Some(guard),
            working,
            commit_conflicts: Arc::clone(&self.commit_conflicts),
        }))
    }
}

pub struct MemoryTransaction {
    guard: Option<OwnedMutexGuard<StoreState>>,
    working: StoreState,
    commit_conflicts: Arc<AtomicU32>,
}

impl MemoryTransaction {
    fn state(&mut self) -> StoreResult<&mut StoreState> {
        if self.guard.is_none() {
            return Err(StoreError::TransactionClosed);
        }
        Ok(&mut self.working)
    }
}

fn sort_schedules(rows: &mut [Schedule]) {
    rows.sort_by_key(|s| (s.day_of_week, s.start_time, s.end_time));
}

fn sort_appointments(rows: &mut [Appointment]) {
    rows.sort_by_key(|apt| (apt.scheduled_at, apt.created_at));
}

#[async_trait]
impl SchedulingTransaction for MemoryTransaction {
    async fn schedules_for_practitioner(&mut self, practitioner_id: Uuid) -> StoreResult<Vec<Schedule>> {
        let state = self.state()?;
        let mut rows: Vec<Schedule> = state
            .schedules
            .values()
            .filter(|s| s.practitioner_id == practitioner_id)
            .cloned()
            .collect();
        sort_schedules(&mut rows);
        Ok(rows)
    }

    async fn schedules_for_day(&mut self, practitioner_id: Uuid, day_of_week: u32) -> StoreResult<Vec<Schedule>> {
        let state = self.state()?;
        let mut rows: Vec<Schedule> = state
            .schedules
            .values()
            .filter(|s| s.practitioner_id == practitioner_id && s.day_of_week == day_of_week)
            .cloned()
            .collect();
        sort_schedules(&mut rows);
        Ok(rows)
    }

    async fn find_schedule(&mut self, schedule_id: Uuid) -> StoreResult<Option<Schedule>> {
        Ok(self.state()?.schedules.get(&schedule_id).cloned())
    }

    async fn insert_schedule(&mut self, schedule: Schedule) -> StoreResult<()> {
        self.state()?.schedules.insert(schedule.id, schedule);
        Ok(())
    }

    async fn update_schedule(&mut self, schedule: Schedule) -> StoreResult<()> {
        let state = self.state()?;
        match state.schedules.get_mut(&schedule.id) {
            Some(row) => {
                *row = schedule;
                Ok(())
            }
            None => Err(StoreError::RowNotFound(schedule.id)),
        }
    }

    async fn delete_schedule(&mut self, schedule_id: Uuid) -> StoreResult<()> {
        self.state()?
            .schedules
            .remove(&schedule_id)
            .map(|_| ())
            .ok_or(StoreError::RowNotFound(schedule_id))
    }

    async fn blocks_on(&mut self, practitioner_id: Uuid, date: NaiveDate) -> StoreResult<Vec<ScheduleBlock>> {
        self.blocks_between(practitioner_id, date, date).await
    }

    async fn blocks_between(
        &mut self,
        practitioner_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<ScheduleBlock>> {
        let state = self.state()?;
        let mut rows: Vec<ScheduleBlock> = state
            .blocks
            .values()
            .filter(|b| b.practitioner_id == practitioner_id)
            .filter(|b| b.blocked_date >= from && b.blocked_date <= to)
            .cloned()
            .collect();
        rows.sort_by_key(|b| (b.blocked_date, b.start_time));
        Ok(rows)
    }

    async fn find_block(&mut self, block_id: Uuid) -> StoreResult<Option<ScheduleBlock>> {
        Ok(self.state()?.blocks.get(&block_id).cloned())
    }

    async fn insert_block(&mut self, block: ScheduleBlock) -> StoreResult<()> {
        self.state()?.blocks.insert(block.id, block);
        Ok(())
    }

    async fn delete_block(&mut self, block_id: Uuid) -> StoreResult<()> {
        self.state()?
            .blocks
            .remove(&block_id)
            .map(|_| ())
            .ok_or(StoreError::RowNotFound(block_id))
    }

    async fn find_appointment(&mut self, appointment_id: Uuid) -> StoreResult<Option<Appointment>> {
        Ok(self
            .state()?
            .appointments
            .get(&appointment_id)
            .filter(|apt| !apt.is_deleted())
            .cloned())
    }

    async fn active_appointments_overlapping(
        &mut self,
        practitioner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> StoreResult<Vec<Appointment>> {
        let state = self.state()?;
        let mut rows: Vec<Appointment> = state
            .visible_appointments()
            .filter(|apt| apt.practitioner_id == practitioner_id && apt.is_active())
            .filter(|apt| Some(apt.id) != exclude_appointment_id)
            .filter(|apt| apt.overlaps(start, end))
            .cloned()
            .collect();
        sort_appointments(&mut rows);
        Ok(rows)
    }

    async fn future_active_appointments(
        &mut self,
        practitioner_id: Uuid,
        after: DateTime<Utc>,
    ) -> StoreResult<Vec<Appointment>> {
        let state = self.state()?;
        let mut rows: Vec<Appointment> = state
            .visible_appointments()
            .filter(|apt| apt.practitioner_id == practitioner_id && apt.is_active())
            .filter(|apt| apt.scheduled_at > after)
            .cloned()
            .collect();
        sort_appointments(&mut rows);
        Ok(rows)
    }

    async fn appointments_for_patient(&mut self, patient_id: Uuid) -> StoreResult<Vec<Appointment>> {
        let state = self.state()?;
        let mut rows: Vec<Appointment> = state
            .visible_appointments()
            .filter(|apt| apt.patient_id == patient_id)
            .cloned()
            .collect();
        sort_appointments(&mut rows);
        Ok(rows)
    }

    async fn appointments_for_practitioner(&mut self, practitioner_id: Uuid) -> StoreResult<Vec<Appointment>> {
        let state = self.state()?;
        let mut rows: Vec<Appointment> = state
            .visible_appointments()
            .filter(|apt| apt.practitioner_id == practitioner_id)
            .cloned()
            .collect();
        sort_appointments(&mut rows);
        Ok(rows)
    }

    async fn insert_appointment(&mut self, appointment: Appointment) -> StoreResult<()> {
        let state = self.state()?;
        state.check_unique(&appointment)?;
        state.appointments.insert(appointment.id, appointment);
        Ok(())
    }

    async fn update_appointment(&mut self, appointment: Appointment) -> StoreResult<()> {
        let state = self.state()?;
        if !state.appointments.contains_key(&appointment.id) {
            return Err(StoreError::RowNotFound(appointment.id));
        }
        state.check_unique(&appointment)?;
        state.appointments.insert(appointment.id, appointment);
        Ok(())
    }

    async fn append_log(&mut self, log: AppointmentLog) -> StoreResult<()> {
        self.state()?.logs.push(log);
        Ok(())
    }

    async fn logs_for(&mut self, appointment_id: Uuid) -> StoreResult<Vec<AppointmentLog>> {
        Ok(self
            .state()?
            .logs
            .iter()
            .filter(|log| log.appointment_id == appointment_id)
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut this = self;
        let mut guard = this.guard.take().ok_or(StoreError::TransactionClosed)?;

        let injected = this
            .commit_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if injected {
            debug!("Memory transaction lost a simulated commit race");
            return Err(StoreError::UniqueViolation {
                constraint: "appointments_practitioner_id_scheduled_at_key".to_string(),
            });
        }

        *guard = std::mem::take(&mut this.working);
        debug!("Memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let mut this = self;
        this.guard.take().ok_or(StoreError::TransactionClosed)?;
        debug!("Memory transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};
    use shared_models::{AppointmentStatus, AppointmentType};

    fn appointment(practitioner_id: Uuid, patient_id: Uuid, at: DateTime<Utc>) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            patient_id,
            practitioner_id,
            scheduled_at: at,
            duration_minutes: 30,
            status: AppointmentStatus::Pending,
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

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = MemoryStore::new();
        let at = Utc.with_ymd_and_hms(2030, 1, 7, 9, 0, 0).unwrap();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_appointment(appointment(Uuid::new_v4(), Uuid::new_v4(), at))
                .await
                .unwrap();
        }
        assert!(store.all_appointments().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_practitioner_start_violates_unique_key() {
        let store = MemoryStore::new();
        let practitioner = Uuid::new_v4();
        let at = Utc.with_ymd_and_hms(2030, 1, 7, 9, 0, 0).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_appointment(appointment(practitioner, Uuid::new_v4(), at)).await.unwrap();
        let result = tx.insert_appointment(appointment(practitioner, Uuid::new_v4(), at)).await;
        assert_matches!(result, Err(StoreError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn cancelled_rows_release_their_unique_key() {
        let store = MemoryStore::new();
        let practitioner = Uuid::new_v4();
        let at = Utc.with_ymd_and_hms(2030, 1, 7, 9, 0, 0).unwrap();
        let mut cancelled = appointment(practitioner, Uuid::new_v4(), at);
        cancelled.status = AppointmentStatus::Cancelled;
        store.seed_appointments([cancelled]).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_appointment(appointment(practitioner, Uuid::new_v4(), at)).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.all_appointments().await.len(), 2);
    }

    #[tokio::test]
    async fn overlap_query_uses_half_open_intervals() {
        let store = MemoryStore::new();
        let practitioner = Uuid::new_v4();
        let at = Utc.with_ymd_and_hms(2030, 1, 7, 9, 0, 0).unwrap();
        store.seed_appointments([appointment(practitioner, Uuid::new_v4(), at)]).await;

        let mut tx = store.begin().await.unwrap();
        let touching = tx
            .active_appointments_overlapping(practitioner, at + Duration::minutes(30), at + Duration::minutes(60), None)
            .await
            .unwrap();
        assert!(touching.is_empty());

        let partial = tx
            .active_appointments_overlapping(practitioner, at + Duration::minutes(15), at + Duration::minutes(45), None)
            .await
            .unwrap();
        assert_eq!(partial.len(), 1);
    }
}
