use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use shared_models::{
    Appointment, AppointmentLog, Schedule, ScheduleBlock, SchedulingError,
};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Unique constraint {constraint} violated")]
    UniqueViolation { constraint: String },

    #[error("Row {0} not found")]
    RowNotFound(Uuid),

    #[error("Transaction already finished")]
    TransactionClosed,

    #[error("Storage failure: {0}")]
    Backend(String),
}

impl From<StoreError> for SchedulingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { constraint } => {
                SchedulingError::Conflict(format!("concurrent write hit {}", constraint))
            }
            other => SchedulingError::Internal(other.to_string()),
        }
    }
}

/// Entry point of the persistence boundary. Every scheduling mutation runs in
/// exactly one transaction obtained from `begin`.
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn SchedulingTransaction>>;
}

/// A unit of work. Dropping it without `commit` discards every write.
///
/// Appointment queries never return soft-deleted rows. Logs are insert-only.
#[async_trait]
pub trait SchedulingTransaction: Send {
    // Availability windows
    async fn schedules_for_practitioner(&mut self, practitioner_id: Uuid) -> StoreResult<Vec<Schedule>>;
    async fn schedules_for_day(&mut self, practitioner_id: Uuid, day_of_week: u32) -> StoreResult<Vec<Schedule>>;
    async fn find_schedule(&mut self, schedule_id: Uuid) -> StoreResult<Option<Schedule>>;
    async fn insert_schedule(&mut self, schedule: Schedule) -> StoreResult<()>;
    async fn update_schedule(&mut self, schedule: Schedule) -> StoreResult<()>;
    async fn delete_schedule(&mut self, schedule_id: Uuid) -> StoreResult<()>;

    // Blocks
    async fn blocks_on(&mut self, practitioner_id: Uuid, date: NaiveDate) -> StoreResult<Vec<ScheduleBlock>>;
    async fn blocks_between(
        &mut self,
        practitioner_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<ScheduleBlock>>;
    async fn find_block(&mut self, block_id: Uuid) -> StoreResult<Option<ScheduleBlock>>;
    async fn insert_block(&mut self, block: ScheduleBlock) -> StoreResult<()>;
    async fn delete_block(&mut self, block_id: Uuid) -> StoreResult<()>;

    // Appointments
    async fn find_appointment(&mut self, appointment_id: Uuid) -> StoreResult<Option<Appointment>>;

    /// Pending/confirmed appointments of a practitioner intersecting `[start, end)`.
    async fn active_appointments_overlapping(
        &mut self,
        practitioner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> StoreResult<Vec<Appointment>>;

    /// Pending/confirmed appointments of a practitioner starting after `after`.
    async fn future_active_appointments(
        &mut self,
        practitioner_id: Uuid,
        after: DateTime<Utc>,
    ) -> StoreResult<Vec<Appointment>>;

    async fn appointments_for_patient(&mut self, patient_id: Uuid) -> StoreResult<Vec<Appointment>>;
    async fn appointments_for_practitioner(&mut self, practitioner_id: Uuid) -> StoreResult<Vec<Appointment>>;

    /// Fails with `UniqueViolation` when an active row already holds the same
    /// `(practitioner_id, scheduled_at)` or `(patient_id, scheduled_at)`.
    async fn insert_appointment(&mut self, appointment: Appointment) -> StoreResult<()>;
    async fn update_appointment(&mut self, appointment: Appointment) -> StoreResult<()>;

    // Audit
    async fn append_log(&mut self, log: AppointmentLog) -> StoreResult<()>;
    async fn logs_for(&mut self, appointment_id: Uuid) -> StoreResult<Vec<AppointmentLog>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Commits on success and rolls back on failure, returning the original result.
/// A failed rollback is logged; the business error still wins.
pub async fn complete<T, E>(tx: Box<dyn SchedulingTransaction>, result: Result<T, E>) -> Result<T, E>
where
    E: From<StoreError>,
{
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!("Rollback failed: {}", rollback_err);
            }
            Err(err)
        }
    }
}
