// libs/schedule-cell/src/services/guard.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::SchedulingTransaction;
use shared_models::{iso_day_of_week, SchedulingError, SchedulingResult, TimeRange};

use crate::models::Bookability;
use crate::services::availability::appointment_time_range;

/// Refuses to remove availability or add blocks underneath bookings that are
/// still pending or confirmed.
#[derive(Debug, Clone, Default)]
pub struct ScheduleBlockGuard;

impl ScheduleBlockGuard {
    pub fn new() -> Self {
        Self
    }

    /// Fails when a future active appointment on `day_of_week` falls inside
    /// `removed` and is not still fully covered by one of `kept`.
    ///
    /// The weekday is derived from each appointment's UTC date here rather than
    /// by the store, so every backend agrees on it.
    pub async fn ensure_window_change_safe(
        &self,
        tx: &mut dyn SchedulingTransaction,
        practitioner_id: Uuid,
        day_of_week: u32,
        removed: TimeRange,
        kept: &[TimeRange],
        now: DateTime<Utc>,
    ) -> SchedulingResult<()> {
        debug!(
            "Guarding removal of {} on day {} for practitioner {}",
            removed, day_of_week, practitioner_id
        );

        let upcoming = tx.future_active_appointments(practitioner_id, now).await?;
        let affected: Vec<Uuid> = upcoming
            .iter()
            .filter(|apt| iso_day_of_week(apt.scheduled_at.date_naive()) == day_of_week)
            .filter(|apt| {
                let span = appointment_time_range(apt);
                span.overlaps(&removed) && !kept.iter().any(|range| range.contains(&span))
            })
            .map(|apt| apt.id)
            .collect();

        reject_if_affected(practitioner_id, affected)
    }

    pub async fn can_change_window(
        &self,
        tx: &mut dyn SchedulingTransaction,
        practitioner_id: Uuid,
        day_of_week: u32,
        removed: TimeRange,
        kept: &[TimeRange],
        now: DateTime<Utc>,
    ) -> Bookability {
        self.ensure_window_change_safe(tx, practitioner_id, day_of_week, removed, kept, now)
            .await
            .into()
    }

    /// Fails when an active appointment intersects `date` (or only `range` of
    /// it, for a partial block).
    pub async fn ensure_date_range_free(
        &self,
        tx: &mut dyn SchedulingTransaction,
        practitioner_id: Uuid,
        date: NaiveDate,
        range: Option<TimeRange>,
    ) -> SchedulingResult<()> {
        let (start, end) = match range {
            Some(range) => (
                date.and_time(range.start).and_utc(),
                date.and_time(range.end).and_utc(),
            ),
            None => {
                let day_start = date.and_time(NaiveTime::default()).and_utc();
                (day_start, day_start + Duration::days(1))
            }
        };

        debug!(
            "Guarding block {} - {} for practitioner {}",
            start, end, practitioner_id
        );

        let overlapping = tx
            .active_appointments_overlapping(practitioner_id, start, end, None)
            .await?;
        let affected: Vec<Uuid> = overlapping
            .iter()
            .filter(|apt| apt.overlaps(start, end))
            .map(|apt| apt.id)
            .collect();

        reject_if_affected(practitioner_id, affected)
    }

    pub async fn can_block(
        &self,
        tx: &mut dyn SchedulingTransaction,
        practitioner_id: Uuid,
        date: NaiveDate,
        range: Option<TimeRange>,
    ) -> Bookability {
        self.ensure_date_range_free(tx, practitioner_id, date, range)
            .await
            .into()
    }
}

fn reject_if_affected(practitioner_id: Uuid, mut appointment_ids: Vec<Uuid>) -> SchedulingResult<()> {
    if appointment_ids.is_empty() {
        return Ok(());
    }

    appointment_ids.sort();
    warn!(
        "Change for practitioner {} would strand {} booked appointment(s)",
        practitioner_id,
        appointment_ids.len()
    );
    Err(SchedulingError::AffectsBookedAppointments { appointment_ids })
}
