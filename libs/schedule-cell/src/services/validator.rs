// libs/schedule-cell/src/services/validator.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::SchedulingRules;
use shared_database::SchedulingTransaction;
use shared_models::{iso_day_of_week, SchedulingError, SchedulingResult, TimeRange};

use crate::models::{AvailableSlot, Bookability};
use crate::services::availability::{find_containing_window, weekly_open_minutes};

/// Decides whether a candidate slot is bookable by combining recurring
/// windows, one-off blocks and existing bookings.
#[derive(Debug, Clone)]
pub struct AvailabilityValidator {
    rules: SchedulingRules,
}

impl AvailabilityValidator {
    pub fn new(rules: SchedulingRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &SchedulingRules {
        &self.rules
    }

    /// Advisory form of [`ensure_bookable`](Self::ensure_bookable).
    pub async fn is_bookable(
        &self,
        tx: &mut dyn SchedulingTransaction,
        practitioner_id: Uuid,
        candidate_start: DateTime<Utc>,
        duration_minutes: i32,
        now: DateTime<Utc>,
    ) -> Bookability {
        self.ensure_bookable(tx, practitioner_id, candidate_start, duration_minutes, None, now)
            .await
            .into()
    }

    /// Runs every bookability rule in order and fails with the first one
    /// violated. `exclude_appointment_id` removes a row from the overlap check,
    /// so a booking being moved never collides with itself.
    pub async fn ensure_bookable(
        &self,
        tx: &mut dyn SchedulingTransaction,
        practitioner_id: Uuid,
        candidate_start: DateTime<Utc>,
        duration_minutes: i32,
        exclude_appointment_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> SchedulingResult<()> {
        debug!(
            "Checking bookability for practitioner {} at {} ({} min)",
            practitioner_id, candidate_start, duration_minutes
        );

        self.validate_duration(duration_minutes)?;

        let blocked_date = candidate_start.date_naive();
        let day_of_week = iso_day_of_week(blocked_date);
        let candidate_end = candidate_start + Duration::minutes(duration_minutes as i64);

        if candidate_start <= now {
            return Err(SchedulingError::invalid_input(
                "scheduled_at",
                "appointment must be scheduled in the future",
            ));
        }

        let outside = || SchedulingError::OutsideAvailability {
            practitioner_id,
            scheduled_at: candidate_start,
            duration_minutes,
        };

        let requested = TimeRange::starting_at(candidate_start.time(), duration_minutes as i64)
            .ok_or_else(outside)?;

        let windows = tx.schedules_for_day(practitioner_id, day_of_week).await?;
        if find_containing_window(&windows, &requested).is_none() {
            warn!(
                "Practitioner {} has no window on day {} containing {}",
                practitioner_id, day_of_week, requested
            );
            return Err(outside());
        }

        let blocks = tx.blocks_on(practitioner_id, blocked_date).await?;
        if let Some(block) = blocks.iter().find(|b| b.covers_any(&requested)) {
            warn!("Block {} covers {} on {}", block.id, requested, blocked_date);
            return Err(SchedulingError::BlockedByPractitioner {
                block_id: block.id,
                blocked_date,
            });
        }

        let overlapping = tx
            .active_appointments_overlapping(
                practitioner_id,
                candidate_start,
                candidate_end,
                exclude_appointment_id,
            )
            .await?;
        if let Some(existing) = overlapping
            .iter()
            .find(|apt| apt.overlaps(candidate_start, candidate_end))
        {
            warn!(
                "Slot {} for practitioner {} collides with appointment {}",
                candidate_start, practitioner_id, existing.id
            );
            return Err(SchedulingError::SlotTaken {
                conflicting_appointment_id: existing.id,
                scheduled_at: existing.scheduled_at,
            });
        }

        Ok(())
    }

    /// Fails when the practitioner's open minutes across the week drop below
    /// the configured minimum. Callers run this inside the mutating
    /// transaction so a failure rolls the mutation back.
    pub async fn ensure_minimum_weekly_availability(
        &self,
        tx: &mut dyn SchedulingTransaction,
        practitioner_id: Uuid,
    ) -> SchedulingResult<i64> {
        let windows = tx.schedules_for_practitioner(practitioner_id).await?;
        let total_minutes = weekly_open_minutes(&windows);
        let required_minutes = self.rules.min_weekly_availability_minutes;

        if total_minutes < required_minutes {
            warn!(
                "Practitioner {} would keep {} open minutes, {} required",
                practitioner_id, total_minutes, required_minutes
            );
            return Err(SchedulingError::InsufficientAvailability {
                practitioner_id,
                total_minutes,
                required_minutes,
            });
        }

        Ok(total_minutes)
    }

    /// Bookable slots on `date`, stepping through each open window by its slot
    /// duration.
    pub async fn available_slots(
        &self,
        tx: &mut dyn SchedulingTransaction,
        practitioner_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> SchedulingResult<Vec<AvailableSlot>> {
        let day_of_week = iso_day_of_week(date);
        let windows = tx.schedules_for_day(practitioner_id, day_of_week).await?;
        let blocks = tx.blocks_on(practitioner_id, date).await?;

        if blocks.iter().any(|b| b.is_full_day()) {
            debug!("Practitioner {} is blocked all day on {}", practitioner_id, date);
            return Ok(vec![]);
        }

        let day_start = date.and_time(NaiveTime::default()).and_utc();
        let booked = tx
            .active_appointments_overlapping(practitioner_id, day_start, day_start + Duration::days(1), None)
            .await?;

        let mut slots = Vec::new();
        for window in windows.iter().filter(|w| w.is_open()) {
            let step = window.slot_duration as i64;
            let mut cursor = window.start_time;

            while let Some(range) = TimeRange::starting_at(cursor, step) {
                if range.end > window.end_time {
                    break;
                }

                let start = date.and_time(range.start).and_utc();
                let end = start + Duration::minutes(step);
                let blocked = blocks.iter().any(|b| b.covers_any(&range));
                let taken = booked.iter().any(|apt| apt.overlaps(start, end));

                if start > now && !blocked && !taken {
                    slots.push(AvailableSlot {
                        start_time: start,
                        end_time: end,
                        duration_minutes: window.slot_duration,
                    });
                }

                cursor = range.end;
            }
        }

        slots.sort_by_key(|slot| slot.start_time);
        debug!("Found {} available slots for practitioner {} on {}", slots.len(), practitioner_id, date);
        Ok(slots)
    }

    fn validate_duration(&self, duration_minutes: i32) -> SchedulingResult<()> {
        let max = self.rules.max_appointment_duration_minutes;
        if duration_minutes <= 0 || duration_minutes > max {
            return Err(SchedulingError::invalid_input(
                "duration_minutes",
                format!("duration must be between 1 and {} minutes", max),
            ));
        }
        Ok(())
    }
}
