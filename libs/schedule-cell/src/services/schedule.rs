// libs/schedule-cell/src/services/schedule.rs
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::SchedulingRules;
use shared_database::{complete, SchedulingStore, SchedulingTransaction};
use shared_models::{
    Actor, EntityKind, Schedule, ScheduleBlock, SchedulingError, SchedulingResult, TimeRange,
};
use shared_utils::Clock;

use crate::models::{
    AvailableSlot, Bookability, CreateBlockRequest, CreateScheduleRequest, UpdateScheduleRequest,
};
use crate::services::availability::{
    find_overlapping_window, validate_request, validate_window, weekly_open_minutes,
};
use crate::services::guard::ScheduleBlockGuard;
use crate::services::validator::AvailabilityValidator;

/// Manages a practitioner's recurring windows and one-off blocks. Every
/// mutation runs in a single transaction and re-checks the weekly minimum
/// before committing.
pub struct ScheduleService {
    store: Arc<dyn SchedulingStore>,
    clock: Arc<dyn Clock>,
    validator: AvailabilityValidator,
    guard: ScheduleBlockGuard,
}

impl ScheduleService {
    pub fn new(store: Arc<dyn SchedulingStore>, clock: Arc<dyn Clock>, rules: SchedulingRules) -> Self {
        Self {
            store,
            clock,
            validator: AvailabilityValidator::new(rules),
            guard: ScheduleBlockGuard::new(),
        }
    }

    pub fn validator(&self) -> &AvailabilityValidator {
        &self.validator
    }

    // ==============================================================================
    // WINDOWS
    // ==============================================================================

    #[instrument(skip(self, actor, request), fields(role = %actor.role))]
    pub async fn create_schedule(
        &self,
        actor: &Actor,
        practitioner_id: Uuid,
        request: CreateScheduleRequest,
    ) -> SchedulingResult<Schedule> {
        authorize(actor, practitioner_id)?;
        let range = validate_request(&request)?;

        let now = self.clock.now();
        let schedule = Schedule {
            id: Uuid::new_v4(),
            practitioner_id,
            day_of_week: request.day_of_week,
            start_time: range.start,
            end_time: range.end,
            slot_duration: request.slot_duration,
            is_blocked: request.is_blocked,
            blocked_reason: request.blocked_reason,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        let result = self.insert_window(tx.as_mut(), &schedule).await;
        let total = complete(tx, result).await?;

        info!(
            "Created window {} ({} on day {}) for practitioner {}, {} open minutes per week",
            schedule.id, range, schedule.day_of_week, practitioner_id, total
        );
        Ok(schedule)
    }

    #[instrument(skip(self, actor, request), fields(role = %actor.role))]
    pub async fn update_schedule(
        &self,
        actor: &Actor,
        schedule_id: Uuid,
        request: UpdateScheduleRequest,
    ) -> SchedulingResult<Schedule> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = self.update_window(tx.as_mut(), actor, schedule_id, request, now).await;
        let updated = complete(tx, result).await?;

        info!(
            "Updated window {} to {} on day {}",
            updated.id,
            updated.time_range(),
            updated.day_of_week
        );
        Ok(updated)
    }

    #[instrument(skip(self, actor), fields(role = %actor.role))]
    pub async fn delete_schedule(&self, actor: &Actor, schedule_id: Uuid) -> SchedulingResult<()> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = self.delete_window(tx.as_mut(), actor, schedule_id, now).await;
        complete(tx, result).await?;

        info!("Deleted window {}", schedule_id);
        Ok(())
    }

    /// Swaps a practitioner's whole week in one mutation. The new set is
    /// validated as a unit, so a practitioner with no windows can reach the
    /// weekly minimum in a single call.
    #[instrument(skip(self, actor, requests), fields(role = %actor.role, windows = requests.len()))]
    pub async fn replace_weekly_schedule(
        &self,
        actor: &Actor,
        practitioner_id: Uuid,
        requests: Vec<CreateScheduleRequest>,
    ) -> SchedulingResult<Vec<Schedule>> {
        authorize(actor, practitioner_id)?;

        let now = self.clock.now();
        let mut replacement: Vec<Schedule> = Vec::with_capacity(requests.len());
        for request in requests {
            let range = validate_request(&request)?;
            if !request.is_blocked {
                if let Some(clash) = find_overlapping_window(&replacement, request.day_of_week, &range, None) {
                    return Err(overlap_error(clash, &range));
                }
            }
            replacement.push(Schedule {
                id: Uuid::new_v4(),
                practitioner_id,
                day_of_week: request.day_of_week,
                start_time: range.start,
                end_time: range.end,
                slot_duration: request.slot_duration,
                is_blocked: request.is_blocked,
                blocked_reason: request.blocked_reason,
                created_at: now,
                updated_at: now,
            });
        }
        replacement.sort_by_key(|w| (w.day_of_week, w.start_time));

        let mut tx = self.store.begin().await?;
        let result = self
            .replace_windows(tx.as_mut(), practitioner_id, &replacement, now)
            .await;
        let total = complete(tx, result).await?;

        info!(
            "Replaced weekly schedule of practitioner {} with {} windows, {} open minutes per week",
            practitioner_id,
            replacement.len(),
            total
        );
        Ok(replacement)
    }

    pub async fn list_schedules(&self, practitioner_id: Uuid) -> SchedulingResult<Vec<Schedule>> {
        let mut tx = self.store.begin().await?;
        let result = tx
            .schedules_for_practitioner(practitioner_id)
            .await
            .map_err(SchedulingError::from);
        complete(tx, result).await
    }

    pub async fn weekly_open_minutes(&self, practitioner_id: Uuid) -> SchedulingResult<i64> {
        let windows = self.list_schedules(practitioner_id).await?;
        Ok(weekly_open_minutes(&windows))
    }

    // ==============================================================================
    // BLOCKS
    // ==============================================================================

    #[instrument(skip(self, actor, request), fields(role = %actor.role, date = %request.blocked_date))]
    pub async fn create_block(
        &self,
        actor: &Actor,
        practitioner_id: Uuid,
        request: CreateBlockRequest,
    ) -> SchedulingResult<ScheduleBlock> {
        authorize(actor, practitioner_id)?;

        let range = match (request.start_time, request.end_time) {
            (None, None) => None,
            (Some(start), Some(end)) => Some(TimeRange::new(start, end)?),
            (Some(_), None) => {
                return Err(SchedulingError::invalid_input(
                    "end_time",
                    "a partial block needs both start_time and end_time",
                ))
            }
            (None, Some(_)) => {
                return Err(SchedulingError::invalid_input(
                    "start_time",
                    "a partial block needs both start_time and end_time",
                ))
            }
        };

        let now = self.clock.now();
        if request.blocked_date < now.date_naive() {
            return Err(SchedulingError::invalid_input(
                "blocked_date",
                "cannot block a date in the past",
            ));
        }

        let block = ScheduleBlock {
            id: Uuid::new_v4(),
            practitioner_id,
            blocked_date: request.blocked_date,
            start_time: range.map(|r| r.start),
            end_time: range.map(|r| r.end),
            reason: request.reason,
            created_at: now,
        };

        let mut tx = self.store.begin().await?;
        let result = self.insert_block(tx.as_mut(), &block, range).await;
        complete(tx, result).await?;

        match range {
            Some(range) => info!("Blocked {} on {} for practitioner {}", range, block.blocked_date, practitioner_id),
            None => info!("Blocked all of {} for practitioner {}", block.blocked_date, practitioner_id),
        }
        Ok(block)
    }

    #[instrument(skip(self, actor), fields(role = %actor.role))]
    pub async fn delete_block(&self, actor: &Actor, block_id: Uuid) -> SchedulingResult<()> {
        let mut tx = self.store.begin().await?;
        let result = remove_block(tx.as_mut(), actor, block_id).await;
        complete(tx, result).await?;

        info!("Deleted block {}", block_id);
        Ok(())
    }

    /// Blocks on `[from, to]` inclusive. Only the practitioner and admins see
    /// block reasons.
    pub async fn list_blocks(
        &self,
        actor: &Actor,
        practitioner_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> SchedulingResult<Vec<ScheduleBlock>> {
        authorize(actor, practitioner_id)?;
        if to < from {
            return Err(SchedulingError::invalid_input("to", "range end precedes its start"));
        }

        let mut tx = self.store.begin().await?;
        let result = tx
            .blocks_between(practitioner_id, from, to)
            .await
            .map_err(SchedulingError::from);
        complete(tx, result).await
    }

    // ==============================================================================
    // SLOTS
    // ==============================================================================

    pub async fn available_slots(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
    ) -> SchedulingResult<Vec<AvailableSlot>> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = self
            .validator
            .available_slots(tx.as_mut(), practitioner_id, date, now)
            .await;
        complete(tx, result).await
    }

    pub async fn is_bookable(
        &self,
        practitioner_id: Uuid,
        candidate_start: DateTime<Utc>,
        duration_minutes: i32,
    ) -> SchedulingResult<Bookability> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let verdict = self
            .validator
            .is_bookable(tx.as_mut(), practitioner_id, candidate_start, duration_minutes, now)
            .await;
        complete(tx, Ok::<_, SchedulingError>(verdict)).await
    }

    // ==============================================================================
    // TRANSACTION BODIES
    // ==============================================================================

    async fn insert_window(&self, tx: &mut dyn SchedulingTransaction, schedule: &Schedule) -> SchedulingResult<i64> {
        if schedule.is_open() {
            let same_day = tx
                .schedules_for_day(schedule.practitioner_id, schedule.day_of_week)
                .await?;
            let range = schedule.time_range();
            if let Some(clash) = find_overlapping_window(&same_day, schedule.day_of_week, &range, None) {
                return Err(overlap_error(clash, &range));
            }
        }

        tx.insert_schedule(schedule.clone()).await?;
        self.validator
            .ensure_minimum_weekly_availability(tx, schedule.practitioner_id)
            .await
    }

    async fn update_window(
        &self,
        tx: &mut dyn SchedulingTransaction,
        actor: &Actor,
        schedule_id: Uuid,
        request: UpdateScheduleRequest,
        now: DateTime<Utc>,
    ) -> SchedulingResult<Schedule> {
        let existing = tx
            .find_schedule(schedule_id)
            .await?
            .ok_or_else(|| SchedulingError::not_found(EntityKind::Schedule, schedule_id))?;
        authorize(actor, existing.practitioner_id)?;

        let start_time = request.start_time.unwrap_or(existing.start_time);
        let end_time = request.end_time.unwrap_or(existing.end_time);
        let slot_duration = request.slot_duration.unwrap_or(existing.slot_duration);
        let range = validate_window(existing.day_of_week, start_time, end_time, slot_duration)?;

        let is_blocked = request.is_blocked.unwrap_or(existing.is_blocked);
        let updated = Schedule {
            start_time: range.start,
            end_time: range.end,
            slot_duration,
            is_blocked,
            blocked_reason: if is_blocked {
                request.blocked_reason.or_else(|| existing.blocked_reason.clone())
            } else {
                None
            },
            updated_at: now,
            ..existing.clone()
        };

        let same_day = tx
            .schedules_for_day(existing.practitioner_id, existing.day_of_week)
            .await?;

        if updated.is_open() {
            if let Some(clash) = find_overlapping_window(&same_day, updated.day_of_week, &range, Some(updated.id)) {
                return Err(overlap_error(clash, &range));
            }
        }

        if existing.is_open() {
            let mut kept = other_open_ranges(&same_day, existing.id);
            if updated.is_open() {
                kept.push(range);
            }
            self.guard
                .ensure_window_change_safe(
                    tx,
                    existing.practitioner_id,
                    existing.day_of_week,
                    existing.time_range(),
                    &kept,
                    now,
                )
                .await?;
        }

        tx.update_schedule(updated.clone()).await?;
        self.validator
            .ensure_minimum_weekly_availability(tx, existing.practitioner_id)
            .await?;

        Ok(updated)
    }

    async fn delete_window(
        &self,
        tx: &mut dyn SchedulingTransaction,
        actor: &Actor,
        schedule_id: Uuid,
        now: DateTime<Utc>,
    ) -> SchedulingResult<()> {
        let existing = tx
            .find_schedule(schedule_id)
            .await?
            .ok_or_else(|| SchedulingError::not_found(EntityKind::Schedule, schedule_id))?;
        authorize(actor, existing.practitioner_id)?;

        if existing.is_open() {
            let same_day = tx
                .schedules_for_day(existing.practitioner_id, existing.day_of_week)
                .await?;
            let kept = other_open_ranges(&same_day, existing.id);
            self.guard
                .ensure_window_change_safe(
                    tx,
                    existing.practitioner_id,
                    existing.day_of_week,
                    existing.time_range(),
                    &kept,
                    now,
                )
                .await?;
        }

        tx.delete_schedule(schedule_id).await?;
        self.validator
            .ensure_minimum_weekly_availability(tx, existing.practitioner_id)
            .await?;

        Ok(())
    }

    async fn replace_windows(
        &self,
        tx: &mut dyn SchedulingTransaction,
        practitioner_id: Uuid,
        replacement: &[Schedule],
        now: DateTime<Utc>,
    ) -> SchedulingResult<i64> {
        let current = tx.schedules_for_practitioner(practitioner_id).await?;

        for window in current.iter().filter(|w| w.is_open()) {
            let kept: Vec<TimeRange> = replacement
                .iter()
                .filter(|w| w.is_open() && w.day_of_week == window.day_of_week)
                .map(Schedule::time_range)
                .collect();
            self.guard
                .ensure_window_change_safe(tx, practitioner_id, window.day_of_week, window.time_range(), &kept, now)
                .await?;
        }

        for window in &current {
            tx.delete_schedule(window.id).await?;
        }
        for window in replacement {
            tx.insert_schedule(window.clone()).await?;
        }

        debug!(
            "Swapped {} windows for {} on practitioner {}",
            current.len(),
            replacement.len(),
            practitioner_id
        );

        self.validator
            .ensure_minimum_weekly_availability(tx, practitioner_id)
            .await
    }

    async fn insert_block(
        &self,
        tx: &mut dyn SchedulingTransaction,
        block: &ScheduleBlock,
        range: Option<TimeRange>,
    ) -> SchedulingResult<()> {
        self.guard
            .ensure_date_range_free(tx, block.practitioner_id, block.blocked_date, range)
            .await?;
        tx.insert_block(block.clone()).await?;
        Ok(())
    }
}

async fn remove_block(tx: &mut dyn SchedulingTransaction, actor: &Actor, block_id: Uuid) -> SchedulingResult<()> {
    let block = tx
        .find_block(block_id)
        .await?
        .ok_or_else(|| SchedulingError::not_found(EntityKind::ScheduleBlock, block_id))?;
    authorize(actor, block.practitioner_id)?;
    tx.delete_block(block_id).await?;
    Ok(())
}

fn authorize(actor: &Actor, practitioner_id: Uuid) -> SchedulingResult<()> {
    if actor.can_manage_practitioner(practitioner_id) {
        return Ok(());
    }

    warn!(
        "{} {} may not manage the schedule of practitioner {}",
        actor.role, actor.user_id, practitioner_id
    );
    Err(SchedulingError::NotAuthorized(format!(
        "{} cannot manage the schedule of practitioner {}",
        actor.role, practitioner_id
    )))
}

fn other_open_ranges(same_day: &[Schedule], exclude_id: Uuid) -> Vec<TimeRange> {
    same_day
        .iter()
        .filter(|w| w.is_open() && w.id != exclude_id)
        .map(Schedule::time_range)
        .collect()
}

fn overlap_error(clash: &Schedule, range: &TimeRange) -> SchedulingError {
    SchedulingError::invalid_input(
        "start_time",
        format!(
            "window {} overlaps existing window {} ({})",
            range,
            clash.id,
            clash.time_range()
        ),
    )
}
