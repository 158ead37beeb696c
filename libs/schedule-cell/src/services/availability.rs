// libs/schedule-cell/src/services/availability.rs
//
// Pure arithmetic over recurring weekly windows. No I/O.

use chrono::NaiveTime;
use uuid::Uuid;

use shared_models::{Appointment, Schedule, SchedulingError, TimeRange};

use crate::models::CreateScheduleRequest;

/// Validates the shape of a window and returns its time range.
pub fn validate_window(
    day_of_week: u32,
    start_time: NaiveTime,
    end_time: NaiveTime,
    slot_duration: i32,
) -> Result<TimeRange, SchedulingError> {
    if !(1..=7).contains(&day_of_week) {
        return Err(SchedulingError::invalid_input(
            "day_of_week",
            "day of week must be between 1 (Monday) and 7 (Sunday)",
        ));
    }

    let range = TimeRange::new(start_time, end_time)?;

    if slot_duration <= 0 || slot_duration as i64 > range.minutes() {
        return Err(SchedulingError::invalid_input(
            "slot_duration",
            format!(
                "slot duration must be between 1 and {} minutes for window {}",
                range.minutes(),
                range
            ),
        ));
    }

    Ok(range)
}

pub fn validate_request(request: &CreateScheduleRequest) -> Result<TimeRange, SchedulingError> {
    validate_window(
        request.day_of_week,
        request.start_time,
        request.end_time,
        request.slot_duration,
    )
}

/// First open window on the same day whose range intersects `candidate`.
pub fn find_overlapping_window<'a>(
    windows: &'a [Schedule],
    day_of_week: u32,
    candidate: &TimeRange,
    exclude_id: Option<Uuid>,
) -> Option<&'a Schedule> {
    windows
        .iter()
        .filter(|w| w.is_open() && w.day_of_week == day_of_week)
        .filter(|w| Some(w.id) != exclude_id)
        .find(|w| w.time_range().overlaps(candidate))
}

/// First open window fully containing `candidate`.
pub fn find_containing_window<'a>(windows: &'a [Schedule], candidate: &TimeRange) -> Option<&'a Schedule> {
    windows
        .iter()
        .filter(|w| w.is_open())
        .find(|w| w.time_range().contains(candidate))
}

pub fn weekly_open_minutes(windows: &[Schedule]) -> i64 {
    windows.iter().map(Schedule::open_minutes).sum()
}

/// Time-of-day span an appointment occupies on its start date. Bookings that
/// run past midnight are clamped to the end of the day.
pub fn appointment_time_range(appointment: &Appointment) -> TimeRange {
    let start = appointment.scheduled_at.time();
    TimeRange::starting_at(start, appointment.duration_minutes as i64).unwrap_or(TimeRange {
        start,
        end: end_of_day(),
    })
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or_default()
}
