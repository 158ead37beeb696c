use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use shared_models::SchedulingError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub day_of_week: u32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration: i32,
    #[serde(default)]
    pub is_blocked: bool,
    pub blocked_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateScheduleRequest {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub slot_duration: Option<i32>,
    pub is_blocked: Option<bool>,
    pub blocked_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBlockRequest {
    pub blocked_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
}

impl CreateBlockRequest {
    pub fn full_day(blocked_date: NaiveDate, reason: Option<String>) -> Self {
        Self {
            blocked_date,
            start_time: None,
            end_time: None,
            reason,
        }
    }
}

/// A concrete bookable instant derived from availability minus blocks minus
/// existing bookings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i32,
}

/// Outcome of an advisory bookability check.
#[derive(Debug, Clone, PartialEq)]
pub struct Bookability {
    pub ok: bool,
    pub reason: Option<SchedulingError>,
}

impl Bookability {
    pub fn bookable() -> Self {
        Self { ok: true, reason: None }
    }

    pub fn rejected(reason: SchedulingError) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
        }
    }
}

impl From<Result<(), SchedulingError>> for Bookability {
    fn from(result: Result<(), SchedulingError>) -> Self {
        match result {
            Ok(()) => Bookability::bookable(),
            Err(reason) => Bookability::rejected(reason),
        }
    }
}
