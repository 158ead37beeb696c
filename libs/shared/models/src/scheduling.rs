// libs/shared/models/src/scheduling.rs
use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SchedulingError;

// ==============================================================================
// TIME ARITHMETIC
// ==============================================================================

/// Half-open time-of-day interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, SchedulingError> {
        if start >= end {
            return Err(SchedulingError::invalid_input(
                "end_time",
                format!("start time {} must be before end time {}", start, end),
            ));
        }
        Ok(Self { start, end })
    }

    /// Range starting at `start` lasting `minutes`. `None` when it would run
    /// past midnight.
    pub fn starting_at(start: NaiveTime, minutes: i64) -> Option<Self> {
        if minutes <= 0 {
            return None;
        }
        let (end, wrapped) = start.overflowing_add_signed(Duration::minutes(minutes));
        if wrapped != 0 {
            return None;
        }
        Some(Self { start, end })
    }

    /// `[a,b)` and `[c,d)` overlap iff `a < d && c < b`.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// ISO weekday of a calendar date, Monday = 1 through Sunday = 7.
pub fn iso_day_of_week(date: NaiveDate) -> u32 {
    date.weekday().number_from_monday()
}

pub fn intervals_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

// ==============================================================================
// AVAILABILITY MODELS
// ==============================================================================

/// A recurring weekly availability window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub day_of_week: u32, // 1 = Monday ... 7 = Sunday
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration: i32,
    pub is_blocked: bool,
    pub blocked_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn time_range(&self) -> TimeRange {
        TimeRange {
            start: self.start_time,
            end: self.end_time,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.is_blocked
    }

    /// Minutes this window contributes to the weekly total.
    pub fn open_minutes(&self) -> i64 {
        if self.is_blocked {
            0
        } else {
            self.time_range().minutes()
        }
    }
}

/// One-off exclusion. Both times absent means the whole day is blocked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleBlock {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub blocked_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScheduleBlock {
    pub fn is_full_day(&self) -> bool {
        self.start_time.is_none() && self.end_time.is_none()
    }

    pub fn time_range(&self) -> Option<TimeRange> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(TimeRange { start, end }),
            _ => None,
        }
    }

    pub fn covers(&self, time: NaiveTime) -> bool {
        match self.time_range() {
            Some(range) => range.start <= time && time < range.end,
            None => true,
        }
    }

    /// True when the block covers any instant of `range`.
    pub fn covers_any(&self, range: &TimeRange) -> bool {
        match self.time_range() {
            Some(blocked) => blocked.overlaps(range),
            None => true,
        }
    }
}

// ==============================================================================
// APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub appointment_type: AppointmentType,
    pub price: Option<f64>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(self.duration_minutes as i64)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Holds its slot: not soft-deleted and still pending or confirmed.
    pub fn is_active(&self) -> bool {
        !self.is_deleted() && self.status.is_active()
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        intervals_overlap(self.scheduled_at, self.end_time(), start, end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_final()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum AppointmentType {
    #[default]
    #[serde(alias = "general_consultation", alias = "consultation", alias = "general")]
    GeneralConsultation,

    #[serde(alias = "follow_up", alias = "followup")]
    FollowUp,

    #[serde(alias = "urgent", alias = "emergency")]
    Urgent,

    #[serde(alias = "telehealth", alias = "virtual")]
    Telehealth,
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::GeneralConsultation => write!(f, "GeneralConsultation"),
            AppointmentType::FollowUp => write!(f, "FollowUp"),
            AppointmentType::Urgent => write!(f, "Urgent"),
            AppointmentType::Telehealth => write!(f, "Telehealth"),
        }
    }
}

// ==============================================================================
// AUDIT LOG
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Created,
    StatusChange,
    Rescheduled,
}

/// Write-once record of an appointment change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentLog {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub kind: LogKind,
    pub old_status: Option<AppointmentStatus>,
    pub new_status: AppointmentStatus,
    pub changed_by: Uuid,
    pub reason: Option<String>,
    pub previous_scheduled_at: Option<DateTime<Utc>>,
    pub new_scheduled_at: Option<DateTime<Utc>>,
    pub changed_at: DateTime<Utc>,
}

impl AppointmentLog {
    pub fn created(appointment: &Appointment, changed_by: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            appointment_id: appointment.id,
            kind: LogKind::Created,
            old_status: None,
            new_status: appointment.status,
            changed_by,
            reason: None,
            previous_scheduled_at: None,
            new_scheduled_at: Some(appointment.scheduled_at),
            changed_at: at,
        }
    }

    pub fn status_change(
        appointment_id: Uuid,
        old_status: AppointmentStatus,
        new_status: AppointmentStatus,
        changed_by: Uuid,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            appointment_id,
            kind: LogKind::StatusChange,
            old_status: Some(old_status),
            new_status,
            changed_by,
            reason,
            previous_scheduled_at: None,
            new_scheduled_at: None,
            changed_at: at,
        }
    }

    pub fn rescheduled(
        before: &Appointment,
        after: &Appointment,
        changed_by: Uuid,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            appointment_id: after.id,
            kind: LogKind::Rescheduled,
            old_status: Some(before.status),
            new_status: after.status,
            changed_by,
            reason: None,
            previous_scheduled_at: Some(before.scheduled_at),
            new_scheduled_at: Some(after.scheduled_at),
            changed_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn adjacent_ranges_do_not_overlap() {
        let morning = TimeRange::new(t(8, 0), t(12, 0)).unwrap();
        let afternoon = TimeRange::new(t(12, 0), t(16, 0)).unwrap();
        assert!(!morning.overlaps(&afternoon));
        assert!(morning.overlaps(&TimeRange::new(t(11, 30), t(12, 30)).unwrap()));
    }

    #[test]
    fn containment_is_inclusive_of_edges() {
        let window = TimeRange::new(t(8, 0), t(12, 0)).unwrap();
        assert!(window.contains(&TimeRange::new(t(8, 0), t(12, 0)).unwrap()));
        assert!(!window.contains(&TimeRange::new(t(11, 45), t(12, 15)).unwrap()));
    }

    #[test]
    fn ranges_past_midnight_are_rejected() {
        assert!(TimeRange::starting_at(t(23, 45), 30).is_none());
        assert_eq!(TimeRange::starting_at(t(8, 0), 30).unwrap().end, t(8, 30));
        assert!(TimeRange::new(t(9, 0), t(9, 0)).is_err());
    }

    #[test]
    fn partial_block_covers_half_open_range() {
        let block = ScheduleBlock {
            id: Uuid::new_v4(),
            practitioner_id: Uuid::new_v4(),
            blocked_date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            start_time: Some(t(10, 0)),
            end_time: Some(t(11, 0)),
            reason: None,
            created_at: Utc::now(),
        };
        assert!(block.covers(t(10, 0)));
        assert!(!block.covers(t(11, 0)));
        assert!(!block.covers_any(&TimeRange::new(t(11, 0), t(11, 30)).unwrap()));
        assert!(block.covers_any(&TimeRange::new(t(9, 30), t(10, 1)).unwrap()));
    }

    #[test]
    fn iso_weekday_starts_on_monday() {
        assert_eq!(iso_day_of_week(NaiveDate::from_ymd_opt(2025, 12, 1).unwrap()), 1);
        assert_eq!(iso_day_of_week(NaiveDate::from_ymd_opt(2025, 12, 7).unwrap()), 7);
    }
}
