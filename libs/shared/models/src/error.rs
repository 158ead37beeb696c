use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::Role;
use crate::scheduling::AppointmentStatus;

pub type SchedulingResult<T> = Result<T, SchedulingError>;

/// Machine-readable rejection code, stable across releases so clients can
/// localize messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    OutsideAvailability,
    BlockedByPractitioner,
    SlotTaken,
    InsufficientAvailability,
    IllegalTransition,
    NotAuthorized,
    NotFound,
    AffectsBookedAppointments,
    Conflict,
    InternalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Appointment,
    Schedule,
    ScheduleBlock,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Appointment => write!(f, "appointment"),
            EntityKind::Schedule => write!(f, "schedule"),
            EntityKind::ScheduleBlock => write!(f, "schedule block"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulingError {
    #[error("Invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("Practitioner is not available at {scheduled_at} for {duration_minutes} minutes")]
    OutsideAvailability {
        practitioner_id: Uuid,
        scheduled_at: DateTime<Utc>,
        duration_minutes: i32,
    },

    #[error("Practitioner blocked {blocked_date}")]
    BlockedByPractitioner { block_id: Uuid, blocked_date: NaiveDate },

    #[error("Slot is taken by appointment {conflicting_appointment_id}")]
    SlotTaken {
        conflicting_appointment_id: Uuid,
        scheduled_at: DateTime<Utc>,
    },

    #[error("Weekly availability of {total_minutes} minutes is below the required {required_minutes}")]
    InsufficientAvailability {
        practitioner_id: Uuid,
        total_minutes: i64,
        required_minutes: i64,
    },

    #[error("{role} cannot move an appointment from {from} to {to}")]
    IllegalTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
        role: Role,
    },

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: Uuid },

    #[error("{} booked appointment(s) fall inside the affected range", appointment_ids.len())]
    AffectsBookedAppointments { appointment_ids: Vec<Uuid> },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SchedulingError {
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        SchedulingError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: EntityKind, id: Uuid) -> Self {
        SchedulingError::NotFound { entity, id }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            SchedulingError::InvalidInput { .. } => ErrorCode::InvalidInput,
            SchedulingError::OutsideAvailability { .. } => ErrorCode::OutsideAvailability,
            SchedulingError::BlockedByPractitioner { .. } => ErrorCode::BlockedByPractitioner,
            SchedulingError::SlotTaken { .. } => ErrorCode::SlotTaken,
            SchedulingError::InsufficientAvailability { .. } => ErrorCode::InsufficientAvailability,
            SchedulingError::IllegalTransition { .. } => ErrorCode::IllegalTransition,
            SchedulingError::NotAuthorized(_) => ErrorCode::NotAuthorized,
            SchedulingError::NotFound { .. } => ErrorCode::NotFound,
            SchedulingError::AffectsBookedAppointments { .. } => ErrorCode::AffectsBookedAppointments,
            SchedulingError::Conflict(_) => ErrorCode::Conflict,
            SchedulingError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Input field a client should highlight.
    pub fn field(&self) -> Option<&str> {
        match self {
            SchedulingError::InvalidInput { field, .. } => Some(field.as_str()),
            SchedulingError::OutsideAvailability { .. }
            | SchedulingError::BlockedByPractitioner { .. }
            | SchedulingError::SlotTaken { .. } => Some("scheduled_at"),
            SchedulingError::InsufficientAvailability { .. } => Some("schedules"),
            SchedulingError::IllegalTransition { .. } => Some("status"),
            SchedulingError::NotFound { .. } => Some("id"),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SchedulingError::Conflict(_))
    }

    fn details(&self) -> serde_json::Value {
        match self {
            SchedulingError::SlotTaken { conflicting_appointment_id, .. } => {
                json!({ "conflicting_appointment_id": conflicting_appointment_id })
            }
            SchedulingError::BlockedByPractitioner { block_id, blocked_date } => {
                json!({ "block_id": block_id, "blocked_date": blocked_date })
            }
            SchedulingError::InsufficientAvailability { total_minutes, required_minutes, .. } => {
                json!({ "total_minutes": total_minutes, "required_minutes": required_minutes })
            }
            SchedulingError::IllegalTransition { from, to, role } => {
                json!({ "from": from, "to": to, "role": role })
            }
            SchedulingError::AffectsBookedAppointments { appointment_ids } => {
                json!({ "appointment_ids": appointment_ids })
            }
            _ => serde_json::Value::Null,
        }
    }
}

/// HTTP-facing wrapper a host service returns from its handlers.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Scheduling error: {0}")]
    Scheduling(#[from] SchedulingError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Scheduling(err) => match err.code() {
                ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorCode::NotAuthorized => StatusCode::FORBIDDEN,
                ErrorCode::NotFound => StatusCode::NOT_FOUND,
                ErrorCode::SlotTaken
                | ErrorCode::IllegalTransition
                | ErrorCode::Conflict
                | ErrorCode::AffectsBookedAppointments => StatusCode::CONFLICT,
                ErrorCode::OutsideAvailability
                | ErrorCode::BlockedByPractitioner
                | ErrorCode::InsufficientAvailability => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let AppError::Scheduling(err) = &self;

        if status.is_server_error() {
            tracing::error!("Error: {}: {}", status, err);
        } else {
            tracing::warn!("Scheduling rejection {:?}: {}", err.code(), err);
        }

        let body = json!({
            "error": err.to_string(),
            "code": err.code(),
            "field": err.field(),
            "details": err.details(),
        });

        (status, Json(body)).into_response()
    }
}
