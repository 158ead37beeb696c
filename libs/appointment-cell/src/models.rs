use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::{Appointment, AppointmentType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    pub price: Option<f64>,
    pub notes: Option<String>,
}

impl CreateAppointmentRequest {
    pub fn new(patient_id: Uuid, practitioner_id: Uuid, scheduled_at: DateTime<Utc>, duration_minutes: i32) -> Self {
        Self {
            patient_id,
            practitioner_id,
            scheduled_at,
            duration_minutes,
            appointment_type: AppointmentType::default(),
            price: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub new_scheduled_at: DateTime<Utc>,
    /// Keeps the current duration when absent.
    pub new_duration_minutes: Option<i32>,
}

impl RescheduleRequest {
    pub fn to(new_scheduled_at: DateTime<Utc>) -> Self {
        Self {
            new_scheduled_at,
            new_duration_minutes: None,
        }
    }
}

/// Result of a status command. `changed` is false when the appointment was
/// already in the requested status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub appointment: Appointment,
    pub changed: bool,
}
