use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduling::Appointment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    #[serde(alias = "doctor")]
    Practitioner,
    Patient,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Practitioner, Role::Patient];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Practitioner => write!(f, "practitioner"),
            Role::Patient => write!(f, "patient"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "practitioner" | "doctor" => Ok(Role::Practitioner),
            "patient" => Ok(Role::Patient),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// An already-authenticated caller. The identity layer resolves the role and,
/// where relevant, the practitioner or patient profile the user acts as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    pub practitioner_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
}

impl Actor {
    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Admin,
            practitioner_id: None,
            patient_id: None,
        }
    }

    pub fn practitioner(user_id: Uuid, practitioner_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Practitioner,
            practitioner_id: Some(practitioner_id),
            patient_id: None,
        }
    }

    pub fn patient(user_id: Uuid, patient_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Patient,
            practitioner_id: None,
            patient_id: Some(patient_id),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins manage every practitioner; practitioners only themselves.
    pub fn can_manage_practitioner(&self, practitioner_id: Uuid) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Practitioner => self.practitioner_id == Some(practitioner_id),
            Role::Patient => false,
        }
    }

    pub fn owns_appointment(&self, appointment: &Appointment) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Practitioner => self.practitioner_id == Some(appointment.practitioner_id),
            Role::Patient => self.patient_id == Some(appointment.patient_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_doctor_role() {
        assert_eq!("Doctor".parse::<Role>(), Ok(Role::Practitioner));
        assert_eq!("patient".parse::<Role>(), Ok(Role::Patient));
        assert!("nurse".parse::<Role>().is_err());
    }

    #[test]
    fn patients_never_manage_schedules() {
        let patient_id = Uuid::new_v4();
        let actor = Actor::patient(Uuid::new_v4(), patient_id);
        assert!(!actor.can_manage_practitioner(patient_id));
    }
}
