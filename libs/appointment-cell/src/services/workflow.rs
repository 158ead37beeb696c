// libs/appointment-cell/src/services/workflow.rs
use tracing::{debug, warn};

use shared_models::{AppointmentStatus, Role, SchedulingError, SchedulingResult};

/// Role-aware appointment status machine.
///
/// ```text
/// PENDING   -> CONFIRMED | CANCELLED
/// CONFIRMED -> COMPLETED | CANCELLED | NO_SHOW
/// ```
///
/// Completed, cancelled and no-show are terminal. Staying in the current
/// status is always allowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppointmentWorkflow;

impl AppointmentWorkflow {
    pub fn new() -> Self {
        Self
    }

    pub fn can_transition(&self, current: AppointmentStatus, requested: AppointmentStatus, role: Role) -> bool {
        current == requested || self.allowed_transitions(current, role).contains(&requested)
    }

    pub fn validate_transition(
        &self,
        current: AppointmentStatus,
        requested: AppointmentStatus,
        role: Role,
    ) -> SchedulingResult<()> {
        debug!("Validating {} transition {} -> {}", role, current, requested);

        if !self.can_transition(current, requested, role) {
            warn!("Illegal transition attempted by {}: {} -> {}", role, current, requested);
            return Err(SchedulingError::IllegalTransition {
                from: current,
                to: requested,
                role,
            });
        }
        Ok(())
    }

    /// Outgoing edges available to `role`, excluding the self-transition.
    pub fn allowed_transitions(&self, current: AppointmentStatus, role: Role) -> Vec<AppointmentStatus> {
        use AppointmentStatus::*;

        match (role, current) {
            (Role::Admin | Role::Practitioner, Pending) => vec![Confirmed, Cancelled],
            (Role::Admin | Role::Practitioner, Confirmed) => vec![Completed, Cancelled, NoShow],
            (Role::Patient, Pending | Confirmed) => vec![Cancelled],
            (_, Completed | Cancelled | NoShow) => vec![],
        }
    }

    pub fn is_final(&self, status: AppointmentStatus) -> bool {
        status.is_final()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::AppointmentStatus::*;

    #[test]
    fn patients_may_only_cancel() {
        let workflow = AppointmentWorkflow::new();
        assert_eq!(workflow.allowed_transitions(Pending, Role::Patient), vec![Cancelled]);
        assert_eq!(workflow.allowed_transitions(Confirmed, Role::Patient), vec![Cancelled]);
        assert!(!workflow.can_transition(Pending, Confirmed, Role::Patient));
        assert!(!workflow.can_transition(Confirmed, Completed, Role::Patient));
    }

    #[test]
    fn staff_follow_the_full_table() {
        let workflow = AppointmentWorkflow::new();
        for role in [Role::Admin, Role::Practitioner] {
            assert!(workflow.can_transition(Pending, Confirmed, role));
            assert!(workflow.can_transition(Confirmed, NoShow, role));
            assert!(!workflow.can_transition(Pending, Completed, role));
            assert!(!workflow.can_transition(Pending, NoShow, role));
            assert!(!workflow.can_transition(Confirmed, Pending, role));
        }
    }

    #[test]
    fn every_status_may_stay_put() {
        let workflow = AppointmentWorkflow::new();
        for role in Role::ALL {
            for status in AppointmentStatus::ALL {
                assert!(workflow.validate_transition(status, status, role).is_ok());
            }
        }
    }

    #[test]
    fn terminal_statuses_have_no_exits() {
        let workflow = AppointmentWorkflow::new();
        for role in Role::ALL {
            for from in [Completed, Cancelled, NoShow] {
                assert!(workflow.is_final(from));
                for to in AppointmentStatus::ALL.into_iter().filter(|s| *s != from) {
                    assert!(!workflow.can_transition(from, to, role), "{role}: {from} -> {to}");
                }
            }
        }
    }
}
