pub mod availability;
pub mod guard;
pub mod schedule;
pub mod validator;

pub use guard::ScheduleBlockGuard;
pub use schedule::ScheduleService;
pub use validator::AvailabilityValidator;
