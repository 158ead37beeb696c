pub mod booking;
pub mod side_effects;
pub mod workflow;

pub use booking::AppointmentService;
pub use side_effects::SideEffects;
pub use workflow::AppointmentWorkflow;
