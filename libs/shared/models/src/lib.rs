pub mod auth;
pub mod error;
pub mod scheduling;

pub use auth::{Actor, Role};
pub use error::{AppError, EntityKind, ErrorCode, SchedulingError, SchedulingResult};
pub use scheduling::*;
