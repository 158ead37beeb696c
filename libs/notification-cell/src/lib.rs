pub mod error;
pub mod models;
pub mod services;
pub mod templates;

pub use error::NotificationError;
pub use models::*;
pub use services::*;
pub use templates::{interpolate, TemplateRenderer};
