pub mod error;
pub mod services;

pub use error::CacheError;
pub use services::*;
