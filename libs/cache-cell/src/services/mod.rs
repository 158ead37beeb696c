pub mod invalidator;
pub mod redis_invalidator;

pub use invalidator::{
    build_invalidator, patient_key_pattern, practitioner_key_pattern, CacheInvalidator, NoopCacheInvalidator,
};
pub use redis_invalidator::RedisCacheInvalidator;
