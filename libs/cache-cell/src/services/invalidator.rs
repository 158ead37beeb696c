use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::CacheError;
use crate::services::redis_invalidator::RedisCacheInvalidator;

/// Drops cached appointment listings after a committed mutation.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate_appointment_cache(
        &self,
        patient_id: Option<Uuid>,
        practitioner_id: Option<Uuid>,
    ) -> Result<(), CacheError>;
}

pub fn patient_key_pattern(patient_id: Uuid) -> String {
    format!("appointments:patient:{}*", patient_id)
}

pub fn practitioner_key_pattern(practitioner_id: Uuid) -> String {
    format!("appointments:practitioner:{}*", practitioner_id)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCacheInvalidator;

#[async_trait]
impl CacheInvalidator for NoopCacheInvalidator {
    async fn invalidate_appointment_cache(
        &self,
        patient_id: Option<Uuid>,
        practitioner_id: Option<Uuid>,
    ) -> Result<(), CacheError> {
        debug!(
            "No cache configured, skipping invalidation for patient {:?} practitioner {:?}",
            patient_id, practitioner_id
        );
        Ok(())
    }
}

/// Redis-backed invalidation when `REDIS_URL` is set, a no-op otherwise.
pub fn build_invalidator(config: &AppConfig) -> Arc<dyn CacheInvalidator> {
    match config.redis_url.as_deref() {
        Some(url) => match RedisCacheInvalidator::from_url(url) {
            Ok(invalidator) => Arc::new(invalidator),
            Err(e) => {
                warn!("Redis cache unavailable ({}), falling back to no-op invalidation", e);
                Arc::new(NoopCacheInvalidator)
            }
        },
        None => Arc::new(NoopCacheInvalidator),
    }
}
