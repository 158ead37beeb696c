use anyhow::Context;
use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::CacheError;
use crate::services::invalidator::{patient_key_pattern, practitioner_key_pattern, CacheInvalidator};

const SCAN_BATCH: usize = 100;

/// Pattern-based invalidation: every key under a subject's prefix is removed
/// with `SCAN` + `DEL`.
#[derive(Clone)]
pub struct RedisCacheInvalidator {
    pool: Pool,
}

impl RedisCacheInvalidator {
    /// Builds the pool without connecting; the first invalidation opens a
    /// connection.
    pub fn from_url(redis_url: &str) -> Result<Self, CacheError> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Pool(e.to_string()))?;

        info!("Redis cache invalidator configured");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    async fn delete_matching(&self, pattern: &str) -> anyhow::Result<usize> {
        let mut conn = self
            .pool
            .get()
            .await
            .context("acquiring redis connection")?;

        let mut cursor: u64 = 0;
        let mut deleted = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .with_context(|| format!("scanning {}", pattern))?;

            if !keys.is_empty() {
                let _: () = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .with_context(|| format!("deleting keys for {}", pattern))?;
                deleted += keys.len();
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(deleted)
    }
}

#[async_trait]
impl CacheInvalidator for RedisCacheInvalidator {
    async fn invalidate_appointment_cache(
        &self,
        patient_id: Option<Uuid>,
        practitioner_id: Option<Uuid>,
    ) -> Result<(), CacheError> {
        let patterns = patient_id
            .map(patient_key_pattern)
            .into_iter()
            .chain(practitioner_id.map(practitioner_key_pattern));

        for pattern in patterns {
            let deleted = self.delete_matching(&pattern).await?;
            debug!("Invalidated {} cached keys matching {}", deleted, pattern);
        }
        Ok(())
    }
}
