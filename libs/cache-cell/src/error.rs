use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache pool error: {0}")]
    Pool(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error(transparent)]
    Invalidation(#[from] anyhow::Error),
}
