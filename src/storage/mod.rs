mod memory;
mod redis;

pub use memory::MemoryUserStore;
pub use redis::RedisUserStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Other error: {0}")]
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub is_downloading: bool,
    /// Set at first contact, never changed afterwards.
    pub join_date: NaiveDate,
}

impl UserRecord {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            is_downloading: false,
            join_date: chrono::Utc::now().date_naive(),
        }
    }
}

/// Per-user record store. The download slot is the only mutable piece of
/// state; `try_acquire_download` must be atomic so that two workers
/// handling the same user cannot both win it.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Create the record if absent. Safe to call concurrently for the same
    /// user; exactly one record ever exists. Returns whether the record is
    /// present afterwards.
    async fn register(&self, user_id: i64) -> Result<bool, StorageError>;

    async fn exists(&self, user_id: i64) -> Result<bool, StorageError>;

    async fn is_downloading(&self, user_id: i64) -> Result<bool, StorageError>;

    /// Acquire the user's download slot if it is free. Returns true only
    /// for the caller that actually obtained it.
    async fn try_acquire_download(&self, user_id: i64) -> Result<bool, StorageError>;

    /// Unconditional release of the download slot.
    async fn release_download(&self, user_id: i64) -> Result<(), StorageError>;

    async fn count_users(&self) -> Result<u64, StorageError>;
}
