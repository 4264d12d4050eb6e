use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::{StorageError, UserRecord, UserStore};

/// In-memory user store behind the same trait as the redis one. Entry-level
/// locking in the map gives the same acquire atomicity.
#[derive(Clone, Debug, Default)]
pub struct MemoryUserStore {
    records: Arc<DashMap<i64, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
        }
    }

    pub fn record(&self, user_id: i64) -> Option<UserRecord> {
        self.records.get(&user_id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn register(&self, user_id: i64) -> Result<bool, StorageError> {
        self.records.entry(user_id).or_insert_with(|| UserRecord::new(user_id));
        Ok(true)
    }

    async fn exists(&self, user_id: i64) -> Result<bool, StorageError> {
        Ok(self.records.contains_key(&user_id))
    }

    async fn is_downloading(&self, user_id: i64) -> Result<bool, StorageError> {
        Ok(self
            .records
            .get(&user_id)
            .map(|entry| entry.is_downloading)
            .unwrap_or(false))
    }

    async fn try_acquire_download(&self, user_id: i64) -> Result<bool, StorageError> {
        let mut entry = self.records.entry(user_id).or_insert_with(|| UserRecord::new(user_id));
        if entry.is_downloading {
            Ok(false)
        } else {
            entry.is_downloading = true;
            Ok(true)
        }
    }

    async fn release_download(&self, user_id: i64) -> Result<(), StorageError> {
        if let Some(mut entry) = self.records.get_mut(&user_id) {
            entry.is_downloading = false;
        }
        Ok(())
    }

    async fn count_users(&self) -> Result<u64, StorageError> {
        Ok(self.records.len() as u64)
    }
}
