use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::sync::Arc;

use super::{StorageError, UserRecord, UserStore};

const USERS_KEY: &str = "users";

fn downloading_key(user_id: i64) -> String {
    format!("user:{}:downloading", user_id)
}

impl From<redis::RedisError> for StorageError {
    fn from(error: redis::RedisError) -> Self {
        StorageError::Redis(error.to_string())
    }
}

/// Redis-backed user store. Records live in one hash keyed by user id;
/// the busy flag is a per-user key so acquisition maps onto `SET NX`.
pub struct RedisUserStore {
    inner: Arc<Client>,
}

impl RedisUserStore {
    pub async fn new(url: &str) -> Result<Self, StorageError> {
        info!("Initializing RedisUserStore...");
        let client = Arc::new(Client::open(url)?);

        let mut conn = client.get_multiplexed_async_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(StorageError::Redis("Redis connection test failed".to_string()));
        }
        info!("Redis connection test successful");

        Ok(Self { inner: client })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StorageError> {
        Ok(self.inner.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl UserStore for RedisUserStore {
    async fn register(&self, user_id: i64) -> Result<bool, StorageError> {
        let mut conn = self.connection().await?;
        let record = serde_json::to_string(&UserRecord::new(user_id))?;
        // HSETNX keeps the first record when two workers race on first contact
        let created: bool = conn.hset_nx(USERS_KEY, user_id, record).await?;
        if created {
            info!("Registered new user {}", user_id);
        }
        Ok(conn.hexists(USERS_KEY, user_id).await?)
    }

    async fn exists(&self, user_id: i64) -> Result<bool, StorageError> {
        let mut conn = self.connection().await?;
        Ok(conn.hexists(USERS_KEY, user_id).await?)
    }

    async fn is_downloading(&self, user_id: i64) -> Result<bool, StorageError> {
        let mut conn = self.connection().await?;
        Ok(conn.exists(downloading_key(user_id)).await?)
    }

    async fn try_acquire_download(&self, user_id: i64) -> Result<bool, StorageError> {
        let mut conn = self.connection().await?;
        // SET NX makes check-and-acquire a single store operation
        Ok(conn.set_nx(downloading_key(user_id), 1).await?)
    }

    async fn release_download(&self, user_id: i64) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;
        let _: i64 = conn.del(downloading_key(user_id)).await?;
        Ok(())
    }

    async fn count_users(&self) -> Result<u64, StorageError> {
        let mut conn = self.connection().await?;
        Ok(conn.hlen(USERS_KEY).await?)
    }
}
