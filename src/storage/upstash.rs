use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};

use std::{sync::Arc, time::Duration};

use crate::storage::StorageError;

use super::Cache;

#[derive(Clone)]
pub struct RedisClient {
    inner: Arc<redis::Client>,
}

impl RedisClient {
    pub async fn new(url: &str) -> Result<Self, StorageError> {
        info!("Initializing RedisClient...");
        let client = Self {
            inner: Arc::new(Client::open(url)?),
        };
        client.ping().await?;
        info!("RedisClient initialized");
        Ok(client)
    }

    pub async fn get_connection(&self) -> Result<MultiplexedConnection, StorageError> {
        let conn = self.inner.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    pub async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(StorageError::Redis("Redis connection test failed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for RedisClient {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;

        match value {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let mut conn = self.get_connection().await?;
        let serialized = serde_json::to_string(value)?;
        match ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, serialized, ttl.as_secs().max(1)).await?,
            None => conn.set::<_, _, ()>(key, serialized).await?,
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.get_connection().await?;
        conn.del::<_, i32>(key).await?;
        Ok(())
    }
}
