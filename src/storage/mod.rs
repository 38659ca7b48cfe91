mod error;
mod memory;
pub mod schema;
mod turso;
mod upstash;

pub use error::StorageError;
pub use memory::MemoryCache;
pub use turso::TursoClient;
pub(crate) use turso::{encode_time, optional_text, row_required_time, row_text, row_time};
pub use upstash::RedisClient;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

#[async_trait]
pub trait Cache: Send + Sync + 'static {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, StorageError>;
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError>;
    async fn del(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Clone)]
pub struct StorageManager {
    turso: TursoClient,
    redis: Option<RedisClient>,
}

impl StorageManager {
    pub async fn new(turso_url: &str, turso_token: &str, redis_url: Option<&str>) -> Result<Self, StorageError> {
        let turso = TursoClient::new(turso_url, turso_token).await?;
        let redis = match redis_url {
            Some(url) => Some(RedisClient::new(url).await?),
            None => {
                info!("No redis url configured, transient state stays in memory");
                None
            }
        };

        Ok(Self { turso, redis })
    }

    pub fn turso(&self) -> &TursoClient {
        &self.turso
    }

    pub fn redis(&self) -> Option<&RedisClient> {
        self.redis.as_ref()
    }
}
