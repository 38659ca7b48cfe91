use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::storage::{Cache, MemoryCache, RedisClient, StorageError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheType {
    Memory,
    Redis,
    Both,
}

#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub cache_type: CacheType,
    pub ttl: Option<Duration>,
    pub prefix: Option<String>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            cache_type: CacheType::Both,
            ttl: None,
            prefix: None,
        }
    }
}

/// Two-tier cache. Without a redis client every cache type falls back to memory.
#[derive(Clone)]
pub struct CacheManager {
    memory: MemoryCache<String>,
    redis: Option<RedisClient>,
}

impl CacheManager {
    pub fn new(memory_capacity: usize, redis: Option<RedisClient>) -> Self {
        info!("Initializing cache manager with memory capacity: {}", memory_capacity);
        Self {
            memory: MemoryCache::new(memory_capacity),
            redis,
        }
    }

    pub fn memory_only(memory_capacity: usize) -> Self {
        Self::new(memory_capacity, None)
    }

    fn effective(&self, cache_type: CacheType) -> CacheType {
        match (cache_type, &self.redis) {
            (_, None) => CacheType::Memory,
            (cache_type, Some(_)) => cache_type,
        }
    }

    pub async fn get<T: DeserializeOwned + Serialize + Send>(
        &self,
        key: &str,
        options: &CacheOptions,
    ) -> Result<Option<T>, StorageError> {
        let key = self.build_key(key, options);

        match (self.effective(options.cache_type), &self.redis) {
            (CacheType::Redis, Some(redis)) => redis.get::<T>(&key).await,
            (CacheType::Both, Some(redis)) => {
                if let Some(value) = self.memory.get(&key) {
                    return Ok(Some(serde_json::from_str(&value)?));
                }

                match redis.get::<T>(&key).await? {
                    Some(value) => {
                        self.memory.set(&key, serde_json::to_string(&value)?, options.ttl);
                        Ok(Some(value))
                    }
                    None => Ok(None),
                }
            }
            _ => match self.memory.get(&key) {
                Some(value) => Ok(Some(serde_json::from_str(&value)?)),
                None => Ok(None),
            },
        }
    }

    pub async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        options: &CacheOptions,
    ) -> Result<(), StorageError> {
        let key = self.build_key(key, options);

        match (self.effective(options.cache_type), &self.redis) {
            (CacheType::Redis, Some(redis)) => redis.set(&key, value, options.ttl).await,
            (CacheType::Both, Some(redis)) => {
                self.memory.set(&key, serde_json::to_string(value)?, options.ttl);
                redis.set(&key, value, options.ttl).await
            }
            _ => {
                self.memory.set(&key, serde_json::to_string(value)?, options.ttl);
                Ok(())
            }
        }
    }

    pub async fn del(&self, key: &str, options: &CacheOptions) -> Result<(), StorageError> {
        let key = self.build_key(key, options);

        self.memory.del(&key);
        match (self.effective(options.cache_type), &self.redis) {
            (CacheType::Redis | CacheType::Both, Some(redis)) => redis.del(&key).await,
            _ => Ok(()),
        }
    }

    pub fn purge_expired(&self) -> usize {
        self.memory.purge_expired()
    }

    fn build_key(&self, key: &str, options: &CacheOptions) -> String {
        match options.prefix {
            Some(ref prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }
}
