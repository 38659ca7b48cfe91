use dashmap::DashMap;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

#[derive(Clone, Debug)]
struct Entry<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Entry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process key/value store with optional per-entry expiry.
#[derive(Clone, Debug)]
pub struct MemoryCache<T: Clone> {
    cache: Arc<DashMap<String, Entry<T>>>,
}

impl<T: Clone> MemoryCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Arc::new(DashMap::with_capacity(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        if let Some(entry) = self.cache.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }

        // a fresh value set since the read above must survive
        self.cache.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    pub fn set(&self, key: &str, value: T, ttl: Option<Duration>) {
        let entry = Entry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.cache.insert(key.to_string(), entry);
    }

    pub fn del(&self, key: &str) {
        self.cache.remove(key);
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.cache.len();
        self.cache.retain(|_, entry| !entry.is_expired(now));
        before - self.cache.len()
    }
}
