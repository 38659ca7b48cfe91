use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<i64, Arc<Mutex<()>>>;

/// One async mutex per key, created on first use and dropped once nobody holds or awaits it.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<LockMap>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: i64) -> KeyedGuard {
        let mutex = self.locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        KeyedGuard {
            guard: Some(mutex.lock_owned().await),
            key,
            locks: Arc::clone(&self.locks),
        }
    }
}

pub struct KeyedGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: i64,
    locks: Arc<LockMap>,
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        self.guard.take();
        // the map's own reference is the only one left when no task holds or waits on the key
        self.locks.remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
