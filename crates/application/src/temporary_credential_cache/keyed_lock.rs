use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key async mutexes. Entries are dropped once no task holds or waits
/// on them.
#[derive(Clone, Default)]
pub(super) struct KeyedMintLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedMintLocks {
    pub(super) async fn lock(&self, key: String) -> KeyedMintGuard {
        let mutex = Arc::clone(&self.locks.entry(key.clone()).or_default());
        let guard = mutex.lock_owned().await;

        KeyedMintGuard {
            locks: Arc::clone(&self.locks),
            key,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.locks.len()
    }
}

pub(super) struct KeyedMintGuard {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyedMintGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
