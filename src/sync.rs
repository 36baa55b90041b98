//! # Keyed Mutual Exclusion
//!
//! A small service that serializes async operations sharing a string key.
//! It is constructed once and injected wherever serialization is needed, so
//! independent owners can use independent keys (or independent services).
//!
//! Three modes decide what happens when the key is already held:
//!
//! - [`LockMode::Discard`]: the new call is dropped (double-tap protection)
//! - [`LockMode::Merge`]: the new call waits for the running holder and then
//!   reports [`Acquired::Merged`] without running itself
//! - [`LockMode::Wait`]: the new call queues and runs afterwards, strictly FIFO

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Behaviour of [`KeyedMutex::acquire`] when the key is busy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Discard,
    Merge,
    Wait,
}

/// Result of an acquisition attempt
#[derive(Debug)]
pub enum Acquired {
    /// The caller owns the key until the guard is dropped
    Held(KeyedGuard),
    /// Key was busy in discard mode; the caller must not run
    Discarded,
    /// Key was busy in merge mode; the running holder has now finished
    Merged,
}

impl Acquired {
    pub fn is_held(&self) -> bool {
        matches!(self, Acquired::Held(_))
    }
}

/// Ownership of one key; released on drop
#[derive(Debug)]
pub struct KeyedGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyedGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Process-wide (or embedder-scoped) registry of named async locks
#[derive(Debug, Default)]
pub struct KeyedMutex {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Try to take `key` according to `mode`
    pub async fn acquire(&self, key: &str, mode: LockMode) -> Acquired {
        let lock = self.lock_for(key);

        if let Ok(guard) = Arc::clone(&lock).try_lock_owned() {
            return Acquired::Held(KeyedGuard {
                key: key.to_string(),
                _guard: guard,
            });
        }

        match mode {
            LockMode::Discard => {
                tracing::debug!(key, "lock busy, discarding call");
                Acquired::Discarded
            }
            LockMode::Merge => {
                tracing::debug!(key, "lock busy, merging into running call");
                drop(lock.lock().await);
                Acquired::Merged
            }
            LockMode::Wait => {
                tracing::debug!(key, "lock busy, queueing call");
                Acquired::Held(KeyedGuard {
                    key: key.to_string(),
                    _guard: lock.lock_owned().await,
                })
            }
        }
    }

    /// Run `operation` while holding `key`.
    ///
    /// Returns `None` when the mode decided the operation must not run.
    pub async fn run<F, T>(&self, key: &str, mode: LockMode, operation: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        match self.acquire(key, mode).await {
            Acquired::Held(_guard) => Some(operation.await),
            Acquired::Discarded | Acquired::Merged => None,
        }
    }

    /// Whether some caller currently holds `key`
    pub fn is_locked(&self, key: &str) -> bool {
        self.lock_for(key).try_lock().is_err()
    }
}
