//! Per-user mutual exclusion.
//!
//! Every mutating service operation holds its user's lock from the first
//! read to the commit. The registry hands out one `tokio` mutex per key;
//! waiters on the same key are served in FIFO order, different keys never
//! contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;

/// Errors that can occur while acquiring a user lock.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// The lock was not acquired within the configured bound.
    #[error("timed out after {waited_ms}ms waiting for lock {key}")]
    Timeout {
        /// The contended key.
        key: String,
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// The registry map was poisoned by a panicking thread.
    #[error("lock registry poisoned")]
    RegistryPoisoned,
}

/// Proof that the holder owns a key's lock. Released on drop.
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    _held: OwnedMutexGuard<()>,
}

impl KeyGuard {
    /// The key this guard locks.
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Lazily created, never evicted, per-key locks.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `key`, created on first request.
    ///
    /// The same key always yields the same lock instance.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::RegistryPoisoned`] if the registry is poisoned.
    pub fn get_or_create(&self, key: &str) -> Result<Arc<tokio::sync::Mutex<()>>, GuardError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_poisoned| GuardError::RegistryPoisoned)?;
        if let Some(lock) = locks.get(key) {
            return Ok(Arc::clone(lock));
        }
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(key.to_owned(), Arc::clone(&lock));
        Ok(lock)
    }

    /// Wait for exclusive ownership of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::RegistryPoisoned`] if the registry is poisoned.
    pub async fn acquire(&self, key: &str) -> Result<KeyGuard, GuardError> {
        let lock = self.get_or_create(key)?;
        let held = lock.lock_owned().await;
        Ok(KeyGuard {
            key: key.to_owned(),
            _held: held,
        })
    }

    /// Wait at most `timeout` for exclusive ownership of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Timeout`] if the lock is still held elsewhere
    /// when the bound expires.
    pub async fn acquire_timeout(&self, key: &str, timeout: Duration) -> Result<KeyGuard, GuardError> {
        let lock = self.get_or_create(key)?;
        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(held) => Ok(KeyGuard {
                key: key.to_owned(),
                _held: held,
            }),
            Err(_elapsed) => {
                tracing::warn!(key, timeout_ms = timeout.as_millis(), "Lock wait timed out");
                Err(GuardError::Timeout {
                    key: key.to_owned(),
                    waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Number of keys that have a lock.
    pub fn len(&self) -> usize {
        self.locks.lock().map_or(0, |locks| locks.len())
    }

    /// Whether no lock has been created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
