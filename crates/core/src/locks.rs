//! Per-key mutual exclusion.
//!
//! The map itself is guarded by a short-lived mutex; the per-key guard is an
//! owned `ArcMutexGuard` so callers can hold it across blocking work without
//! borrowing the map.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

use crate::error::{HubError, Result};

/// Whether a contended key waits or fails immediately with `Busy`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockPolicy {
    #[default]
    Wait,
    FailFast,
}

/// Owned guard for one key.
pub struct LockGuard {
    key: String,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("key", &self.key).finish()
    }
}

/// A map of named mutexes created on first use.
#[derive(Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock();
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the lock for `key` according to `policy`.
    pub fn acquire(&self, key: &str, policy: LockPolicy) -> Result<LockGuard> {
        let slot = self.slot(key);
        let guard = match policy {
            LockPolicy::Wait => slot.lock_arc(),
            LockPolicy::FailFast => slot
                .try_lock_arc()
                .ok_or_else(|| HubError::Busy(key.to_string()))?,
        };
        Ok(LockGuard {
            key: key.to_string(),
            _guard: guard,
        })
    }

    /// Drop map entries nobody is holding or waiting on.
    pub fn prune(&self) {
        self.inner.lock().retain(|_, slot| Arc::strong_count(slot) > 1);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fail_fast_reports_busy_while_held() {
        let locks = KeyedLocks::new();
        let held = locks.acquire("skill-a", LockPolicy::Wait).unwrap();
        let err = locks.acquire("skill-a", LockPolicy::FailFast).unwrap_err();
        assert!(err.is_retryable());
        assert!(locks.acquire("skill-b", LockPolicy::FailFast).is_ok());
        drop(held);
        assert!(locks.acquire("skill-a", LockPolicy::FailFast).is_ok());
    }

    #[test]
    fn waiters_on_same_key_are_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_seen = max_seen.clone();
                thread::spawn(move || {
                    let _g = locks.acquire("repo", LockPolicy::Wait).unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn prune_keeps_held_entries() {
        let locks = KeyedLocks::new();
        let _held = locks.acquire("a", LockPolicy::Wait).unwrap();
        drop(locks.acquire("b", LockPolicy::Wait).unwrap());
        locks.prune();
        assert_eq!(locks.len(), 1);
    }
}
