//! In-process backing store.
//!
//! Used by tests and by embedders that supply their own durability. Can be
//! given a quota and switched into an "unavailable" state to reproduce
//! full or disabled host storage.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};
use crate::storage::backend::{entry_size, BackingStore};

/// Key-value map held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota: Option<u64>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// An unbounded, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty store that rejects writes past `bytes` (UTF-16 estimate).
    #[must_use]
    pub fn with_quota(bytes: u64) -> Self {
        Self {
            quota: Some(bytes),
            ..Self::default()
        }
    }

    /// Make every operation fail with `StorageUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(Error::StorageUnavailable(
                "storage is disabled in this environment".to_string(),
            ));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BackingStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_available()?;
        let mut entries = self.lock();

        if let Some(quota) = self.quota {
            let others: u64 = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| entry_size(k, v))
                .sum();
            let needed = others + entry_size(key, value);
            if needed > quota {
                return Err(Error::QuotaExceeded {
                    needed,
                    budget: quota,
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.check_available()?;
        Ok(self.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::namespace_usage;

    #[test]
    fn test_crud() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
        assert_eq!(store.keys().unwrap(), vec!["k".to_string()]);

        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_quota_rejects_oversized_write() {
        let store = MemoryStore::with_quota(20);
        store.set("a", "1234").unwrap(); // 10 bytes
        let err = store.set("b", "123456").unwrap_err(); // would total 24
        assert!(matches!(err, Error::QuotaExceeded { needed: 24, budget: 20 }));
        assert_eq!(store.get("b").unwrap(), None);
    }

    #[test]
    fn test_quota_counts_replacement_not_sum() {
        let store = MemoryStore::with_quota(20);
        store.set("a", "12345678").unwrap(); // 18 bytes
        store.set("a", "87654321").unwrap(); // replaces, still 18
        assert_eq!(namespace_usage(&store).unwrap(), 18);
    }

    #[test]
    fn test_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.get("k"), Err(Error::StorageUnavailable(_))));
        assert!(matches!(store.set("k", "v"), Err(Error::StorageUnavailable(_))));
        store.set_unavailable(false);
        assert!(store.set("k", "v").is_ok());
    }
}
