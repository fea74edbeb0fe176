//! Backing store trait.
//!
//! Models the host's synchronous, string-keyed, quota-bounded key-value API.
//! All methods take `&self`; implementations use interior mutability.

use std::sync::Arc;

use crate::error::Result;

/// A synchronous string key-value namespace.
pub trait BackingStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value.
    ///
    /// # Errors
    ///
    /// Returns `Error::QuotaExceeded` when the write does not fit, or
    /// `Error::StorageUnavailable` for any other failure.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` if the store cannot be written.
    fn remove(&self, key: &str) -> Result<()>;

    /// Every key in this namespace.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` if the store cannot be read.
    fn keys(&self) -> Result<Vec<String>>;

    /// Opaque token that changes when another execution context writes.
    ///
    /// `None` means the backend cannot tell, and callers must compare
    /// values instead.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` if the store cannot be read.
    fn change_token(&self) -> Result<Option<u64>> {
        Ok(None)
    }
}

impl<T: BackingStore + ?Sized> BackingStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        (**self).keys()
    }

    fn change_token(&self) -> Result<Option<u64>> {
        (**self).change_token()
    }
}

/// Estimated bytes an entry occupies: two bytes per UTF-16 unit of key and value.
#[must_use]
pub fn entry_size(key: &str, value: &str) -> u64 {
    let units = key.encode_utf16().count() + value.encode_utf16().count();
    (units as u64) * 2
}

/// Estimated total bytes used by every entry in the namespace.
///
/// # Errors
///
/// Returns an error if the backend cannot list or read its entries.
pub fn namespace_usage<B: BackingStore + ?Sized>(store: &B) -> Result<u64> {
    let mut total = 0;
    for key in store.keys()? {
        if let Some(value) = store.get(&key)? {
            total += entry_size(&key, &value);
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_size_counts_utf16_units() {
        assert_eq!(entry_size("ab", "cd"), 8);
        // 'é' is one UTF-16 unit, '😀' is two.
        assert_eq!(entry_size("é", "😀"), 6);
    }
}
