//! Persistent store contract.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::Result;

/// Key/value store of whole documents, each overwritten on every save.
pub trait SnapshotStore: Send + Sync {
    /// Read the raw document for `key`, `None` if it was never written.
    fn load_raw(&self, key: &str) -> Result<Option<String>>;

    /// Replace the document for `key`.
    fn save_raw(&self, key: &str, contents: &str) -> Result<()>;
}

/// Load a typed document, falling back to `T::default()` when it is missing or unreadable.
pub fn load_or_default<T: DeserializeOwned + Default>(store: &dyn SnapshotStore, key: &str) -> T {
    match store.load_raw(key) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Ignoring unreadable '{}' document: {}", key, e);
                T::default()
            }
        },
        Ok(None) => T::default(),
        Err(e) => {
            log::warn!("Failed to load '{}' document: {}", key, e);
            T::default()
        }
    }
}

/// Serialize and save a typed document.
pub fn save<T: Serialize + ?Sized>(store: &dyn SnapshotStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(value)?;
    store.save_raw(key, &raw)
}
