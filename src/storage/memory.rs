//! In-memory snapshot store for tests and embedding.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::traits::SnapshotStore;
use crate::error::{QueueError, Result};

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail (persistence failure injection).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Raw document contents, if any.
    pub fn document(&self, key: &str) -> Option<String> {
        self.documents.lock().ok().and_then(|docs| docs.get(key).cloned())
    }
}

impl SnapshotStore for MemoryStore {
    fn load_raw(&self, key: &str) -> Result<Option<String>> {
        let docs = self.documents.lock().map_err(|e| QueueError::Storage(e.to_string()))?;
        Ok(docs.get(key).cloned())
    }

    fn save_raw(&self, key: &str, contents: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(QueueError::Storage(format!("write to '{}' rejected", key)));
        }
        let mut docs = self.documents.lock().map_err(|e| QueueError::Storage(e.to_string()))?;
        docs.insert(key.to_string(), contents.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let store = MemoryStore::new();
        store.save_raw("k", "v").unwrap();
        assert_eq!(store.load_raw("k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.document("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_fail_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(matches!(store.save_raw("k", "v"), Err(QueueError::Storage(_))));
        assert_eq!(store.load_raw("k").unwrap(), None);

        store.set_fail_writes(false);
        assert!(store.save_raw("k", "v").is_ok());
    }
}
