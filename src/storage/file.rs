//! JSON-file snapshot store: one `<key>.json` per document.

use std::fs;
use std::path::{Path, PathBuf};

use super::traits::SnapshotStore;
use crate::error::Result;

/// Stores each document as a pretty-printed JSON file under `base_path`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    base_path: PathBuf,
}

impl JsonFileStore {
    /// Create a new store rooted at the given directory (created if needed).
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a document.
    pub fn document_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", key))
    }
}

impl SnapshotStore for JsonFileStore {
    fn load_raw(&self, key: &str) -> Result<Option<String>> {
        let path = self.document_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn save_raw(&self, key: &str, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.base_path)?;
        let path = self.document_path(key);
        // Readers never observe a partially written document
        let tmp = self.base_path.join(format!(".{}.json.tmp", key));
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}
