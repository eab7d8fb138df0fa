//! Storage layer for vidqueue - whole-document snapshots.
//!
//! Two independent documents are kept: `settings` (a [`Settings`] object) and
//! `queue` (the job array). Each is overwritten wholesale on every save; there
//! is no append log and no schema versioning.

mod file;
mod memory;
mod traits;

use crate::domain::{Job, Settings};
use crate::error::Result;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use traits::{SnapshotStore, load_or_default, save};

/// Document key for the settings snapshot
pub const SETTINGS_KEY: &str = "settings";

/// Document key for the job array snapshot
pub const QUEUE_KEY: &str = "queue";

/// Both persisted documents, as read from a store.
#[derive(Debug, Clone, Default)]
pub struct PersistedState {
    pub settings: Settings,
    pub jobs: Vec<Job>,
}

impl PersistedState {
    /// Load both documents; missing or unreadable documents yield defaults.
    pub fn load(store: &dyn SnapshotStore) -> Self {
        Self {
            settings: load_or_default(store, SETTINGS_KEY),
            jobs: load_or_default(store, QUEUE_KEY),
        }
    }

    pub fn save_settings(&self, store: &dyn SnapshotStore) -> Result<()> {
        save(store, SETTINGS_KEY, &self.settings)
    }

    pub fn save_jobs(&self, store: &dyn SnapshotStore) -> Result<()> {
        save(store, QUEUE_KEY, &self.jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobRequest, JobStatus};
    use tempfile::TempDir;

    #[test]
    fn test_load_empty_store() {
        let store = MemoryStore::new();
        let state = PersistedState::load(&store);
        assert!(state.jobs.is_empty());
        assert_eq!(state.settings, Settings::default());
    }

    #[test]
    fn test_persisted_state_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = JsonFileStore::new(temp_dir.path()).unwrap();
            let mut state = PersistedState::load(&store);
            state.settings.concurrency = 5;
            state
                .jobs
                .push(Job::from_request(JobRequest::new("a lighthouse at dawn"), "allow_all").unwrap());
            state.save_settings(&store).unwrap();
            state.save_jobs(&store).unwrap();
        }

        {
            let store = JsonFileStore::new(temp_dir.path()).unwrap();
            let state = PersistedState::load(&store);
            assert_eq!(state.settings.concurrency, 5);
            assert_eq!(state.jobs.len(), 1);
            assert_eq!(state.jobs[0].prompt, "a lighthouse at dawn");
            assert_eq!(state.jobs[0].status, JobStatus::Queued);
        }
    }
}
