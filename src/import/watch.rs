//! Polling directory watcher that imports each new prompt file once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::import_file;
use crate::error::QueueError;
use crate::scheduler::QueueHandle;

/// File extensions picked up by the watcher
pub const WATCH_EXTENSIONS: &[&str] = &["txt", "yml", "yaml", "json", "csv"];

/// Scans a directory on an interval. Files already present at the first scan
/// are imported too.
#[derive(Debug)]
pub struct DirectoryWatcher {
    dir: PathBuf,
    interval: Duration,
    seen: HashSet<PathBuf>,
}

impl DirectoryWatcher {
    pub fn new(dir: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            interval,
            seen: HashSet::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files matching [`WATCH_EXTENSIONS`] not returned by an earlier scan, sorted
    pub fn scan(&mut self) -> Vec<PathBuf> {
        let base = glob::Pattern::escape(&self.dir.to_string_lossy());
        let mut found = Vec::new();

        for ext in WATCH_EXTENSIONS {
            let pattern = format!("{}/*.{}", base, ext);
            let paths = match glob::glob(&pattern) {
                Ok(paths) => paths,
                Err(e) => {
                    log::warn!("Invalid watch pattern {}: {}", pattern, e);
                    continue;
                }
            };
            for path in paths.flatten() {
                if path.is_file() && self.seen.insert(path.clone()) {
                    found.push(path);
                }
            }
        }

        found.sort();
        found
    }

    /// Poll until the engine stops, importing new files as they appear.
    pub async fn run(mut self, handle: QueueHandle) {
        log::info!("Watching {} for prompt files", self.dir.display());
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            ticker.tick().await;
            for path in self.scan() {
                match import_file(&handle, &path).await {
                    Ok(_) => {}
                    Err(QueueError::EngineStopped) => {
                        log::info!("Engine stopped, watcher exiting");
                        return;
                    }
                    Err(e) => log::warn!("Watch import of {} failed: {}", path.display(), e),
                }
            }
        }
    }

    pub fn spawn(self, handle: QueueHandle) -> JoinHandle<()> {
        tokio::spawn(self.run(handle))
    }
}
