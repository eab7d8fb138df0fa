//! Scripted in-process remote client for tests and dry runs

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::client::{Artifact, GenerationRequest, Operation, RemoteClient, RemoteError};

#[derive(Debug)]
struct MockOperation {
    prompt: String,
    polls_remaining: u32,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    operations: HashMap<String, MockOperation>,
    start_failures: HashMap<String, String>,
    poll_failures: HashMap<String, String>,
    download_failures: HashMap<String, String>,
    no_artifact: HashSet<String>,
    started: Vec<String>,
    completed: Vec<String>,
}

/// Remote client whose behaviour is scripted per prompt.
///
/// Every operation reports "not done" for `polls_before_done` polls. Failures
/// are one-shot: the next call for that prompt succeeds.
#[derive(Debug)]
pub struct MockRemoteClient {
    polls_before_done: u32,
    state: Mutex<MockState>,
}

impl Default for MockRemoteClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemoteClient {
    pub fn new() -> Self {
        Self::with_polls(1)
    }

    pub fn with_polls(polls_before_done: u32) -> Self {
        Self {
            polls_before_done,
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, MockState>, RemoteError> {
        self.state
            .lock()
            .map_err(|e| RemoteError::Other(format!("mock state poisoned: {}", e)))
    }

    fn script(&self, apply: impl FnOnce(&mut MockState)) {
        if let Ok(mut state) = self.state.lock() {
            apply(&mut state);
        }
    }

    /// Fail the next `start` for `prompt` with `message`
    pub fn fail_start(&self, prompt: &str, message: &str) {
        self.script(|s| {
            s.start_failures.insert(prompt.to_string(), message.to_string());
        });
    }

    /// Fail the next `poll` for `prompt` with `message`
    pub fn fail_poll(&self, prompt: &str, message: &str) {
        self.script(|s| {
            s.poll_failures.insert(prompt.to_string(), message.to_string());
        });
    }

    /// Fail the next `download` for `prompt` with `message`
    pub fn fail_download(&self, prompt: &str, message: &str) {
        self.script(|s| {
            s.download_failures.insert(prompt.to_string(), message.to_string());
        });
    }

    /// Complete operations for `prompt` without any artifact
    pub fn no_artifact(&self, prompt: &str) {
        self.script(|s| {
            s.no_artifact.insert(prompt.to_string());
        });
    }

    /// Prompts passed to `start`, in call order (failed calls included)
    pub fn started(&self) -> Vec<String> {
        self.state.lock().map(|s| s.started.clone()).unwrap_or_default()
    }

    /// Prompts whose artifact was downloaded, in completion order
    pub fn completed(&self) -> Vec<String> {
        self.state.lock().map(|s| s.completed.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RemoteClient for MockRemoteClient {
    async fn start(&self, _credential: &str, request: &GenerationRequest) -> Result<Operation, RemoteError> {
        let mut state = self.state()?;
        state.started.push(request.prompt.clone());
        if let Some(message) = state.start_failures.remove(&request.prompt) {
            return Err(RemoteError::Other(message));
        }

        state.next_id += 1;
        let name = format!("operations/mock-{}", state.next_id);
        state.operations.insert(
            name.clone(),
            MockOperation {
                prompt: request.prompt.clone(),
                polls_remaining: self.polls_before_done,
            },
        );
        Ok(Operation::pending(name))
    }

    async fn poll(&self, _credential: &str, operation: &Operation) -> Result<Operation, RemoteError> {
        let mut state = self.state()?;
        let prompt = state
            .operations
            .get(&operation.name)
            .map(|op| op.prompt.clone())
            .ok_or_else(|| RemoteError::InvalidResponse(format!("unknown operation {}", operation.name)))?;

        if let Some(message) = state.poll_failures.remove(&prompt) {
            return Err(RemoteError::Other(message));
        }

        let no_artifact = state.no_artifact.contains(&prompt);
        let op = state
            .operations
            .get_mut(&operation.name)
            .ok_or_else(|| RemoteError::InvalidResponse(format!("unknown operation {}", operation.name)))?;

        if op.polls_remaining > 0 {
            op.polls_remaining -= 1;
        }
        let mut updated = Operation::pending(operation.name.clone());
        if op.polls_remaining == 0 {
            updated.done = true;
            if !no_artifact {
                updated.artifacts.push(Artifact {
                    uri: format!("mock://{}", operation.name),
                    mime_type: Some("video/mp4".to_string()),
                });
            }
        }
        Ok(updated)
    }

    async fn download(&self, _credential: &str, artifact: &Artifact, destination: &Path) -> Result<(), RemoteError> {
        let mut state = self.state()?;
        let name = artifact.uri.trim_start_matches("mock://");
        let prompt = state
            .operations
            .get(name)
            .map(|op| op.prompt.clone())
            .ok_or_else(|| RemoteError::InvalidResponse(format!("unknown artifact {}", artifact.uri)))?;

        if let Some(message) = state.download_failures.remove(&prompt) {
            return Err(RemoteError::Other(message));
        }

        std::fs::write(destination, prompt.as_bytes())?;
        state.completed.push(prompt);
        Ok(())
    }
}
