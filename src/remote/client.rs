//! Remote Operation Client contract and quota classification

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Job;

/// Markers (lowercased) that identify provider quota exhaustion in an error message
const QUOTA_MARKERS: &[&str] = &[
    "429",
    "resource_exhausted",
    "resource exhausted",
    "rate limit",
    "quota exceeded",
    "too many requests",
];

/// Returns true if `message` carries any provider quota marker
pub fn is_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    QUOTA_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Parameters for one remote generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub aspect_ratio: String,
    pub negative_prompt: Option<String>,
    pub seed: Option<u32>,
    pub person_generation: Option<String>,
}

impl GenerationRequest {
    /// Map a job's request parameters; optional fields are carried only when set.
    pub fn from_job(job: &Job, aspect_ratio: &str) -> Self {
        Self {
            prompt: job.prompt.clone(),
            aspect_ratio: aspect_ratio.to_string(),
            negative_prompt: job.negative_prompt.clone().filter(|s| !s.is_empty()),
            // A zero seed means "unset"
            seed: job.seed.filter(|s| *s != 0),
            person_generation: job.person_generation.clone().filter(|s| !s.is_empty()),
        }
    }
}

/// A produced artifact reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub uri: String,
    pub mime_type: Option<String>,
}

/// Handle to a long-running remote operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub done: bool,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl Operation {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: false,
            artifacts: Vec::new(),
        }
    }

    pub fn first_artifact(&self) -> Option<&Artifact> {
        self.artifacts.first()
    }
}

/// Errors that can occur talking to the remote provider
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Other(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Quota exhaustion, by status code or message marker
    pub fn is_quota(&self) -> bool {
        match self {
            RemoteError::Http { status: 429, .. } => true,
            other => is_quota_message(&other.to_string()),
        }
    }
}

/// Start/poll/download protocol of the remote video provider.
///
/// `poll` is idempotent: it returns the current state of the operation and never
/// advances it.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn start(&self, credential: &str, request: &GenerationRequest) -> Result<Operation, RemoteError>;

    async fn poll(&self, credential: &str, operation: &Operation) -> Result<Operation, RemoteError>;

    async fn download(&self, credential: &str, artifact: &Artifact, destination: &Path) -> Result<(), RemoteError>;
}
