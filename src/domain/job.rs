//! Job record and related types
//!
//! A Job is one queued request for a generated video. Its request parameters are
//! fixed at creation; everything else is runtime state driven by the engine:
//!
//! ```text
//! queued -> running -> done
//!                   -> error -> queued (explicit retry only)
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};
use crate::id::{generate_job_id, now_ms};

/// Opaque job identifier
pub type JobId = String;

/// Progress reported the moment a job is dispatched
pub const INITIAL_PROGRESS: u8 = 5;

/// ETA guess (seconds) at dispatch
pub const INITIAL_ETA_SECS: u32 = 90;

/// Progress never reaches 100 until the artifact is on disk
pub const MAX_RUNNING_PROGRESS: u8 = 95;

/// Status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for a free slot
    Queued,
    /// Dispatched to a runner
    Running,
    /// Artifact downloaded
    Done,
    /// Dispatch failed; retryable
    Error,
}

impl JobStatus {
    /// Returns true if no runner will touch the job again without a retry
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Raw job specification as produced by the CLI, imports and the watcher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub seed: Option<u32>,
    pub person_generation: Option<String>,
}

impl JobRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_person_generation(mut self, person_generation: impl Into<String>) -> Self {
        self.person_generation = Some(person_generation.into());
        self
    }
}

/// A unit of work tracked by the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    //=== Identity & request (immutable) ===
    pub id: JobId,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_generation: Option<String>,

    //=== Runtime state ===
    pub status: JobStatus,
    /// Percentage in [0, 100]
    #[serde(default)]
    pub progress: u8,
    /// Heuristic seconds remaining
    #[serde(default)]
    pub eta_secs: u32,
    /// Number of times the job left `queued` for `running`
    #[serde(default)]
    pub attempts: u32,
    /// Present only when status is `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Present only when status is `done`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    //=== Timestamps ===
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Job {
    /// Build a queued job from a raw request.
    ///
    /// Empty optional strings are dropped; a missing person-generation mode takes
    /// `default_person_generation`.
    pub fn from_request(request: JobRequest, default_person_generation: &str) -> Result<Self> {
        let prompt = request.prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(QueueError::InvalidRequest("prompt is empty".to_string()));
        }

        let now = now_ms();
        Ok(Self {
            id: generate_job_id(),
            prompt,
            negative_prompt: non_empty(request.negative_prompt),
            seed: request.seed,
            person_generation: non_empty(request.person_generation)
                .or_else(|| non_empty(Some(default_person_generation.to_string()))),
            status: JobStatus::Queued,
            progress: 0,
            eta_secs: 0,
            attempts: 0,
            error: None,
            output: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }

    /// `queued -> running`. Returns false (and changes nothing) from any other status.
    pub fn begin_dispatch(&mut self) -> bool {
        if self.status != JobStatus::Queued {
            return false;
        }
        self.attempts += 1;
        self.status = JobStatus::Running;
        self.progress = INITIAL_PROGRESS;
        self.eta_secs = INITIAL_ETA_SECS;
        self.error = None;
        self.output = None;
        self.touch();
        true
    }

    /// Apply a heuristic progress tick. Ignored unless running; progress never goes backwards.
    pub fn record_progress(&mut self, progress: u8, eta_secs: u32) {
        if self.status != JobStatus::Running {
            return;
        }
        self.progress = self.progress.max(progress.min(MAX_RUNNING_PROGRESS));
        self.eta_secs = eta_secs;
        self.touch();
    }

    /// `running -> done`
    pub fn complete(&mut self, output: PathBuf) {
        self.status = JobStatus::Done;
        self.progress = 100;
        self.eta_secs = 0;
        self.output = Some(output);
        self.error = None;
        self.touch();
    }

    /// `running -> error`
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Error;
        self.progress = 0;
        self.eta_secs = 0;
        self.error = Some(message.into());
        self.output = None;
        self.touch();
    }

    /// `error -> queued`. Attempts are kept. Returns false from any other status.
    pub fn requeue(&mut self) -> bool {
        if self.status != JobStatus::Error {
            return false;
        }
        self.status = JobStatus::Queued;
        self.error = None;
        self.touch();
        true
    }

    /// Startup reclassification: anything not `done` goes back to `queued` at 0%.
    ///
    /// Returns true if the job was not already a clean queued job.
    pub fn recover(&mut self) -> bool {
        if self.status == JobStatus::Done {
            return false;
        }
        let changed = self.status != JobStatus::Queued || self.progress != 0 || self.error.is_some();
        self.status = JobStatus::Queued;
        self.progress = 0;
        self.eta_secs = 0;
        self.error = None;
        self.output = None;
        if changed {
            self.touch();
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(prompt: &str) -> Job {
        Job::from_request(JobRequest::new(prompt), "allow_all").unwrap()
    }

    #[test]
    fn test_from_request_defaults() {
        let job = queued("  a cat on a skateboard  ");
        assert_eq!(job.prompt, "a cat on a skateboard");
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.person_generation.as_deref(), Some("allow_all"));
        assert!(job.negative_prompt.is_none());
        assert!(job.error.is_none());
        assert!(job.output.is_none());
        assert!(job.id.starts_with("job-"));
    }

    #[test]
    fn test_from_request_rejects_empty_prompt() {
        let result = Job::from_request(JobRequest::new("   \n\t"), "allow_all");
        assert!(matches!(result, Err(QueueError::InvalidRequest(_))));
    }

    #[test]
    fn test_from_request_normalizes_optional_fields() {
        let request = JobRequest::new("sunset")
            .with_negative_prompt("  ")
            .with_seed(0)
            .with_person_generation("dont_allow");
        let job = Job::from_request(request, "allow_all").unwrap();
        assert!(job.negative_prompt.is_none());
        assert_eq!(job.seed, Some(0));
        assert_eq!(job.person_generation.as_deref(), Some("dont_allow"));
    }

    #[test]
    fn test_begin_dispatch_only_from_queued() {
        let mut job = queued("x");
        assert!(job.begin_dispatch());
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.progress, INITIAL_PROGRESS);
        assert_eq!(job.eta_secs, INITIAL_ETA_SECS);

        assert!(!job.begin_dispatch());
        assert_eq!(job.attempts, 1);
    }

    #[test]
    fn test_record_progress_is_monotonic_and_capped() {
        let mut job = queued("x");
        job.begin_dispatch();
        job.record_progress(40, 60);
        assert_eq!(job.progress, 40);
        job.record_progress(20, 55);
        assert_eq!(job.progress, 40);
        assert_eq!(job.eta_secs, 55);
        job.record_progress(99, 5);
        assert_eq!(job.progress, MAX_RUNNING_PROGRESS);
    }

    #[test]
    fn test_record_progress_ignored_when_not_running() {
        let mut job = queued("x");
        job.record_progress(50, 10);
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn test_complete_sets_terminal_fields() {
        let mut job = queued("x");
        job.begin_dispatch();
        job.complete(PathBuf::from("/tmp/out.mp4"));
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress, 100);
        assert_eq!(job.eta_secs, 0);
        assert_eq!(job.output, Some(PathBuf::from("/tmp/out.mp4")));
        assert!(job.status.is_terminal());
    }

    #[test]
    fn test_fail_resets_progress() {
        let mut job = queued("x");
        job.begin_dispatch();
        job.record_progress(60, 30);
        job.fail("boom");
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.progress, 0);
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_requeue_only_from_error() {
        let mut job = queued("x");
        assert!(!job.requeue());

        job.begin_dispatch();
        assert!(!job.requeue());

        job.fail("boom");
        assert!(job.requeue());
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.error.is_none());
        assert_eq!(job.attempts, 1);

        assert!(!job.requeue());
    }

    #[test]
    fn test_recover_running_job() {
        let mut job = queued("x");
        job.begin_dispatch();
        job.record_progress(70, 20);
        assert!(job.recover());
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert_eq!(job.attempts, 1);
    }

    #[test]
    fn test_recover_leaves_done_job() {
        let mut job = queued("x");
        job.begin_dispatch();
        job.complete(PathBuf::from("out.mp4"));
        assert!(!job.recover());
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("Running".parse::<JobStatus>(), Ok(JobStatus::Running));
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&JobStatus::Queued).unwrap();
        assert_eq!(json, "\"queued\"");
    }

    #[test]
    fn test_job_deserializes_with_missing_runtime_fields() {
        let json = r#"{"id":"job-1","prompt":"p","status":"running"}"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.attempts, 0);
        assert!(job.seed.is_none());
    }
}
