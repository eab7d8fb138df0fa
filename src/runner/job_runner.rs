//! Job runner - drives one dispatch through start, poll and finalize.
//!
//! The runner never touches the queue ledger. It works on a copy of the
//! dispatched job, reports heuristic progress over a channel and resolves with
//! either the artifact path or a classified [`RunError`]; the engine applies
//! the outcome.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::slug::output_filename;
use crate::domain::job::MAX_RUNNING_PROGRESS;
use crate::domain::{Job, JobId};
use crate::remote::{GenerationRequest, RemoteClient, RemoteError};

/// Seconds taken off the ETA on each poll
pub const ETA_STEP_SECS: u32 = 5;

/// The ETA never drops below this while running
pub const MIN_ETA_SECS: u32 = 5;

/// Largest progress increment per poll
pub const MAX_PROGRESS_STEP: u8 = 5;

/// Configuration for the JobRunner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Wait between polls of the remote operation.
    pub poll_interval: Duration,
    /// Give up polling after this long. `None` polls until the operation ends.
    pub max_poll_duration: Option<Duration>,
    /// Fixed aspect ratio sent with every request.
    pub aspect_ratio: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_poll_duration: None,
            aspect_ratio: "16:9".to_string(),
        }
    }
}

/// Settings captured at dispatch time.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub credential: Option<String>,
    pub output_dir: PathBuf,
    /// Where the credential fallback is read from, for the error message.
    pub credential_env: String,
}

/// Progress report from a running dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerUpdate {
    Progress { job_id: JobId, progress: u8, eta_secs: u32 },
}

/// Terminal failure of one dispatch. `Display` is the message recorded on the job.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Missing API key. Set it in settings or via {0}")]
    MissingCredential(String),

    #[error("Start generation failed: {0}")]
    Start(RemoteError),

    #[error("Polling failed: {0}")]
    Poll(RemoteError),

    #[error("Polling gave up after {0:?}")]
    PollTimeout(Duration),

    #[error("No video in response")]
    NoArtifact,

    #[error("Could not create output directory: {0}")]
    OutputDir(std::io::Error),

    #[error("Download failed: {0}")]
    Download(RemoteError),

    #[error("Runner aborted: {0}")]
    Aborted(String),
}

impl RunError {
    /// Provider quota exhaustion at any remote phase
    pub fn is_quota(&self) -> bool {
        match self {
            RunError::Start(e) | RunError::Poll(e) | RunError::Download(e) => e.is_quota(),
            _ => false,
        }
    }
}

/// Next heuristic (progress, eta) after one poll interval.
pub fn next_progress(progress: u8, eta_secs: u32) -> (u8, u32) {
    let step = rand::rng().random_range(1..=MAX_PROGRESS_STEP);
    let progress = progress.saturating_add(step).min(MAX_RUNNING_PROGRESS);
    let eta_secs = eta_secs.saturating_sub(ETA_STEP_SECS).max(MIN_ETA_SECS);
    (progress, eta_secs)
}

/// JobRunner executes a single dispatch against a remote client.
pub struct JobRunner {
    client: Arc<dyn RemoteClient>,
    config: RunnerConfig,
}

impl JobRunner {
    pub fn new(client: Arc<dyn RemoteClient>, config: RunnerConfig) -> Self {
        Self { client, config }
    }

    /// Run one dispatch to completion.
    ///
    /// `job` is the snapshot taken at the `queued -> running` transition.
    pub async fn run(
        &self,
        job: Job,
        ctx: DispatchContext,
        updates: mpsc::UnboundedSender<RunnerUpdate>,
    ) -> Result<PathBuf, RunError> {
        let credential = ctx
            .credential
            .clone()
            .ok_or_else(|| RunError::MissingCredential(ctx.credential_env.clone()))?;

        // Phase 1: start
        let request = GenerationRequest::from_job(&job, &self.config.aspect_ratio);
        let mut operation = self
            .client
            .start(&credential, &request)
            .await
            .map_err(RunError::Start)?;
        log::info!("Job {} started remote operation {}", job.id, operation.name);

        // Phase 2: poll
        let started = Instant::now();
        let mut progress = job.progress;
        let mut eta_secs = job.eta_secs;
        while !operation.done {
            tokio::time::sleep(self.config.poll_interval).await;

            if let Some(limit) = self.config.max_poll_duration.filter(|limit| started.elapsed() >= *limit) {
                return Err(RunError::PollTimeout(limit));
            }

            (progress, eta_secs) = next_progress(progress, eta_secs);
            let _ = updates.send(RunnerUpdate::Progress {
                job_id: job.id.clone(),
                progress,
                eta_secs,
            });

            operation = self
                .client
                .poll(&credential, &operation)
                .await
                .map_err(RunError::Poll)?;
        }

        // Phase 3: finalize
        let artifact = operation.first_artifact().cloned().ok_or(RunError::NoArtifact)?;
        std::fs::create_dir_all(&ctx.output_dir).map_err(RunError::OutputDir)?;

        let filename = output_filename(&job.prompt, &chrono::Local::now());
        let path = ctx.output_dir.join(filename);
        self.client
            .download(&credential, &artifact, &path)
            .await
            .map_err(RunError::Download)?;

        log::info!("Job {} saved {}", job.id, path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobRequest;
    use crate::remote::MockRemoteClient;
    use tempfile::TempDir;

    fn dispatched(prompt: &str) -> Job {
        let mut job = Job::from_request(JobRequest::new(prompt), "allow_all").unwrap();
        job.begin_dispatch();
        job
    }

    fn ctx(dir: &TempDir) -> DispatchContext {
        DispatchContext {
            credential: Some("test-key".to_string()),
            output_dir: dir.path().join("out"),
            credential_env: "GEMINI_API_KEY".to_string(),
        }
    }

    fn runner(client: Arc<MockRemoteClient>) -> JobRunner {
        JobRunner::new(client, RunnerConfig::default())
    }

    #[test]
    fn test_next_progress_bounds() {
        let (progress, eta) = next_progress(5, 90);
        assert!((6..=10).contains(&progress));
        assert_eq!(eta, 85);

        let (progress, eta) = next_progress(94, 6);
        assert_eq!(progress, MAX_RUNNING_PROGRESS);
        assert_eq!(eta, MIN_ETA_SECS);

        let (progress, _) = next_progress(MAX_RUNNING_PROGRESS, 5);
        assert_eq!(progress, MAX_RUNNING_PROGRESS);
    }

    #[test]
    fn test_run_error_messages() {
        assert_eq!(RunError::NoArtifact.to_string(), "No video in response");
        let err = RunError::Start(RemoteError::Other("boom".to_string()));
        assert_eq!(err.to_string(), "Start generation failed: boom");
        assert!(!err.is_quota());

        let err = RunError::Poll(RemoteError::Http {
            status: 429,
            message: "slow down".to_string(),
        });
        assert!(err.is_quota());
        assert!(!RunError::PollTimeout(Duration::from_secs(1)).is_quota());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_success() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(MockRemoteClient::with_polls(3));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let path = runner(client.clone())
            .run(dispatched("a red balloon"), ctx(&temp), tx)
            .await
            .unwrap();

        assert!(path.exists());
        assert!(path.starts_with(temp.path().join("out")));
        assert!(path.to_string_lossy().ends_with("__a_red_balloon.mp4"));

        let mut last = 0;
        let mut count = 0;
        while let Ok(RunnerUpdate::Progress { progress, .. }) = rx.try_recv() {
            assert!(progress >= last);
            assert!(progress <= MAX_RUNNING_PROGRESS);
            last = progress;
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(client.completed(), vec!["a red balloon"]);
    }

    #[tokio::test]
    async fn test_run_missing_credential() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(MockRemoteClient::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut ctx = ctx(&temp);
        ctx.credential = None;

        let err = runner(client.clone()).run(dispatched("a"), ctx, tx).await.unwrap_err();
        assert!(matches!(err, RunError::MissingCredential(_)));
        assert!(client.started().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_quota_on_start() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(MockRemoteClient::new());
        client.fail_start("a", "429 RESOURCE_EXHAUSTED");
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = runner(client).run(dispatched("a"), ctx(&temp), tx).await.unwrap_err();
        assert!(matches!(err, RunError::Start(_)));
        assert!(err.is_quota());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_poll_failure() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(MockRemoteClient::new());
        client.fail_poll("a", "backend unavailable");
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = runner(client).run(dispatched("a"), ctx(&temp), tx).await.unwrap_err();
        assert_eq!(err.to_string(), "Polling failed: backend unavailable");
        assert!(!err.is_quota());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_no_artifact() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(MockRemoteClient::new());
        client.no_artifact("a");
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = runner(client).run(dispatched("a"), ctx(&temp), tx).await.unwrap_err();
        assert!(matches!(err, RunError::NoArtifact));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_download_failure() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(MockRemoteClient::new());
        client.fail_download("a", "rate limit reached");
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = runner(client).run(dispatched("a"), ctx(&temp), tx).await.unwrap_err();
        assert!(matches!(err, RunError::Download(_)));
        assert!(err.is_quota());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_poll_timeout() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(MockRemoteClient::with_polls(100));
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = RunnerConfig {
            max_poll_duration: Some(Duration::from_secs(25)),
            ..Default::default()
        };

        let err = JobRunner::new(client, config)
            .run(dispatched("a"), ctx(&temp), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::PollTimeout(_)));
        assert!(!err.is_quota());
    }
}
