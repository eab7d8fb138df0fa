//! Queue engine - the scheduler that owns all mutable queue state.
//!
//! The engine runs as one tokio task that:
//! 1. Processes commands from [`QueueHandle`]s one at a time
//! 2. Pumps queued jobs into runner tasks up to the concurrency limit
//! 3. Applies runner progress and outcomes as they arrive
//! 4. Drives the quota cooldown and its scheduled resume
//!
//! Every state change is followed by a snapshot write and a
//! [`QueueEvent::QueueChanged`] broadcast. Since a pump pass only ever runs
//! inside the engine task, passes never overlap.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{self, JoinError, JoinHandle, JoinSet};

use super::cooldown::{CooldownConfig, CooldownTimer};
use crate::domain::{
    DEFAULT_CONCURRENCY, Job, JobId, JobRequest, JobStatus, QueueEvent, QueueSnapshot, Settings,
    SettingsPatch, clamp_concurrency,
};
use crate::error::{QueueError, Result};
use crate::id::generate_job_id;
use crate::queue::QueueState;
use crate::remote::RemoteClient;
use crate::runner::{DispatchContext, JobRunner, RunError, RunnerConfig, RunnerUpdate};
use crate::storage::{PersistedState, QUEUE_KEY, SETTINGS_KEY, SnapshotStore, save};

/// Error recorded on a job that hit provider quota exhaustion
pub const QUOTA_ERROR_REASON: &str = "Quota exhausted (429 / RESOURCE_EXHAUSTED); queue paused";

const COMMAND_CAPACITY: usize = 64;

/// Configuration for the QueueEngine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub runner: RunnerConfig,
    pub cooldown: CooldownConfig,
    /// Environment variable consulted when no credential is set.
    pub api_key_env: String,
    /// Broadcast buffer per subscriber.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            runner: RunnerConfig::default(),
            cooldown: CooldownConfig::default(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            event_capacity: 1024,
        }
    }
}

type RunOutcome = (JobId, std::result::Result<PathBuf, RunError>);

#[derive(Debug)]
enum Command {
    GetSettings(oneshot::Sender<Settings>),
    UpdateSettings(SettingsPatch, oneshot::Sender<Settings>),
    ListJobs(oneshot::Sender<Vec<Job>>),
    Snapshot(oneshot::Sender<QueueSnapshot>),
    Enqueue(JobRequest, oneshot::Sender<Result<JobId>>),
    Retry(JobId, oneshot::Sender<bool>),
    Start(oneshot::Sender<u8>),
    Pause(oneshot::Sender<()>),
    SetConcurrency(u32, oneshot::Sender<Result<u8>>),
    ClearDone(oneshot::Sender<usize>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to a running engine.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<QueueEvent>,
}

impl QueueHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| QueueError::EngineStopped)?;
        rx.await.map_err(|_| QueueError::EngineStopped)
    }

    /// Receive engine events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub async fn get_settings(&self) -> Result<Settings> {
        self.request(Command::GetSettings).await
    }

    /// Merge `patch` into the settings, persist them and return the result
    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings> {
        self.request(|tx| Command::UpdateSettings(patch, tx)).await
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.request(Command::ListJobs).await
    }

    pub async fn snapshot(&self) -> Result<QueueSnapshot> {
        self.request(Command::Snapshot).await
    }

    /// Append a job and trigger a scheduler pass
    pub async fn enqueue(&self, request: JobRequest) -> Result<JobId> {
        self.request(|tx| Command::Enqueue(request, tx)).await?
    }

    /// `error -> queued`; false if the job is unknown or not in error
    pub async fn retry(&self, id: impl Into<JobId>) -> Result<bool> {
        let id = id.into();
        self.request(|tx| Command::Retry(id, tx)).await
    }

    /// Reset the session dispatch counter, un-pause and pump. Returns the limit in force.
    pub async fn start(&self) -> Result<u8> {
        self.request(Command::Start).await
    }

    /// Stop new dispatches; running jobs finish
    pub async fn pause(&self) -> Result<()> {
        self.request(Command::Pause).await
    }

    /// Set the concurrency limit, clamped to [0, 8]. Returns the applied limit.
    pub async fn set_concurrency(&self, n: u32) -> Result<u8> {
        self.request(|tx| Command::SetConcurrency(n, tx)).await?
    }

    /// Drop all `done` jobs. Returns how many were removed.
    pub async fn clear_done(&self) -> Result<usize> {
        self.request(Command::ClearDone).await
    }

    /// Abort running dispatches, cancel timers and flush state
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }
}

/// The scheduler task. Owns the ledger, the settings and the cooldown.
pub struct QueueEngine {
    store: Arc<dyn SnapshotStore>,
    runner: Arc<JobRunner>,
    config: EngineConfig,
    settings: Settings,
    queue: QueueState,
    events: broadcast::Sender<QueueEvent>,
    tasks: JoinSet<RunOutcome>,
    in_flight: HashMap<task::Id, JobId>,
    updates_tx: mpsc::UnboundedSender<RunnerUpdate>,
    updates_rx: mpsc::UnboundedReceiver<RunnerUpdate>,
    cooldown_tx: mpsc::UnboundedSender<u64>,
    cooldown_rx: mpsc::UnboundedReceiver<u64>,
    cooldown_timer: Option<CooldownTimer>,
    cooldown_generation: u64,
}

impl QueueEngine {
    /// Load persisted state and start the engine task.
    ///
    /// Jobs left unfinished by a previous process are put back to `queued`. An
    /// active cooldown is re-armed. Nothing is dispatched until a command asks
    /// for a scheduler pass.
    pub fn spawn(
        store: Arc<dyn SnapshotStore>,
        client: Arc<dyn RemoteClient>,
        config: EngineConfig,
    ) -> (QueueHandle, JoinHandle<()>) {
        let persisted = PersistedState::load(store.as_ref());
        let (queue, recovered) = QueueState::restore(persisted.jobs);

        let mut settings = persisted.settings;
        settings.concurrency = clamp_concurrency(u32::from(settings.concurrency));
        settings
            .quota
            .configure(config.cooldown.initial_backoff, config.cooldown.max_backoff);

        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (cooldown_tx, cooldown_rx) = mpsc::unbounded_channel();

        let runner = Arc::new(JobRunner::new(client, config.runner.clone()));
        let mut engine = Self {
            store,
            runner,
            config,
            settings,
            queue,
            events: events.clone(),
            tasks: JoinSet::new(),
            in_flight: HashMap::new(),
            updates_tx,
            updates_rx,
            cooldown_tx,
            cooldown_rx,
            cooldown_timer: None,
            cooldown_generation: 0,
        };

        if recovered > 0 {
            log::info!("Recovered {} unfinished jobs to queued", recovered);
            engine.persist_jobs();
        }
        engine.ensure_output_dir();
        engine.restore_cooldown();

        log::info!(
            "Queue engine started: {} jobs, concurrency {}",
            engine.queue.jobs().len(),
            engine.settings.concurrency
        );

        let handle = QueueHandle {
            commands: command_tx,
            events,
        };
        let task = tokio::spawn(engine.run(command_rx));
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(update) = self.updates_rx.recv() => self.handle_update(update),
                Some(generation) = self.cooldown_rx.recv() => self.handle_cooldown_elapsed(generation),
                Some(joined) = self.tasks.join_next_with_id(), if !self.tasks.is_empty() => {
                    self.handle_joined(joined);
                }
            }
        }
        log::info!("Queue engine stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::GetSettings(reply) => {
                let _ = reply.send(self.settings.clone());
            }
            Command::UpdateSettings(patch, reply) => {
                self.settings.apply(patch);
                self.ensure_output_dir();
                self.persist_settings();
                let _ = reply.send(self.settings.clone());
            }
            Command::ListJobs(reply) => {
                let _ = reply.send(self.queue.jobs().to_vec());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Enqueue(request, reply) => {
                let result = self.enqueue(request);
                let _ = reply.send(result);
                self.pump();
            }
            Command::Retry(id, reply) => {
                let retried = self.queue.retry(&id);
                if retried {
                    log::info!("Job {} requeued", id);
                    self.persist_jobs();
                    self.emit_snapshot();
                }
                let _ = reply.send(retried);
                self.pump();
            }
            Command::Start(reply) => {
                self.start();
                let _ = reply.send(self.settings.concurrency);
                self.pump();
            }
            Command::Pause(reply) => {
                self.pause();
                let _ = reply.send(());
            }
            Command::SetConcurrency(n, reply) => {
                let result = self.set_concurrency(n);
                let _ = reply.send(result);
                self.pump();
            }
            Command::ClearDone(reply) => {
                let removed = self.queue.clear_done();
                if removed > 0 {
                    self.persist_jobs();
                    self.emit_snapshot();
                }
                let _ = reply.send(removed);
            }
            Command::Shutdown(reply) => {
                let _ = reply.send(());
            }
        }
    }

    fn enqueue(&mut self, request: JobRequest) -> Result<JobId> {
        let mut job = Job::from_request(request, &self.settings.person_generation_default)?;
        while self.queue.contains(&job.id) {
            job.id = generate_job_id();
        }

        let id = job.id.clone();
        log::info!("Enqueued job {}", id);
        self.queue.push(job);
        self.persist_jobs();
        self.emit_snapshot();
        Ok(id)
    }

    fn start(&mut self) {
        self.queue.reset_run_count();
        if self.settings.quota.active {
            tracing::info!("Start requested during quota cooldown; limit stays at 0");
        } else if self.settings.concurrency == 0 {
            self.settings.concurrency = DEFAULT_CONCURRENCY;
            self.persist_settings();
        }
        self.emit_snapshot();
    }

    fn pause(&mut self) {
        if self.settings.quota.active || self.settings.concurrency == 0 {
            return;
        }
        self.settings.concurrency = 0;
        self.persist_settings();
        self.emit_snapshot();
    }

    fn set_concurrency(&mut self, n: u32) -> Result<u8> {
        if self.settings.quota.active {
            let resume_at = self
                .settings
                .quota
                .next_retry_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "resume".to_string());
            return Err(QueueError::CooldownActive(resume_at));
        }

        let limit = clamp_concurrency(n);
        self.settings.concurrency = limit;
        self.persist_settings();
        self.emit_snapshot();
        Ok(limit)
    }

    /// One scheduler pass: dispatch queued jobs in FIFO order until the limit,
    /// the queue or the cost cap runs out.
    fn pump(&mut self) {
        let mut dispatched = false;

        while self.queue.running_count() < usize::from(self.settings.concurrency) {
            let Some(next_id) = self.queue.next_queued().map(|job| job.id.clone()) else {
                break;
            };

            if self.queue.total_run_count() >= self.settings.cost_cap_jobs {
                let cap = self.settings.cost_cap_jobs;
                tracing::info!(cap, "Cost cap reached, admission paused");
                self.emit(QueueEvent::PausedByCostCap { cap });
                break;
            }

            let Some(job) = self.queue.begin_dispatch(&next_id) else {
                break;
            };
            self.launch(job);
            dispatched = true;
        }

        if dispatched {
            self.persist_jobs();
            self.emit_snapshot();
        }
    }

    fn launch(&mut self, job: Job) {
        let ctx = DispatchContext {
            credential: self.settings.credential(&self.config.api_key_env),
            output_dir: self.settings.output_dir.clone(),
            credential_env: self.config.api_key_env.clone(),
        };
        let runner = self.runner.clone();
        let updates = self.updates_tx.clone();
        let job_id = job.id.clone();

        tracing::info!(
            job_id = %job.id,
            attempt = job.attempts,
            running = self.queue.running_count(),
            "Dispatching job"
        );

        let task_job_id = job_id.clone();
        let handle = self.tasks.spawn(async move {
            let result = runner.run(job, ctx, updates).await;
            (task_job_id, result)
        });
        self.in_flight.insert(handle.id(), job_id);
    }

    fn handle_update(&mut self, update: RunnerUpdate) {
        let RunnerUpdate::Progress {
            job_id,
            progress,
            eta_secs,
        } = update;

        let Some(job) = self.queue.get_mut(&job_id) else {
            return;
        };
        if job.status != JobStatus::Running {
            return;
        }
        job.record_progress(progress, eta_secs);
        self.persist_jobs();
        self.emit_snapshot();
    }

    fn handle_joined(&mut self, joined: std::result::Result<(task::Id, RunOutcome), JoinError>) {
        match joined {
            Ok((task_id, (job_id, outcome))) => {
                self.in_flight.remove(&task_id);
                self.finish(job_id, outcome);
            }
            Err(e) => match self.in_flight.remove(&e.id()) {
                Some(job_id) => {
                    let reason = if e.is_panic() { "runner panicked" } else { "runner cancelled" };
                    self.finish(job_id, Err(RunError::Aborted(reason.to_string())));
                }
                None => {
                    log::error!("Unknown runner task ended: {}", e);
                    self.queue.finish_dispatch();
                    self.pump();
                }
            },
        }
    }

    /// Apply a runner outcome, free its slot and pump.
    fn finish(&mut self, job_id: JobId, outcome: std::result::Result<PathBuf, RunError>) {
        match outcome {
            Ok(path) => {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if let Some(job) = self.queue.get_mut(&job_id) {
                    job.complete(path);
                }
                tracing::info!(job_id = %job_id, output = %filename, "Job done");

                let before = self.settings.quota.clone();
                self.settings.quota.record_success();
                if self.settings.quota != before {
                    self.persist_settings();
                }
                self.emit(QueueEvent::notification("Video ready", format!("Saved: {}", filename)));
            }
            Err(e) if e.is_quota() => {
                tracing::warn!(job_id = %job_id, error = %e, "Quota exhausted");
                if let Some(job) = self.queue.get_mut(&job_id) {
                    job.fail(QUOTA_ERROR_REASON);
                }
                self.enter_cooldown(e.to_string());
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Job failed");
                if let Some(job) = self.queue.get_mut(&job_id) {
                    job.fail(e.to_string());
                }
            }
        }

        self.queue.finish_dispatch();
        self.persist_jobs();
        self.emit_snapshot();
        self.pump();
    }

    fn enter_cooldown(&mut self, reason: String) {
        let now = Utc::now();
        let resume_at = self.settings.quota.activate(self.settings.concurrency, now);
        self.settings.concurrency = 0;
        self.persist_settings();

        self.arm_cooldown(self.settings.quota.remaining(now));

        let local = resume_at.with_timezone(&Local).format("%H:%M:%S");
        self.emit(QueueEvent::PausedByQuota { reason, resume_at });
        self.emit(QueueEvent::notification(
            "Queue paused",
            format!("Provider quota exhausted; resuming at {}", local),
        ));
        self.emit_snapshot();
    }

    fn restore_cooldown(&mut self) {
        if !self.settings.quota.active {
            return;
        }
        self.settings.concurrency = 0;

        let remaining = self.settings.quota.remaining(Utc::now());
        tracing::info!(remaining_secs = remaining.as_secs(), "Re-arming quota cooldown");
        self.arm_cooldown(remaining);
    }

    fn arm_cooldown(&mut self, delay: std::time::Duration) {
        self.cooldown_generation += 1;
        let generation = self.cooldown_generation;
        let elapsed = self.cooldown_tx.clone();

        self.cooldown_timer = Some(CooldownTimer::arm(
            delay,
            self.config.cooldown.tick_interval,
            self.events.clone(),
            async move {
                let _ = elapsed.send(generation);
            },
        ));
    }

    fn handle_cooldown_elapsed(&mut self, generation: u64) {
        // A newer arm superseded this timer
        if generation != self.cooldown_generation || !self.settings.quota.active {
            return;
        }

        self.cooldown_timer = None;
        let concurrency = self.settings.quota.complete();
        self.settings.concurrency = concurrency;
        self.persist_settings();

        tracing::info!(
            concurrency,
            next_backoff_ms = self.settings.quota.current_backoff_ms(),
            "Quota cooldown ended"
        );
        self.emit(QueueEvent::CooldownEnded { concurrency });
        self.emit(QueueEvent::notification(
            "Queue resumed",
            format!("Quota cooldown over; concurrency {}", concurrency),
        ));
        self.emit_snapshot();
        self.pump();
    }

    async fn shutdown(&mut self) {
        log::info!("Shutting down queue engine ({} running)", self.queue.running_count());
        self.cooldown_timer = None;
        self.tasks.shutdown().await;
        self.in_flight.clear();
        self.persist_settings();
        self.persist_jobs();
    }

    fn ensure_output_dir(&self) {
        if let Err(e) = std::fs::create_dir_all(&self.settings.output_dir) {
            log::warn!(
                "Could not create output directory {}: {}",
                self.settings.output_dir.display(),
                e
            );
        }
    }

    fn snapshot(&self) -> QueueSnapshot {
        self.queue.snapshot(self.settings.concurrency)
    }

    fn emit(&self, event: QueueEvent) {
        log::debug!("Event {}", event.name());
        let _ = self.events.send(event);
    }

    fn emit_snapshot(&self) {
        self.emit(QueueEvent::QueueChanged(self.snapshot()));
    }

    fn persist_jobs(&self) {
        if let Err(e) = save(self.store.as_ref(), QUEUE_KEY, self.queue.jobs()) {
            tracing::warn!(error = %e, "Failed to persist queue");
        }
    }

    fn persist_settings(&self) {
        if let Err(e) = save(self.store.as_ref(), SETTINGS_KEY, &self.settings) {
            tracing::warn!(error = %e, "Failed to persist settings");
        }
    }
}
