//! Queue ledger: the ordered job collection plus session counters.

use crate::domain::{Job, JobStatus, QueueSnapshot};

/// Ordered job collection and dispatch counters.
///
/// Insertion order is queue order. `running_count` and `total_run_count` are
/// session state and are never persisted.
#[derive(Debug, Default)]
pub struct QueueState {
    jobs: Vec<Job>,
    running_count: usize,
    total_run_count: u32,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the ledger from a persisted snapshot.
    ///
    /// No job survives a restart mid-flight: everything not `done` is put back to
    /// `queued` at 0%. Returns the ledger and the number of reclassified jobs.
    pub fn restore(mut jobs: Vec<Job>) -> (Self, usize) {
        let recovered = jobs.iter_mut().map(Job::recover).filter(|changed| *changed).count();
        (
            Self {
                jobs,
                running_count: 0,
                total_run_count: 0,
            },
            recovered,
        )
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn running_count(&self) -> usize {
        self.running_count
    }

    pub fn total_run_count(&self) -> u32 {
        self.total_run_count
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jobs.iter().any(|j| j.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    /// Append a job at the back of the queue.
    pub fn push(&mut self, job: Job) {
        self.jobs.push(job);
    }

    /// First queued job in queue order.
    pub fn next_queued(&self) -> Option<&Job> {
        self.jobs.iter().find(|j| j.status == JobStatus::Queued)
    }

    /// Move a queued job to running and count the dispatch.
    ///
    /// Returns a copy of the dispatched job for the runner, or `None` if the job
    /// does not exist or is not queued.
    pub fn begin_dispatch(&mut self, id: &str) -> Option<Job> {
        let job = self.jobs.iter_mut().find(|j| j.id == id)?;
        if !job.begin_dispatch() {
            return None;
        }
        self.running_count += 1;
        self.total_run_count += 1;
        Some(job.clone())
    }

    /// A runner finished (either way); frees its slot.
    pub fn finish_dispatch(&mut self) {
        self.running_count = self.running_count.saturating_sub(1);
    }

    /// `error -> queued` for the given job. No-op for unknown ids or other statuses.
    pub fn retry(&mut self, id: &str) -> bool {
        self.get_mut(id).map(Job::requeue).unwrap_or(false)
    }

    /// Drop every `done` job. Returns how many were removed.
    pub fn clear_done(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|j| j.status != JobStatus::Done);
        before - self.jobs.len()
    }

    /// Start a new cost-cap session.
    pub fn reset_run_count(&mut self) {
        self.total_run_count = 0;
    }

    pub fn snapshot(&self, concurrency: u8) -> QueueSnapshot {
        QueueSnapshot {
            jobs: self.jobs.clone(),
            running_count: self.running_count,
            total_run_count: self.total_run_count,
            concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobRequest;
    use std::path::PathBuf;

    fn job(prompt: &str) -> Job {
        Job::from_request(JobRequest::new(prompt), "allow_all").unwrap()
    }

    fn state_with(prompts: &[&str]) -> QueueState {
        let mut state = QueueState::new();
        for p in prompts {
            state.push(job(p));
        }
        state
    }

    #[test]
    fn test_next_queued_is_fifo() {
        let mut state = state_with(&["a", "b", "c"]);
        assert_eq!(state.next_queued().unwrap().prompt, "a");

        let id = state.jobs()[0].id.clone();
        state.begin_dispatch(&id).unwrap();
        assert_eq!(state.next_queued().unwrap().prompt, "b");
    }

    #[test]
    fn test_begin_dispatch_counts() {
        let mut state = state_with(&["a", "b"]);
        let id = state.jobs()[0].id.clone();

        let dispatched = state.begin_dispatch(&id).unwrap();
        assert_eq!(dispatched.status, JobStatus::Running);
        assert_eq!(dispatched.attempts, 1);
        assert_eq!(state.running_count(), 1);
        assert_eq!(state.total_run_count(), 1);

        // Second dispatch of the same job is refused
        assert!(state.begin_dispatch(&id).is_none());
        assert_eq!(state.running_count(), 1);
        assert_eq!(state.total_run_count(), 1);
    }

    #[test]
    fn test_begin_dispatch_unknown_id() {
        let mut state = state_with(&["a"]);
        assert!(state.begin_dispatch("job-missing").is_none());
        assert_eq!(state.running_count(), 0);
    }

    #[test]
    fn test_finish_dispatch_saturates() {
        let mut state = QueueState::new();
        state.finish_dispatch();
        assert_eq!(state.running_count(), 0);
    }

    #[test]
    fn test_retry_only_error_jobs() {
        let mut state = state_with(&["a", "b"]);
        let a = state.jobs()[0].id.clone();
        let b = state.jobs()[1].id.clone();

        state.begin_dispatch(&a);
        state.get_mut(&a).unwrap().fail("boom");
        state.finish_dispatch();

        assert!(!state.retry(&b));
        assert!(!state.retry("job-missing"));
        assert!(state.retry(&a));
        assert!(!state.retry(&a));
        assert_eq!(state.jobs()[0].status, JobStatus::Queued);
        assert_eq!(state.jobs()[0].attempts, 1);
    }

    #[test]
    fn test_clear_done() {
        let mut state = state_with(&["a", "b", "c"]);
        for i in [0, 2] {
            let id = state.jobs()[i].id.clone();
            state.begin_dispatch(&id);
            state.get_mut(&id).unwrap().complete(PathBuf::from("x.mp4"));
        }
        assert_eq!(state.clear_done(), 2);
        assert_eq!(state.jobs().len(), 1);
        assert_eq!(state.jobs()[0].prompt, "b");
    }

    #[test]
    fn test_restore_requeues_unfinished_jobs() {
        let mut running = job("running");
        running.begin_dispatch();
        running.record_progress(60, 20);

        let mut failed = job("failed");
        failed.begin_dispatch();
        failed.fail("boom");

        let mut done = job("done");
        done.begin_dispatch();
        done.complete(PathBuf::from("done.mp4"));

        let queued = job("queued");

        let (state, recovered) = QueueState::restore(vec![running, failed, done, queued]);
        assert_eq!(recovered, 2);
        assert_eq!(state.running_count(), 0);

        let jobs = state.jobs();
        assert_eq!(jobs[0].status, JobStatus::Queued);
        assert_eq!(jobs[0].progress, 0);
        assert_eq!(jobs[1].status, JobStatus::Queued);
        assert!(jobs[1].error.is_none());
        assert_eq!(jobs[2].status, JobStatus::Done);
        assert_eq!(jobs[2].progress, 100);
        assert_eq!(jobs[3].status, JobStatus::Queued);
    }

    #[test]
    fn test_reset_run_count() {
        let mut state = state_with(&["a"]);
        let id = state.jobs()[0].id.clone();
        state.begin_dispatch(&id);
        assert_eq!(state.total_run_count(), 1);
        state.reset_run_count();
        assert_eq!(state.total_run_count(), 0);
        assert_eq!(state.running_count(), 1);
    }

    #[test]
    fn test_snapshot() {
        let state = state_with(&["a", "b"]);
        let snapshot = state.snapshot(3);
        assert_eq!(snapshot.jobs.len(), 2);
        assert_eq!(snapshot.concurrency, 3);
        assert_eq!(snapshot.running_count, 0);
    }
}
