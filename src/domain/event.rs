//! Notifications the engine pushes to observers.
//!
//! Delivery is best-effort over a broadcast channel; a slow subscriber may miss
//! events and should re-read state through the handle.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::job::{Job, JobStatus};

/// Point-in-time view of the queue ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub jobs: Vec<Job>,
    pub running_count: usize,
    pub total_run_count: u32,
    pub concurrency: u8,
}

impl QueueSnapshot {
    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    /// No job is waiting or in flight
    pub fn is_idle(&self) -> bool {
        self.running_count == 0 && self.count(JobStatus::Queued) == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum QueueEvent {
    /// Any change to the job ledger or the concurrency limit
    QueueChanged(QueueSnapshot),
    /// Admission stopped at the per-session dispatch cap
    PausedByCostCap { cap: u32 },
    /// Admission halted by provider quota exhaustion
    PausedByQuota { reason: String, resume_at: DateTime<Utc> },
    /// Countdown while a quota cooldown is active
    CooldownTick { remaining_secs: u64 },
    /// Cooldown over; admission restored to `concurrency`
    CooldownEnded { concurrency: u8 },
    /// Human-facing message (job finished, queue paused, ...)
    Notification { title: String, body: String },
}

impl QueueEvent {
    /// Stable channel name, e.g. for logging or forwarding to a UI
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::QueueChanged(_) => "queue.update",
            QueueEvent::PausedByCostCap { .. } => "queue.paused_by_cap",
            QueueEvent::PausedByQuota { .. } => "queue.paused_by_quota",
            QueueEvent::CooldownTick { .. } => "queue.cooldown_tick",
            QueueEvent::CooldownEnded { .. } => "queue.cooldown_ended",
            QueueEvent::Notification { .. } => "notification",
        }
    }

    pub fn notification(title: impl Into<String>, body: impl Into<String>) -> Self {
        QueueEvent::Notification {
            title: title.into(),
            body: body.into(),
        }
    }
}
