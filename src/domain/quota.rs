//! Quota cooldown state for coordinated backoff.
//!
//! When the provider reports quota exhaustion, admission of new work stops for
//! the whole queue. The state below is persisted inside the settings document so
//! that a restart during a cooldown re-arms it instead of retrying immediately.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::settings::DEFAULT_CONCURRENCY;

/// Delay before the first resume (5 minutes)
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 5 * 60 * 1000;

/// Backoff ceiling (1 hour)
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 60 * 60 * 1000;

/// Persisted quota cooldown state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownState {
    /// Admission is held at zero while set.
    pub active: bool,
    /// When the scheduled resume fires.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Limit to restore on resume.
    pub prev_concurrency: Option<u8>,
    /// Delay for the next activation; `None` means the initial backoff.
    pub backoff_ms: Option<u64>,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for CooldownState {
    fn default() -> Self {
        Self {
            active: false,
            next_retry_at: None,
            prev_concurrency: None,
            backoff_ms: None,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl CooldownState {
    /// Apply process configuration over persisted bounds.
    pub fn configure(&mut self, initial: Duration, max: Duration) {
        self.initial_backoff_ms = initial.as_millis() as u64;
        self.max_backoff_ms = (max.as_millis() as u64).max(self.initial_backoff_ms);
    }

    /// Delay the next activation will use, never above the ceiling.
    pub fn current_backoff_ms(&self) -> u64 {
        self.backoff_ms
            .unwrap_or(self.initial_backoff_ms)
            .min(self.max_backoff_ms)
    }

    /// Record a quota failure and return the resume time.
    ///
    /// The limit in force is only captured on the first activation; a repeat
    /// failure during an active cooldown pushes `next_retry_at` out again.
    pub fn activate(&mut self, current_concurrency: u8, now: DateTime<Utc>) -> DateTime<Utc> {
        if !self.active {
            self.prev_concurrency = Some(current_concurrency);
            self.active = true;
        }

        let delay = chrono::Duration::milliseconds(self.current_backoff_ms() as i64);
        let resume_at = now + delay;
        self.next_retry_at = Some(resume_at);

        tracing::warn!(
            backoff_ms = self.current_backoff_ms(),
            prev_concurrency = ?self.prev_concurrency,
            resume_at = %resume_at,
            "Quota exhausted, pausing admission"
        );

        resume_at
    }

    /// The scheduled resume fired.
    ///
    /// Deactivates, doubles the backoff for the next occurrence and returns the
    /// concurrency limit to restore.
    pub fn complete(&mut self) -> u8 {
        let next = self.current_backoff_ms().saturating_mul(2).min(self.max_backoff_ms);
        self.active = false;
        self.next_retry_at = None;
        self.backoff_ms = Some(next);
        self.prev_concurrency.take().unwrap_or(DEFAULT_CONCURRENCY)
    }

    /// A job finished cleanly; the consecutive-failure chain is broken.
    pub fn record_success(&mut self) {
        if !self.active {
            self.backoff_ms = None;
        }
    }

    /// Time left until `next_retry_at`, zero when past or unset.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.next_retry_at
            .and_then(|at| (at - now).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }
}
