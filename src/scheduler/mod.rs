//! Scheduler module - admission control and quota backoff.
//!
//! This module provides:
//! - **QueueEngine**: the single task that owns queue state, pumps queued jobs
//!   into runners up to the concurrency limit and applies their outcomes.
//! - **QueueHandle**: the cloneable command surface used by the CLI, importers
//!   and the directory watcher.
//! - **Cooldown timer**: the cancellable countdown that resumes admission after
//!   provider quota exhaustion.
//!
//! # Example
//!
//! ```ignore
//! use vidqueue::scheduler::{EngineConfig, QueueEngine};
//!
//! let (handle, task) = QueueEngine::spawn(store, client, EngineConfig::default());
//! handle.enqueue(JobRequest::new("a lighthouse at dawn")).await?;
//! handle.start().await?;
//! ```

mod cooldown;
mod engine;

pub use cooldown::{CooldownConfig, CooldownTimer};
pub use engine::{EngineConfig, QUOTA_ERROR_REASON, QueueEngine, QueueHandle};
