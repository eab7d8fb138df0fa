//! Job runner module - executes one dispatched job against the remote provider.
//!
//! This module provides:
//! - JobRunner for the start / poll / finalize lifecycle of one dispatch
//! - RunError, the classified per-dispatch failure
//! - Output file naming from prompts

mod job_runner;
pub mod slug;

pub use job_runner::{DispatchContext, JobRunner, RunError, RunnerConfig, RunnerUpdate, next_progress};
pub use slug::{output_filename, slugify};
