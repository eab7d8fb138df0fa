//! Vidqueue - a persistent, concurrency-bounded queue for video generation jobs
//!
//! Jobs are admitted FIFO up to a concurrency limit, driven through a remote
//! start/poll/download protocol, and paused system-wide with exponential backoff
//! when the provider reports quota exhaustion.

pub mod domain;
pub mod error;
pub mod id;
pub mod import;
pub mod queue;
pub mod remote;
pub mod runner;
pub mod scheduler;
pub mod storage;

pub use error::{QueueError, Result};
