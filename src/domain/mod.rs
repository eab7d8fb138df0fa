//! Domain types for vidqueue
//!
//! - Job: a queued video request with its status lifecycle
//! - Settings: user-mutable configuration persisted with the queue
//! - CooldownState: persisted quota backoff
//! - QueueEvent: notifications pushed to observers

pub mod event;
pub mod job;
pub mod quota;
pub mod settings;

pub use event::{QueueEvent, QueueSnapshot};
pub use job::{Job, JobId, JobRequest, JobStatus};
pub use quota::CooldownState;
pub use settings::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, Settings, SettingsPatch, clamp_concurrency};
