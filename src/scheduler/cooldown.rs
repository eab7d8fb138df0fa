//! Cooldown timer: the countdown ticks and the deferred resume of one armed
//! quota cooldown. The persisted backoff state lives in [`crate::domain::quota`].

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::domain::QueueEvent;
use crate::domain::quota::{DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_BACKOFF_MS};

/// Cooldown configuration.
#[derive(Debug, Clone)]
pub struct CooldownConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Resolution of the countdown ticks.
    pub tick_interval: Duration,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// The two timer tasks of one armed cooldown.
///
/// Dropping the timer cancels both.
#[derive(Debug)]
pub struct CooldownTimer {
    tick: JoinHandle<()>,
    resume: JoinHandle<()>,
}

impl CooldownTimer {
    /// Start the countdown ticks and the deferred resume action.
    pub fn arm<F>(delay: Duration, tick_interval: Duration, events: broadcast::Sender<QueueEvent>, on_elapsed: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let deadline = Instant::now() + delay;

        let tick = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            loop {
                interval.tick().await;
                let remaining = deadline.saturating_duration_since(Instant::now());
                let remaining_secs = remaining.as_millis().div_ceil(1000) as u64;
                if remaining_secs == 0 {
                    break;
                }
                let _ = events.send(QueueEvent::CooldownTick { remaining_secs });
            }
        });

        let resume = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_elapsed.await;
        });

        Self { tick, resume }
    }
}

impl Drop for CooldownTimer {
    fn drop(&mut self) {
        self.tick.abort();
        self.resume.abort();
    }
}
