//! Queue State - the shared ledger of jobs and session counters.
//!
//! Only the scheduler engine mutates it; everyone else sees snapshots.

mod state;

pub use state::QueueState;
