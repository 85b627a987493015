//! Per-channel scheduling.
//!
//! Every active channel gets its own timer task; there is no global tick.
//! Cycles run on a bounded worker pool and at most one cycle per channel
//! runs at a time. Timers are derived from the state store on start:
//! a channel first fires at `max(now, last_check + interval)` plus a random
//! jitter, so a restart after a long outage does not poll everything at once.

mod config;
mod runner;
mod types;

pub use config::SchedulerConfig;
pub use runner::Scheduler;
pub use types::{ChannelTimerStatus, SchedulerError, SchedulerStatus};
