//! Scheduler status and errors.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::orchestrator::{CycleOutcome, OrchestratorError};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Cycle(#[from] OrchestratorError),

    /// The cycle task panicked.
    #[error("cycle task failed: {0}")]
    Panicked(String),

    #[error("scheduler is shutting down")]
    Stopped,
}

/// Timer state of one channel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelTimerStatus {
    pub channel_id: String,
    pub interval_secs: u64,
    pub next_fire_at: Option<DateTime<Utc>>,
    /// A cycle is in flight.
    pub running: bool,
    pub cycles: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<CycleOutcome>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub worker_pool_size: usize,
    pub available_workers: usize,
    pub scheduled_channels: usize,
    pub channels: Vec<ChannelTimerStatus>,
}
