//! Types for the channel orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::circuit::CircuitState;
use crate::store::StoreError;

/// Errors that abort a cycle.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// The channel is no longer monitored.
    #[error("channel is deactivated: {0}")]
    ChannelInactive(String),

    /// Persistence failed; nothing past the last durable write is kept.
    #[error("state store error: {0}")]
    Store(#[from] StoreError),
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Every item reached `notified`.
    Completed,
    /// The poll failed or at least one item ended `failed`.
    Failed,
    /// Not enough quota; retried on the next tick without penalty.
    Deferred,
    /// The circuit is open; nothing was polled.
    CircuitOpen,
    /// The channel no longer exists upstream and was deactivated.
    Deactivated,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Completed => "completed",
            CycleOutcome::Failed => "failed",
            CycleOutcome::Deferred => "deferred",
            CycleOutcome::CircuitOpen => "circuit_open",
            CycleOutcome::Deactivated => "deactivated",
        }
    }
}

/// Summary of one cycle for a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub channel_id: String,
    pub outcome: CycleOutcome,
    pub items_notified: u32,
    pub items_failed: u32,
    /// Items that were already delivered and only needed committing.
    pub items_recovered: u32,
    /// More items are waiting; run another cycle right away.
    pub follow_up: bool,
    pub circuit: CircuitState,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CycleReport {
    pub(crate) fn new(channel_id: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            outcome: CycleOutcome::Completed,
            items_notified: 0,
            items_failed: 0,
            items_recovered: 0,
            follow_up: false,
            circuit: CircuitState::Closed,
            error: None,
            started_at,
            finished_at: started_at,
        }
    }
}
