//! Channel orchestrator.
//!
//! Sequences poll -> summarize -> notify -> commit for one channel at a
//! time. Per item:
//!
//! ```text
//! discovered -> summarized -> notified
//!      \             \
//!       +-------------+----> failed
//! ```
//!
//! The watermark advances to an item once it is `notified` or `failed`, so a
//! failing item never blocks the ones after it.

mod config;
mod runner;
mod types;

pub use config::TrackerConfig;
pub use runner::ChannelOrchestrator;
pub use types::{CycleOutcome, CycleReport, OrchestratorError};
