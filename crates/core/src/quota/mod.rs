//! Process-wide budget for content source calls.

mod budget;
mod config;

pub use budget::{QuotaBudget, QuotaExceeded, QuotaStatus};
pub use config::QuotaConfig;
