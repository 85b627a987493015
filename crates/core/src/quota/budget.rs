use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use thiserror::Error;
use tokio::time::{Duration, Instant};

use super::QuotaConfig;
use crate::metrics;

/// Not enough budget left in the current window.
#[derive(Debug, Clone, Error)]
#[error("quota exceeded: requested {requested}, {remaining} remaining, resets in {}s", resets_in.as_secs())]
pub struct QuotaExceeded {
    pub requested: u64,
    pub remaining: u64,
    pub resets_in: Duration,
}

/// Snapshot of the current window.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatus {
    pub limit: u64,
    pub used: u64,
    pub remaining: u64,
    pub window_secs: u64,
    pub resets_in_secs: u64,
}

struct Window {
    started: Instant,
    used: u64,
}

/// Fixed-window counter shared by all channel cycles.
///
/// Units are reserved before a call is made; a reservation that does not fit
/// leaves the counter untouched.
pub struct QuotaBudget {
    limit: u64,
    window: Duration,
    state: Mutex<Window>,
}

impl QuotaBudget {
    pub fn new(config: &QuotaConfig) -> Self {
        Self {
            limit: config.limit_per_window,
            window: Duration::from_secs(config.window_secs),
            state: Mutex::new(Window {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    /// Lock the window, rolling it over if it has ended.
    fn current(&self) -> MutexGuard<'_, Window> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if now.duration_since(state.started) >= self.window {
            let elapsed_windows =
                now.duration_since(state.started).as_nanos() / self.window.as_nanos().max(1);
            state.started += self.window * elapsed_windows as u32;
            state.used = 0;
        }
        state
    }

    fn resets_in(&self, window: &Window) -> Duration {
        (window.started + self.window).saturating_duration_since(Instant::now())
    }

    /// Reserve `cost` units or fail without side effects.
    pub fn try_consume(&self, cost: u64) -> Result<(), QuotaExceeded> {
        let mut window = self.current();
        let remaining = self.limit.saturating_sub(window.used);
        if cost > remaining {
            metrics::QUOTA_DEFERRALS.inc();
            return Err(QuotaExceeded {
                requested: cost,
                remaining,
                resets_in: self.resets_in(&window),
            });
        }
        window.used += cost;
        metrics::QUOTA_UNITS_CONSUMED.inc_by(cost);
        Ok(())
    }

    /// Record units already spent upstream beyond the reservation.
    ///
    /// Never fails; usage saturates at the limit.
    pub fn charge(&self, cost: u64) {
        if cost == 0 {
            return;
        }
        let mut window = self.current();
        window.used = window.used.saturating_add(cost).min(self.limit);
        metrics::QUOTA_UNITS_CONSUMED.inc_by(cost);
    }

    /// Mark the window as spent, e.g. after the upstream API rejected a call
    /// for quota reasons the local counter did not predict.
    pub fn exhaust(&self) {
        let mut window = self.current();
        window.used = self.limit;
    }

    pub fn remaining(&self) -> u64 {
        let window = self.current();
        self.limit.saturating_sub(window.used)
    }

    pub fn status(&self) -> QuotaStatus {
        let window = self.current();
        QuotaStatus {
            limit: self.limit,
            used: window.used,
            remaining: self.limit.saturating_sub(window.used),
            window_secs: self.window.as_secs(),
            resets_in_secs: self.resets_in(&window).as_secs(),
        }
    }
}
