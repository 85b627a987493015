//! Per-channel circuit breaker.
//!
//! ```text
//! closed    -> open      after `failure_threshold` consecutive failed cycles
//! open      -> half-open once the cooldown has elapsed (one trial permitted)
//! half-open -> closed    on a successful cycle
//! half-open -> open      on a failed cycle, with a doubled (capped) cooldown
//! ```
//!
//! The breaker state lives in memory for fast `allow` checks and is mirrored
//! into the state store after every outcome, so it can be rebuilt on startup.

mod breaker;
mod config;

pub use breaker::{CircuitBreaker, CircuitSnapshot, CircuitState, CircuitTransition};
pub use config::CircuitConfig;
