use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::CircuitConfig;
use crate::metrics;

/// Circuit state of a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "closed" => Some(CircuitState::Closed),
            "open" => Some(CircuitState::Open),
            "half_open" => Some(CircuitState::HalfOpen),
            _ => None,
        }
    }
}

/// Persisted breaker state for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// When the circuit last opened.
    pub opened_at: Option<DateTime<Utc>>,
    /// Cooldown of the current opening.
    pub cooldown_secs: u64,
    /// Reopenings since the circuit was last closed.
    pub reopen_count: u32,
}

impl CircuitSnapshot {
    /// When an open circuit lets the next trial through.
    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            CircuitState::Closed => None,
            _ => self
                .opened_at
                .map(|at| at + Duration::seconds(self.cooldown_secs as i64)),
        }
    }
}

/// Result of recording a cycle outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitTransition {
    pub snapshot: CircuitSnapshot,
    /// New state when the outcome changed it.
    pub changed_to: Option<CircuitState>,
}

/// In-memory circuit breaker keyed by channel id.
pub struct CircuitBreaker {
    config: CircuitConfig,
    circuits: Mutex<HashMap<String, CircuitSnapshot>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    fn circuits(&self) -> MutexGuard<'_, HashMap<String, CircuitSnapshot>> {
        self.circuits.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load persisted state for a channel if none is held yet.
    ///
    /// A half-open circuit is restored as open so the interrupted trial is
    /// granted again once.
    pub fn hydrate(&self, channel_id: &str, persisted: &CircuitSnapshot) {
        let mut circuits = self.circuits();
        circuits.entry(channel_id.to_string()).or_insert_with(|| {
            let mut snapshot = persisted.clone();
            if snapshot.state == CircuitState::HalfOpen {
                snapshot.state = CircuitState::Open;
            }
            snapshot
        });
    }

    /// Drop in-memory state, e.g. after the channel was re-added.
    pub fn forget(&self, channel_id: &str) {
        self.circuits().remove(channel_id);
    }

    pub fn snapshot(&self, channel_id: &str) -> CircuitSnapshot {
        self.circuits()
            .get(channel_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a cycle may poll this channel now.
    pub fn allow(&self, channel_id: &str) -> bool {
        self.allow_at(channel_id, Utc::now())
    }

    /// Open circuits grant exactly one trial once their cooldown has elapsed.
    pub fn allow_at(&self, channel_id: &str, now: DateTime<Utc>) -> bool {
        let mut circuits = self.circuits();
        let circuit = circuits.entry(channel_id.to_string()).or_default();

        match circuit.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let ready = circuit.retry_at().map(|at| now >= at).unwrap_or(true);
                if ready {
                    circuit.state = CircuitState::HalfOpen;
                    metrics::CIRCUIT_TRANSITIONS
                        .with_label_values(&[CircuitState::HalfOpen.as_str()])
                        .inc();
                    info!(channel_id = %channel_id, "Circuit half-open, allowing trial cycle");
                }
                ready
            }
        }
    }

    /// Return an unused trial, e.g. when the cycle was deferred for quota.
    ///
    /// The circuit goes back to open with its original cooldown, so the next
    /// `allow` grants the trial again.
    pub fn release_trial(&self, channel_id: &str) {
        let mut circuits = self.circuits();
        if let Some(circuit) = circuits.get_mut(channel_id) {
            if circuit.state == CircuitState::HalfOpen {
                circuit.state = CircuitState::Open;
            }
        }
    }

    pub fn record_outcome(&self, channel_id: &str, success: bool) -> CircuitTransition {
        self.record_outcome_at(channel_id, success, Utc::now())
    }

    pub fn record_outcome_at(
        &self,
        channel_id: &str,
        success: bool,
        now: DateTime<Utc>,
    ) -> CircuitTransition {
        let mut circuits = self.circuits();
        let circuit = circuits.entry(channel_id.to_string()).or_default();
        let before = circuit.state;

        if success {
            *circuit = CircuitSnapshot::default();
        } else {
            circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);
            match circuit.state {
                CircuitState::Closed => {
                    if circuit.consecutive_failures >= self.config.failure_threshold {
                        circuit.state = CircuitState::Open;
                        circuit.opened_at = Some(now);
                        circuit.reopen_count = 0;
                        circuit.cooldown_secs = self.config.cooldown_for(0);
                    }
                }
                CircuitState::HalfOpen => {
                    circuit.state = CircuitState::Open;
                    circuit.opened_at = Some(now);
                    circuit.reopen_count = circuit.reopen_count.saturating_add(1);
                    circuit.cooldown_secs = self.config.cooldown_for(circuit.reopen_count);
                }
                // A forced check failed while open; the cooldown stands.
                CircuitState::Open => {}
            }
        }

        let changed_to = (circuit.state != before).then_some(circuit.state);
        if let Some(state) = changed_to {
            metrics::CIRCUIT_TRANSITIONS
                .with_label_values(&[state.as_str()])
                .inc();
            match state {
                CircuitState::Open => warn!(
                    channel_id = %channel_id,
                    failures = circuit.consecutive_failures,
                    cooldown_secs = circuit.cooldown_secs,
                    "Circuit opened"
                ),
                _ => info!(channel_id = %channel_id, state = state.as_str(), "Circuit state changed"),
            }
        }

        CircuitTransition {
            snapshot: circuit.clone(),
            changed_to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(CircuitConfig {
            failure_threshold: 3,
            base_cooldown_secs: 60,
            max_cooldown_secs: 200,
        })
    }

    fn trip(breaker: &CircuitBreaker, at: i64) {
        for _ in 0..3 {
            breaker.record_outcome_at("c", false, t(at));
        }
    }

    #[test]
    fn test_closed_allows() {
        let breaker = breaker();
        assert!(breaker.allow_at("c", t(0)));
        assert_eq!(breaker.snapshot("c").state, CircuitState::Closed);
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = breaker();
        breaker.record_outcome_at("c", false, t(0));
        let transition = breaker.record_outcome_at("c", false, t(0));
        assert_eq!(transition.changed_to, None);
        assert!(breaker.allow_at("c", t(0)));

        let transition = breaker.record_outcome_at("c", false, t(0));
        assert_eq!(transition.changed_to, Some(CircuitState::Open));
        assert_eq!(transition.snapshot.cooldown_secs, 60);
        assert!(!breaker.allow_at("c", t(59)));
    }

    #[test]
    fn test_success_resets_failures() {
        let breaker = breaker();
        breaker.record_outcome_at("c", false, t(0));
        breaker.record_outcome_at("c", false, t(0));
        breaker.record_outcome_at("c", true, t(0));
        breaker.record_outcome_at("c", false, t(0));
        assert_eq!(breaker.snapshot("c").consecutive_failures, 1);
        assert_eq!(breaker.snapshot("c").state, CircuitState::Closed);
    }

    #[test]
    fn test_single_trial_after_cooldown() {
        let breaker = breaker();
        trip(&breaker, 0);

        assert!(!breaker.allow_at("c", t(30)));
        assert!(breaker.allow_at("c", t(60)));
        assert_eq!(breaker.snapshot("c").state, CircuitState::HalfOpen);
        assert!(!breaker.allow_at("c", t(61)));
        assert!(!breaker.allow_at("c", t(1000)));
    }

    #[test]
    fn test_half_open_success_closes() {
        let breaker = breaker();
        trip(&breaker, 0);
        assert!(breaker.allow_at("c", t(60)));

        let transition = breaker.record_outcome_at("c", true, t(61));
        assert_eq!(transition.changed_to, Some(CircuitState::Closed));
        assert_eq!(transition.snapshot, CircuitSnapshot::default());
        assert!(breaker.allow_at("c", t(62)));
    }

    #[test]
    fn test_half_open_failure_reopens_with_longer_cooldown() {
        let breaker = breaker();
        trip(&breaker, 0);

        assert!(breaker.allow_at("c", t(60)));
        let transition = breaker.record_outcome_at("c", false, t(60));
        assert_eq!(transition.changed_to, Some(CircuitState::Open));
        assert_eq!(transition.snapshot.cooldown_secs, 120);
        assert!(!breaker.allow_at("c", t(179)));
        assert!(breaker.allow_at("c", t(180)));

        let transition = breaker.record_outcome_at("c", false, t(180));
        assert_eq!(transition.snapshot.cooldown_secs, 200);
    }

    #[test]
    fn test_release_trial_grants_it_again() {
        let breaker = breaker();
        trip(&breaker, 0);

        assert!(breaker.allow_at("c", t(60)));
        breaker.release_trial("c");
        assert_eq!(breaker.snapshot("c").state, CircuitState::Open);
        assert!(breaker.allow_at("c", t(61)));
    }

    #[test]
    fn test_hydrate_restores_half_open_as_open() {
        let breaker = breaker();
        let persisted = CircuitSnapshot {
            state: CircuitState::HalfOpen,
            consecutive_failures: 4,
            opened_at: Some(t(0)),
            cooldown_secs: 60,
            reopen_count: 0,
        };
        breaker.hydrate("c", &persisted);

        let snapshot = breaker.snapshot("c");
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.opened_at, Some(t(0)));
        assert!(breaker.allow_at("c", t(60)));
    }

    #[test]
    fn test_hydrate_keeps_live_state() {
        let breaker = breaker();
        breaker.record_outcome_at("c", false, t(0));
        breaker.hydrate("c", &CircuitSnapshot::default());
        assert_eq!(breaker.snapshot("c").consecutive_failures, 1);

        breaker.forget("c");
        breaker.hydrate("c", &CircuitSnapshot::default());
        assert_eq!(breaker.snapshot("c").consecutive_failures, 0);
    }

    #[test]
    fn test_channels_are_independent() {
        let breaker = breaker();
        trip(&breaker, 0);
        assert!(!breaker.allow_at("c", t(1)));
        assert!(breaker.allow_at("other", t(1)));
    }

    #[test]
    fn test_retry_at() {
        let breaker = breaker();
        assert_eq!(breaker.snapshot("c").retry_at(), None);
        trip(&breaker, 0);
        assert_eq!(breaker.snapshot("c").retry_at(), Some(t(60)));
    }
}
