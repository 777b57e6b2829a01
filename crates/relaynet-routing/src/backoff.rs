//! Per-peer exponential backoff
//!
//! The [`BackoffTracker`] remembers, per neighbor name, how long to wait
//! before the next attempt is allowed. Each failure doubles the cooldown
//! (starting at `base`, capped at `max`) and adds up to `jitter` of random
//! slack; a single success resets the peer.
//!
//! State is created lazily on the first report and lives for the process
//! lifetime. Times are taken from [`tokio::time::Instant`] so tests can
//! drive the clock with paused time.

use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tokio::time::Instant;

use crate::error::{RoutingError, RoutingResult};

/// Longest cooldown ever applied to a peer, jitter included
pub const MAX_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

/// Backoff tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Cooldown after the first failure
    pub base: Duration,
    /// Upper bound on the cooldown
    pub max: Duration,
    /// Random slack as a fraction of the cooldown (0.25 = up to +25%)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(10),
            jitter: 0.25,
        }
    }
}

impl BackoffConfig {
    /// Check that the values are usable
    pub fn validate(&self) -> RoutingResult<()> {
        if self.max < self.base {
            return Err(RoutingError::InvalidSetting {
                name: "backoff_max",
                reason: format!("{:?} is below base {:?}", self.max, self.base),
            });
        }
        if self.max > MAX_COOLDOWN {
            return Err(RoutingError::InvalidSetting {
                name: "backoff_max",
                reason: format!("{:?} is above the {:?} limit", self.max, MAX_COOLDOWN),
            });
        }
        if !self.jitter.is_finite() || self.jitter < 0.0 {
            return Err(RoutingError::InvalidSetting {
                name: "backoff_jitter",
                reason: format!("{} must be a non-negative fraction", self.jitter),
            });
        }
        Ok(())
    }
}

/// Backoff state of one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffState {
    /// Cooldown applied by the most recent report
    pub current_delay: Duration,
    /// Earliest instant at which another attempt is allowed
    pub next_allowed: Instant,
    /// Failures since the last success
    pub consecutive_failures: u32,
}

impl BackoffState {
    fn fresh(now: Instant) -> Self {
        Self {
            current_delay: Duration::ZERO,
            next_allowed: now,
            consecutive_failures: 0,
        }
    }
}

/// Tracks cooldowns for every neighbor
#[derive(Debug, Default)]
pub struct BackoffTracker {
    config: BackoffConfig,
    /// Per-peer state (peer name -> state)
    states: DashMap<String, BackoffState>,
}

impl BackoffTracker {
    /// Create a tracker with the given tuning
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
        }
    }

    /// Tuning in use
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Whether an attempt to `peer` is allowed now
    ///
    /// Peers that were never reported are always allowed.
    pub fn allow_attempt(&self, peer: &str) -> bool {
        match self.states.get(peer) {
            Some(state) => Instant::now() >= state.next_allowed,
            None => true,
        }
    }

    /// Time left until `peer` may be attempted again
    pub fn remaining(&self, peer: &str) -> Duration {
        self.states
            .get(peer)
            .map(|state| state.next_allowed.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Record a successful attempt
    pub fn on_success(&self, peer: &str) {
        let now = Instant::now();
        self.states.insert(
            peer.to_string(),
            BackoffState {
                current_delay: self.config.base,
                next_allowed: now,
                consecutive_failures: 0,
            },
        );
    }

    /// Record a failed attempt and push the next allowed attempt out
    ///
    /// Returns the cooldown applied, jitter included.
    pub fn on_failure(&self, peer: &str) -> Duration {
        let now = Instant::now();
        let mut state = self
            .states
            .entry(peer.to_string())
            .or_insert_with(|| BackoffState::fresh(now));

        let delay = state
            .current_delay
            .saturating_mul(2)
            .max(self.config.base)
            .min(self.config.max)
            .min(MAX_COOLDOWN);
        let cooldown = delay.saturating_add(self.jitter_for(delay)).min(MAX_COOLDOWN);

        state.current_delay = delay;
        state.next_allowed = now + cooldown;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        cooldown
    }

    /// State of one peer, if it was ever reported
    pub fn snapshot(&self, peer: &str) -> Option<BackoffState> {
        self.states.get(peer).map(|s| *s)
    }

    /// Forget every peer
    pub fn clear(&self) {
        self.states.clear();
    }

    fn jitter_for(&self, delay: Duration) -> Duration {
        let span = (delay.as_secs_f64() * self.config.jitter).min(MAX_COOLDOWN.as_secs_f64());
        if span <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(rand::rng().random_range(0.0..span)).unwrap_or(MAX_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(jitter: f64) -> BackoffTracker {
        BackoffTracker::new(BackoffConfig {
            base: Duration::from_secs(1),
            max: Duration::from_secs(10),
            jitter,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_peer_allowed() {
        let tracker = tracker(0.25);
        assert!(tracker.allow_attempt("B"));
        assert!(tracker.snapshot("B").is_none());
        assert_eq!(tracker.remaining("B"), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_failure_uses_base() {
        let tracker = tracker(0.0);

        let cooldown = tracker.on_failure("B");
        assert_eq!(cooldown, Duration::from_secs(1));
        assert!(!tracker.allow_attempt("B"));

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!tracker.allow_attempt("B"));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(tracker.allow_attempt("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_doubles_and_caps() {
        let tracker = tracker(0.0);

        let delays: Vec<Duration> = (0..6).map(|_| tracker.on_failure("B")).collect();
        assert_eq!(
            delays,
            [1, 2, 4, 8, 10, 10].map(Duration::from_secs).to_vec()
        );
        assert_eq!(tracker.snapshot("B").unwrap().consecutive_failures, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_n_failures_hold_at_least_base_times_two_pow() {
        let tracker = tracker(0.25);

        for n in 1..=3u32 {
            tracker.on_failure("C");
            let floor = Duration::from_secs(1) * 2u32.pow(n - 1);
            let remaining = tracker.remaining("C");
            assert!(remaining >= floor, "n={n}: {remaining:?} < {floor:?}");
            assert!(remaining <= floor.mul_f64(1.25), "n={n}: jitter too large");
        }

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!tracker.allow_attempt("C"));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(tracker.allow_attempt("C"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets() {
        let tracker = tracker(0.25);
        tracker.on_failure("B");
        tracker.on_failure("B");
        assert!(!tracker.allow_attempt("B"));

        tracker.on_success("B");
        assert!(tracker.allow_attempt("B"));

        let state = tracker.snapshot("B").unwrap();
        assert_eq!(state.current_delay, Duration::from_secs(1));
        assert_eq!(state.consecutive_failures, 0);

        // after a reset the next failure starts over at base * 2, not the old delay
        let cooldown = tracker.on_failure("B");
        assert!(cooldown >= Duration::from_secs(2));
        assert!(cooldown <= Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_peers_are_independent() {
        let tracker = tracker(0.0);
        tracker.on_failure("B");
        assert!(!tracker.allow_attempt("B"));
        assert!(tracker.allow_attempt("C"));

        tracker.clear();
        assert!(tracker.allow_attempt("B"));
    }

    #[test]
    fn test_config_validation() {
        assert!(BackoffConfig::default().validate().is_ok());

        let inverted = BackoffConfig {
            base: Duration::from_secs(5),
            max: Duration::from_secs(1),
            jitter: 0.0,
        };
        assert!(inverted.validate().is_err());

        let negative = BackoffConfig {
            jitter: -0.5,
            ..BackoffConfig::default()
        };
        assert!(negative.validate().is_err());

        let huge = BackoffConfig {
            max: Duration::MAX,
            ..BackoffConfig::default()
        };
        assert!(huge.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_settings_are_clamped() {
        // built without validation
        let tracker = BackoffTracker::new(BackoffConfig {
            base: Duration::MAX,
            max: Duration::MAX,
            jitter: 1e300,
        });

        for _ in 0..3 {
            assert!(tracker.on_failure("B") <= MAX_COOLDOWN);
        }
        assert!(!tracker.allow_attempt("B"));
        assert!(tracker.remaining("B") <= MAX_COOLDOWN);

        tracker.on_success("B");
        assert!(tracker.allow_attempt("B"));
    }
}
