// Circuit breaker and retry backoff for bus handlers
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Breaker state for one handler identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Outcome of asking the breaker whether a delivery may proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Cooldown elapsed; this call is the single trial
    Trial,
    Rejected,
}

/// Per-handler failure isolation.
///
/// Closed -> Open after `threshold` consecutive failures, Open -> HalfOpen once
/// `cooldown` has elapsed, HalfOpen -> Closed on success and HalfOpen -> Open on failure.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            threshold: threshold.max(1),
            cooldown,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    /// Decide whether a call may go through, flipping Open to HalfOpen when the cooldown is over
    pub fn admit(&mut self, now: Instant) -> Admission {
        match self.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::HalfOpen => Admission::Trial,
            CircuitState::Open => {
                let cooled = self
                    .opened_at
                    .map_or(true, |opened| now.duration_since(opened) >= self.cooldown);
                if cooled {
                    self.state = CircuitState::HalfOpen;
                    tracing::debug!("Circuit breaker half-open after cooldown");
                    Admission::Trial
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.state = CircuitState::Closed;
    }

    /// Record a failure; returns true when this failure opened the breaker
    pub fn record_failure(&mut self, now: Instant) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let should_open = match self.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => self.consecutive_failures >= self.threshold,
            CircuitState::Open => false,
        };
        if should_open {
            self.state = CircuitState::Open;
            self.opened_at = Some(now);
        }
        should_open
    }

    pub fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }
}

/// Exponential backoff policy for retrying a failed handler or callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Self::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_multiplier(mut self, backoff_multiplier: f64) -> Self {
        self.backoff_multiplier = backoff_multiplier;
        self
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        std::cmp::min(Duration::from_millis(millis as u64), self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_opens_at_threshold() {
        let now = Instant::now();
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(10));

        assert!(!breaker.record_failure(now));
        assert!(!breaker.record_failure(now));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.record_failure(now));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.is_open());
        assert_eq!(breaker.admit(now), Admission::Rejected);
    }

    #[test]
    fn test_breaker_half_open_after_cooldown() {
        let now = Instant::now();
        let mut breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        breaker.record_failure(now);

        assert_eq!(breaker.admit(now + Duration::from_secs(5)), Admission::Rejected);
        assert_eq!(breaker.admit(now + Duration::from_secs(10)), Admission::Trial);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let now = Instant::now();
        let mut breaker = CircuitBreaker::new(5, Duration::from_secs(1));
        for _ in 0..5 {
            breaker.record_failure(now);
        }
        let later = now + Duration::from_secs(2);
        assert_eq!(breaker.admit(later), Admission::Trial);
        assert!(breaker.record_failure(later));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.opened_at(), Some(later));
    }

    #[test]
    fn test_half_open_success_closes() {
        let now = Instant::now();
        let mut breaker = CircuitBreaker::new(1, Duration::from_millis(1));
        breaker.record_failure(now);
        breaker.admit(now + Duration::from_millis(5));
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let now = Instant::now();
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(1));
        breaker.record_failure(now);
        breaker.record_failure(now);
        breaker.record_success();
        assert!(!breaker.record_failure(now));
        assert_eq!(breaker.consecutive_failures(), 1);
    }

    #[test]
    fn test_retry_backoff_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(350));

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(4), Duration::from_millis(350));
    }

    #[test]
    fn test_retry_multiplier() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10)).with_multiplier(3.0);

        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(30));
        assert_eq!(policy.delay_for(3), Duration::from_millis(90));
    }
}
