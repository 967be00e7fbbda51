//! A failure-rate circuit breaker wrapping external collaborators (LLM
//! vendor, search provider). State machine: closed -> open -> half-open,
//! thresholds per spec.md §5: 5 failures within a 60s window opens the
//! circuit; a 30s cooldown moves it to half-open on the next call.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    name: &'static str,
    failures: AtomicU32,
    window_start_us: AtomicU64,
    open_until_us: AtomicU64,
    threshold: u32,
    window: Duration,
    reset: Duration,
    epoch: Instant,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, threshold: u32, window: Duration, reset: Duration) -> Self {
        Self {
            name,
            failures: AtomicU32::new(0),
            window_start_us: AtomicU64::new(0),
            open_until_us: AtomicU64::new(0),
            threshold,
            window,
            reset,
            epoch: Instant::now(),
        }
    }

    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    pub fn state(&self) -> CircuitState {
        let open_until = self.open_until_us.load(Ordering::Acquire);
        if open_until == 0 {
            return CircuitState::Closed;
        }
        if self.now_us() >= open_until {
            CircuitState::HalfOpen
        } else {
            CircuitState::Open
        }
    }

    /// Fails fast with the seconds remaining before half-open if the circuit
    /// is open; otherwise allows the call through (closed or half-open --
    /// the latter lets exactly one trial call proceed).
    pub fn check(&self) -> Result<(), u64> {
        match self.state() {
            CircuitState::Open => {
                let open_until = self.open_until_us.load(Ordering::Acquire);
                let remaining_us = open_until.saturating_sub(self.now_us());
                Err((remaining_us / 1_000_000).max(1))
            },
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
        }
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Release);
        self.window_start_us.store(0, Ordering::Release);
        self.open_until_us.store(0, Ordering::Release);
    }

    pub fn record_failure(&self) {
        let now = self.now_us();
        let window_us = self.window.as_micros() as u64;
        let window_start = self.window_start_us.load(Ordering::Acquire);

        let failures = if window_start == 0 || now.saturating_sub(window_start) > window_us {
            self.window_start_us.store(now, Ordering::Release);
            self.failures.store(1, Ordering::Release);
            1
        } else {
            self.failures.fetch_add(1, Ordering::AcqRel) + 1
        };

        if failures >= self.threshold {
            let open_until = now + self.reset.as_micros() as u64;
            self.open_until_us.store(open_until, Ordering::Release);
            tracing::warn!(collaborator = self.name, failures, "circuit breaker opened");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("test", 5, Duration::from_secs(60), Duration::from_millis(50))
    }

    #[test]
    fn starts_closed() {
        let cb = breaker();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.check().is_ok());
    }

    #[test]
    fn stays_closed_under_threshold() {
        let cb = breaker();
        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn opens_at_threshold() {
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.check().is_err());
    }

    #[test]
    fn transitions_to_half_open_after_reset() {
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.check().is_ok());
    }

    #[test]
    fn success_resets_failures() {
        let cb = breaker();
        for _ in 0..4 {
            cb.record_failure();
        }
        cb.record_success();
        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
