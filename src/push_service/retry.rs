//! Bounded retry policy for the connect sequence.
//!
//! A [`RetryPolicy`] describes how many times to retry and how long to
//! wait between attempts. Each run gets its own [`RetryState`], which
//! counts attempts and keeps the most recent failure so that exhaustion
//! always reports the final attempt's error.

use std::time::Duration;

use crate::error::PushError;

/// Upper bound on the delay between attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Retry bound and backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
}

impl Default for RetryPolicy {
    /// Five retries (six attempts), starting at one second.
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Retry up to `max_retries` times after the first attempt.
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
        }
    }

    /// Retries allowed after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Begin tracking a fresh run.
    pub fn start(&self) -> RetryState {
        RetryState {
            policy: *self,
            attempts: 0,
            last_error: None,
        }
    }

    /// Delay before the retry following `failed_attempts` failures.
    fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(MAX_BACKOFF)
    }
}

/// Progress of one retry run.
#[derive(Debug)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
    last_error: Option<PushError>,
}

impl RetryState {
    /// Record a failed attempt.
    ///
    /// Returns the delay before the next attempt, or `None` once the
    /// bound is reached.
    pub fn record_failure(&mut self, error: PushError) -> Option<Duration> {
        self.attempts += 1;
        self.last_error = Some(error);
        (self.attempts < self.policy.max_attempts()).then(|| self.policy.backoff(self.attempts))
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Convert into the fatal exhaustion error.
    pub fn exhausted(self) -> PushError {
        let last = self.last_error.unwrap_or_else(|| {
            PushError::Connection(anyhow::anyhow!("no connect attempt was made"))
        });
        PushError::RetriesExhausted {
            attempts: self.attempts,
            last: Box::new(last),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(n: u32) -> PushError {
        PushError::Connection(anyhow::anyhow!("attempt {n} refused"))
    }

    #[test]
    fn test_default_allows_six_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 5);
        assert_eq!(policy.max_attempts(), 6);
    }

    #[test]
    fn test_stops_after_bound() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let mut state = policy.start();
        for n in 1..=5 {
            assert!(state.record_failure(failure(n)).is_some(), "attempt {n}");
        }
        assert!(state.record_failure(failure(6)).is_none());
        assert_eq!(state.attempts(), 6);
    }

    #[test]
    fn test_exhausted_reports_last_error() {
        let mut state = RetryPolicy::new(2, Duration::ZERO).start();
        while state.record_failure(failure(state.attempts() + 1)).is_some() {}

        match state.exhausted() {
            PushError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.to_string().contains("attempt 3 refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_retries_means_single_attempt() {
        let mut state = RetryPolicy::new(0, Duration::ZERO).start();
        assert!(state.record_failure(failure(1)).is_none());
        assert_eq!(state.attempts(), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1));
        let mut state = policy.start();
        assert_eq!(state.record_failure(failure(1)), Some(Duration::from_secs(1)));
        assert_eq!(state.record_failure(failure(2)), Some(Duration::from_secs(2)));
        assert_eq!(state.record_failure(failure(3)), Some(Duration::from_secs(4)));
        for n in 4..=9 {
            state.record_failure(failure(n));
        }
        assert_eq!(state.record_failure(failure(10)), Some(MAX_BACKOFF));
    }
}
