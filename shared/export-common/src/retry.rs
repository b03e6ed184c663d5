//! Retry primitives for database operations
//!
//! Bounded retries with a fixed (or optionally growing) delay. Waits race a
//! cancellation token so a stop request never sits out a backoff sleep.

use backoff::{backoff::Backoff, backoff::Constant, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::DatabaseError;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts after the first one
    pub max_retries: u32,
    pub delay: Duration,
    /// Values above 1.0 grow the delay exponentially (no jitter)
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(2),
            multiplier: 1.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Fixed delay between attempts
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            ..Default::default()
        }
    }

    fn to_backoff(&self) -> Box<dyn Backoff + Send> {
        if self.multiplier <= 1.0 {
            return Box::new(Constant::new(self.delay));
        }

        Box::new(ExponentialBackoff {
            current_interval: self.delay,
            initial_interval: self.delay,
            max_interval: self.max_delay.max(self.delay),
            multiplier: self.multiplier,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..Default::default()
        })
    }
}

/// Trait to determine if an error is retryable
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for DatabaseError {
    fn is_retryable(&self) -> bool {
        self.is_connectivity()
    }
}

/// Tracks the retries spent on one operation
pub struct RetryState {
    max_retries: u32,
    retries: u32,
    backoff: Box<dyn Backoff + Send>,
}

impl RetryState {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retries: 0,
            backoff: config.to_backoff(),
        }
    }

    /// Delay before the next attempt, or `None` when the error is final
    pub fn next_delay<E>(&mut self, error: &E) -> Option<Duration>
    where
        E: IsRetryable + std::fmt::Display,
    {
        if !error.is_retryable() {
            debug!("Error is not retryable: {}", error);
            return None;
        }
        if self.retries >= self.max_retries {
            warn!(
                "Operation failed after {} attempts, error: {}",
                self.retries + 1,
                error
            );
            return None;
        }

        let delay = self.backoff.next_backoff()?;
        self.retries += 1;
        warn!(
            "Operation failed (retry {}/{}), retrying in {:?}. Error: {}",
            self.retries, self.max_retries, delay, error
        );
        Some(delay)
    }

    /// Retries consumed so far
    pub fn retries(&self) -> u32 {
        self.retries
    }
}

/// Sleep for `delay` unless cancelled first. Returns false when cancelled.
pub async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.delay, Duration::from_secs(2));
    }

    #[test]
    fn test_fixed_delay_until_exhausted() {
        let config = RetryConfig::new(2, Duration::from_millis(50));
        let mut state = RetryState::new(&config);
        let err = DatabaseError::Connection("reset by peer".to_string());

        assert_eq!(state.next_delay(&err), Some(Duration::from_millis(50)));
        assert_eq!(state.next_delay(&err), Some(Duration::from_millis(50)));
        assert_eq!(state.next_delay(&err), None);
        assert_eq!(state.retries(), 2);
    }

    #[test]
    fn test_statement_errors_are_final() {
        let mut state = RetryState::new(&RetryConfig::new(5, Duration::from_millis(1)));
        let err = DatabaseError::Statement("syntax error".to_string());
        assert_eq!(state.next_delay(&err), None);
        assert_eq!(state.retries(), 0);
    }

    #[test]
    fn test_exponential_growth() {
        let config = RetryConfig {
            max_retries: 3,
            delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(300),
        };
        let mut state = RetryState::new(&config);
        let err = DatabaseError::Connection("timeout".to_string());

        assert_eq!(state.next_delay(&err), Some(Duration::from_millis(100)));
        assert_eq!(state.next_delay(&err), Some(Duration::from_millis(200)));
        assert_eq!(state.next_delay(&err), Some(Duration::from_millis(300)));
    }

    #[test]
    fn test_zero_retries() {
        let mut state = RetryState::new(&RetryConfig::new(0, Duration::ZERO));
        let err = DatabaseError::Connection("refused".to_string());
        assert_eq!(state.next_delay(&err), None);
    }

    #[tokio::test]
    async fn test_sleep_completes() {
        let cancel = CancellationToken::new();
        assert!(sleep_or_cancel(&cancel, Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        assert!(!sleep_or_cancel(&cancel, Duration::from_secs(30)).await);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
