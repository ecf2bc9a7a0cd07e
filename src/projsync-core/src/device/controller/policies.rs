// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Retry policy for whole poll cycles.
//!
//! A cycle that hits a device timeout is retried from the start; any other
//! error ends the cycle immediately. Retry counters never outlive a cycle.

use std::time::Duration;

use crate::device::response::SyncError;

/// Policy for retrying failed cycles.
pub trait RetryPolicy: Send + Sync {
    /// Determine if the cycle should be retried after `attempt` failed.
    /// `attempt` counts from zero for the initial try.
    fn should_retry(&self, attempt: u32, error: &SyncError) -> bool;

    /// Get the delay before the next retry attempt.
    fn delay(&self, attempt: u32) -> Duration;

    /// Get the maximum number of attempts allowed, initial try included.
    fn max_attempts(&self) -> u32;
}

/// Fixed delay retry policy.
///
/// Uses a constant delay between retry attempts.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    max_retries: u32,
    delay: Duration,
}

impl FixedDelay {
    /// Create a new fixed delay policy allowing `max_retries` retries.
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self {
            max_retries: 12,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy for FixedDelay {
    fn should_retry(&self, attempt: u32, error: &SyncError) -> bool {
        attempt < self.max_retries && error.is_transient()
    }

    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }

    fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let policy = FixedDelay::new(3, Duration::from_millis(500));

        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(5), Duration::from_millis(500));
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn test_only_timeouts_are_retried() {
        let policy = FixedDelay::new(2, Duration::from_millis(10));
        let timeout = SyncError::DeviceTimeout("power".into());
        let fatal = SyncError::Transport {
            name: "power".into(),
            detail: "garbled reply".to_string(),
        };

        assert!(policy.should_retry(0, &timeout));
        assert!(policy.should_retry(1, &timeout));
        assert!(!policy.should_retry(2, &timeout)); // retries spent

        assert!(!policy.should_retry(0, &fatal));
        assert!(!policy.should_retry(0, &SyncError::UnknownCommand("lens".into())));
    }

    #[test]
    fn test_defaults() {
        let policy = FixedDelay::default();
        assert_eq!(policy.max_retries(), 12);
        assert_eq!(policy.delay(0), Duration::from_secs(1));
    }
}
