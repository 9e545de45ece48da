// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Per-layer retry policy.
//!
//! The exposure retry loop is the only retry in a build; every other failure
//! aborts. The policy decides how many faulted attempts a layer may absorb.

use super::fault::FaultKind;

/// Policy for retrying a faulted layer exposure.
pub trait RetryPolicy: Send + Sync {
    /// Whether another attempt is allowed after `retries` faulted attempts.
    fn should_retry(&self, retries: u32, fault: FaultKind) -> bool;

    /// Get the maximum number of retries allowed per layer.
    fn max_retries(&self) -> u32;
}

/// Allow up to a fixed number of retries per layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedRetry {
    max_retries: u32,
}

impl BoundedRetry {
    pub const DEFAULT_MAX_RETRIES: u32 = 10;

    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

impl Default for BoundedRetry {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RETRIES)
    }
}

impl RetryPolicy for BoundedRetry {
    fn should_retry(&self, retries: u32, _fault: FaultKind) -> bool {
        retries <= self.max_retries
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// No retry policy - the first fault aborts the build.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn should_retry(&self, _retries: u32, _fault: FaultKind) -> bool {
        false
    }

    fn max_retries(&self) -> u32 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_retry_limit() {
        let policy = BoundedRetry::default();
        assert_eq!(policy.max_retries(), 10);
        assert!(policy.should_retry(1, FaultKind::MeltTrip));
        assert!(policy.should_retry(10, FaultKind::JumpSafeTrip));
        assert!(!policy.should_retry(11, FaultKind::JumpSafeTrip));
    }

    #[test]
    fn test_bounded_retry_zero() {
        let policy = BoundedRetry::new(0);
        assert!(!policy.should_retry(1, FaultKind::SpatterSafeTrip));
    }

    #[test]
    fn test_no_retry() {
        let policy = NoRetry;
        assert!(!policy.should_retry(1, FaultKind::MeltTrip));
        assert_eq!(policy.max_retries(), 0);
    }
}
