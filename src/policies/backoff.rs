//! # Retry backoff.
//!
//! The delay before retry `n` (0-based) is `first × factor^n`, capped at
//! `max`, with jitter applied last. The base is derived from `n` alone, so
//! jitter never compounds across retries.
//!
//! ```rust
//! use std::time::Duration;
//! use tunevisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(500),
//!     max: Duration::from_secs(4),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//! assert_eq!(backoff.next(0), Duration::from_millis(500));
//! assert_eq!(backoff.next(1), Duration::from_secs(1));
//! assert_eq!(backoff.next(9), Duration::from_secs(4));
//! ```

use std::time::Duration;

use super::jitter::JitterPolicy;

/// Delay schedule between retries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Growth per retry.
    pub factor: f64,
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// 500ms doubling up to 30s, equal jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn next(&self, retry: u32) -> Duration {
        let exp = retry.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        let base = if secs.is_finite() && secs >= 0.0 && secs <= self.max.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max
        };
        self.jitter.apply(base)
    }
}

/// Bounded retry budget: how many extra attempts and how long to wait between them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    pub backoff: BackoffPolicy,
}

impl RetryPolicy {
    /// A single retry after the default backoff.
    pub fn once() -> Self {
        Self {
            retries: 1,
            backoff: BackoffPolicy::default(),
        }
    }

    /// No retries at all.
    pub fn never() -> Self {
        Self {
            retries: 0,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Delay before retry `retry`, or `None` when the budget is spent.
    pub fn delay(&self, retry: u32) -> Option<Duration> {
        (retry < self.retries).then(|| self.backoff.next(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}
