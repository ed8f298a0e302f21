//! Bounded fixed-delay retry policy
//!
//! The orchestrator owns the retry loop; this type decides how many times
//! and how long to wait. Only transient failures are eligible — auth errors
//! go to the refresh coordinator and never consume the generic counter.

use std::time::Duration;

use crate::error::Error;

/// Retry configuration for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (3 means up to 4 attempts total).
    pub retries: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Policy for one request, honoring a per-request retry override.
    pub fn with_retries(&self, retries: Option<u32>) -> Self {
        Self {
            retries: retries.unwrap_or(self.retries),
            delay: self.delay,
        }
    }

    /// Whether another attempt is allowed after this error, given how many
    /// retries have already run.
    pub fn should_retry(&self, error: &Error, attempted: u32) -> bool {
        attempted < self.retries && error.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error() -> Error {
        Error::Business {
            url: "u".into(),
            status: Some(500),
            code: None,
            message: "m".into(),
        }
    }

    #[test]
    fn retries_transient_until_exhausted() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        assert!(policy.should_retry(&server_error(), 0));
        assert!(policy.should_retry(&server_error(), 1));
        assert!(!policy.should_retry(&server_error(), 2));
    }

    #[test]
    fn auth_and_cancel_never_retry() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let auth = Error::Unauthorized {
            url: "u".into(),
            message: "m".into(),
        };
        let cancelled = Error::Cancelled { url: "u".into() };
        assert!(!policy.should_retry(&auth, 0));
        assert!(!policy.should_retry(&cancelled, 0));
    }

    #[test]
    fn per_request_override_wins() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.with_retries(Some(0)).retries, 0);
        assert_eq!(policy.with_retries(None).retries, policy.retries);
        // Delay is not overridable per request
        assert_eq!(policy.with_retries(Some(9)).delay, policy.delay);
    }
}
