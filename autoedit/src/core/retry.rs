//! Pure retry/backoff policy for model calls.
//!
//! The policy only decides; sleeping and audit emission live in
//! `io::model`, so every branch here is testable without I/O.

use std::time::Duration;

use serde::Serialize;

/// Failure classes observed at the model boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// HTTP 5xx.
    ServerError,
    /// HTTP 429.
    RateLimited,
    Timeout,
    NetworkError,
    /// Any other non-success HTTP status, or an unusable success body.
    ClientError,
    MissingCredential,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorClass::ServerError
                | ErrorClass::RateLimited
                | ErrorClass::Timeout
                | ErrorClass::NetworkError
        )
    }
}

/// Classify an HTTP status. `None` means success.
pub fn classify_status(status: u16) -> Option<ErrorClass> {
    match status {
        200..=299 => None,
        429 => Some(ErrorClass::RateLimited),
        500.. => Some(ErrorClass::ServerError),
        _ => Some(ErrorClass::ClientError),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Bounded exponential backoff without jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay after a failed `attempt` (1-based): `base_delay * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Decide what to do after `attempt` failed with `class`.
    pub fn decide(&self, attempt: u32, class: ErrorClass) -> RetryDecision {
        if !class.is_retryable() || attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.delay_for(attempt))
    }
}
