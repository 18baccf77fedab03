//! Retry logic with backoff for transient failures.
//!
//! When an attempt fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - Temporary failures that may succeed on retry
//! - [`FailureType::Permanent`] - Failures that won't succeed regardless of retries
//! - [`FailureType::AccessDenied`] - The transfer URL was refused (usually expired);
//!   repeating the same URL will not help, a fresh one is needed
//! - [`FailureType::RateLimited`] - Server rate limiting (retries with backoff)
//!
//! The [`RetryPolicy`] then decides whether to retry based on failure type
//! and attempt count. Delays grow linearly (`base * attempt`) or
//! exponentially (`base * multiplier^(attempt-1)`), are capped, and get
//! random jitter.
//!
//! # Example
//!
//! ```
//! use linkrelay_core::download::{
//!     TransferError, RetryPolicy, FailureType, RetryDecision, classify_error
//! };
//!
//! let policy = RetryPolicy::default();
//! let error = TransferError::http_status("https://cdn.example.com/a.mp4", 503);
//! let failure_type = classify_error(&error);
//!
//! match policy.should_retry(failure_type, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::TransferError;

/// Default maximum attempts per transfer.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay (2 seconds, so 2s, 4s, 6s with the linear curve).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Maximum jitter added to delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network timeout, 5xx server errors, short body.
    Transient,

    /// Permanent failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, 400 Bad Request, invalid URL, local disk errors.
    Permanent,

    /// The server refused the transfer URL (401/403).
    AccessDenied,

    /// Server rate limiting (HTTP 429).
    RateLimited,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Shape of the delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffCurve {
    /// `base * attempt`
    Linear,
    /// `base * multiplier^(attempt - 1)`
    Exponential {
        /// Growth factor per attempt.
        multiplier: f32,
    },
}

/// Configuration for retry behavior.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `base_delay`: 2 seconds
/// - `max_delay`: 32 seconds
/// - `curve`: linear
/// - `max_jitter`: 500ms
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// How delays grow.
    curve: BackoffCurve,

    /// Upper bound of the random jitter added to each delay.
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            curve: BackoffCurve::Linear,
            max_jitter: MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates an exponential-backoff policy.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum attempts including initial (clamped to >= 1)
    /// * `base_delay` - Base delay for first retry
    /// * `max_delay` - Maximum delay cap
    /// * `backoff_multiplier` - Multiplier for exponential increase
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            curve: BackoffCurve::Exponential {
                multiplier: backoff_multiplier,
            },
            max_jitter: MAX_JITTER,
        }
    }

    /// Creates a linear-backoff policy (`base * attempt`).
    #[must_use]
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns a copy of this policy allowing `max_attempts` attempts.
    #[must_use]
    pub fn limited_to(&self, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..self.clone()
        }
    }

    /// Removes jitter, making delays deterministic.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.max_jitter = Duration::ZERO;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::AccessDenied => {
                return RetryDecision::DoNotRetry {
                    reason: "access denied - the same URL would be refused again".to_string(),
                };
            }
            FailureType::Transient | FailureType::RateLimited => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.backoff_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed), jitter included.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let attempt = attempt.max(1);

        let delay_ms = match self.curve {
            BackoffCurve::Linear => base_ms * f64::from(attempt),
            BackoffCurve::Exponential { multiplier } => {
                base_ms * f64::from(multiplier).powf(f64::from(attempt - 1))
            }
        };

        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.calculate_jitter()
    }

    /// Generates random jitter between 0 and `max_jitter`.
    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(0..=max_ms))
    }
}

/// Classifies a transfer error into a failure type for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | HTTP 408, 5xx | Transient |
/// | HTTP 429 | RateLimited |
/// | HTTP 401, 403 | AccessDenied |
/// | Other HTTP 4xx | Permanent |
/// | Timeout, network (non-TLS) | Transient |
/// | Short or long body | Transient |
/// | Rejected resume offset | Transient (partial already discarded) |
/// | TLS, IO, invalid URL | Permanent |
#[instrument(level = "debug")]
pub fn classify_error(error: &TransferError) -> FailureType {
    match error {
        TransferError::HttpStatus { status, .. } => classify_http_status(*status),

        TransferError::AccessDenied { .. } => FailureType::AccessDenied,

        TransferError::Timeout { .. }
        | TransferError::Integrity { .. }
        | TransferError::RangeNotSatisfiable { .. } => FailureType::Transient,

        TransferError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }

        TransferError::Io { .. }
        | TransferError::InvalidUrl { .. }
        | TransferError::ClientSetup { .. }
        | TransferError::Exhausted { .. } => FailureType::Permanent,
    }
}

/// Classifies an HTTP status code into a failure type.
#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        400 => FailureType::Permanent,    // Bad Request
        401 => FailureType::AccessDenied, // Unauthorized
        403 => FailureType::AccessDenied, // Forbidden
        404 => FailureType::Permanent,    // Not Found
        408 => FailureType::Transient,    // Request Timeout
        410 => FailureType::Permanent,    // Gone
        429 => FailureType::RateLimited,  // Too Many Requests

        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,

        _ => FailureType::Permanent,
    }
}

/// Checks if a reqwest error is a TLS/certificate error.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== RetryPolicy Tests ====================

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.max_delay, Duration::from_secs(32));
        assert_eq!(policy.curve, BackoffCurve::Linear);
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        assert_eq!(RetryPolicy::with_max_attempts(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::default().limited_to(0).max_attempts(), 1);
    }

    #[test]
    fn test_limited_to_keeps_curve_and_base() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(10))
            .without_jitter()
            .limited_to(7);
        assert_eq!(policy.max_attempts(), 7);
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(20));
    }

    // ==================== Delay Calculation Tests ====================

    #[test]
    fn test_linear_delays_grow_by_base() {
        let policy = RetryPolicy::linear(5, Duration::from_secs(3)).without_jitter();
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(3));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(6));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(9));
    }

    #[test]
    fn test_exponential_delays_double() {
        let policy =
            RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(32), 2.0).without_jitter();
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_respects_max_delay() {
        let policy =
            RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5), 2.0).without_jitter();
        assert_eq!(policy.backoff_delay(6), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_within_bounds() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(1));
        for _ in 0..100 {
            let delay = policy.backoff_delay(1);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1500), "{delay:?}");
        }
    }

    // ==================== Error Classification Tests ====================

    #[test]
    fn test_classify_http_statuses() {
        let cases = [
            (400, FailureType::Permanent),
            (401, FailureType::AccessDenied),
            (403, FailureType::AccessDenied),
            (404, FailureType::Permanent),
            (408, FailureType::Transient),
            (429, FailureType::RateLimited),
            (500, FailureType::Transient),
            (503, FailureType::Transient),
        ];
        for (status, expected) in cases {
            let error = TransferError::http_status("http://cdn.example.com", status);
            assert_eq!(classify_error(&error), expected, "status {status}");
        }
    }

    #[test]
    fn test_classify_integrity_transient() {
        let error = TransferError::integrity("/tmp/a.part", 10, 4);
        assert_eq!(classify_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_classify_io_permanent() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = TransferError::io("/staging/a", io_err);
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_classify_timeout_and_range_transient() {
        assert_eq!(
            classify_error(&TransferError::timeout("http://x")),
            FailureType::Transient
        );
        let range = TransferError::RangeNotSatisfiable {
            url: "http://x".into(),
            offset: 5,
        };
        assert_eq!(classify_error(&range), FailureType::Transient);
    }

    // ==================== Should Retry Decision Tests ====================

    #[test]
    fn test_should_retry_permanent_does_not_retry() {
        let decision = RetryPolicy::default().should_retry(FailureType::Permanent, 1);
        assert!(matches!(decision, RetryDecision::DoNotRetry { reason } if reason.contains("permanent")));
    }

    #[test]
    fn test_should_retry_access_denied_does_not_retry() {
        let decision = RetryPolicy::default().should_retry(FailureType::AccessDenied, 1);
        assert!(matches!(decision, RetryDecision::DoNotRetry { .. }));
    }

    #[test]
    fn test_should_retry_transient_until_exhausted() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(1)).without_jitter();
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry { attempt: 2, .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::RateLimited, 2),
            RetryDecision::Retry { attempt: 3, .. }
        ));
        let last = policy.should_retry(FailureType::Transient, 3);
        assert!(matches!(last, RetryDecision::DoNotRetry { reason } if reason.contains("exhausted")));
    }
}
