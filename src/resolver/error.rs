//! Error types for metadata resolution.

use thiserror::Error;

/// Errors that can occur while resolving a link to file descriptors.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The metadata service could not be reached.
    #[error("metadata service unreachable for '{link}': {reason}")]
    Unreachable {
        /// Link being resolved.
        link: String,
        /// Transport error text.
        reason: String,
    },

    /// The request did not complete in time.
    #[error("metadata request for '{link}' timed out after {timeout_secs}s")]
    Timeout {
        /// Link being resolved.
        link: String,
        /// Timeout that elapsed.
        timeout_secs: u64,
    },

    /// The service answered with a non-success status.
    #[error("metadata service returned HTTP {status} for '{link}'")]
    HttpStatus {
        /// Link being resolved.
        link: String,
        /// Status code.
        status: u16,
    },

    /// The response body could not be interpreted.
    #[error("malformed metadata response for '{link}': {reason}")]
    MalformedResponse {
        /// Link being resolved.
        link: String,
        /// What was wrong with the body.
        reason: String,
    },

    /// The HTTP client could not be configured.
    #[error("failed to configure metadata client: {reason}\n  Suggestion: {suggestion}")]
    Client {
        /// Why construction failed.
        reason: String,
        /// How to fix the issue.
        suggestion: String,
    },
}

impl ResolveError {
    /// Creates an `Unreachable` error.
    #[must_use]
    pub fn unreachable(link: &str, reason: &str) -> Self {
        Self::Unreachable {
            link: link.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates a `Timeout` error.
    #[must_use]
    pub fn timeout(link: &str, timeout_secs: u64) -> Self {
        Self::Timeout {
            link: link.to_string(),
            timeout_secs,
        }
    }

    /// Creates an `HttpStatus` error.
    #[must_use]
    pub fn http_status(link: &str, status: u16) -> Self {
        Self::HttpStatus {
            link: link.to_string(),
            status,
        }
    }

    /// Creates a `MalformedResponse` error.
    #[must_use]
    pub fn malformed(link: &str, reason: &str) -> Self {
        Self::MalformedResponse {
            link: link.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates a `Client` error.
    #[must_use]
    pub fn client(reason: &str) -> Self {
        Self::Client {
            reason: reason.to_string(),
            suggestion: "Check the resolver base URL and proxy settings".to_string(),
        }
    }

    /// Whether a later attempt could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => {
                *status >= 500 || matches!(*status, 408 | 429)
            }
            Self::MalformedResponse { .. } | Self::Client { .. } => false,
        }
    }
}
