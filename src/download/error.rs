//! Error types for the transfer module.
//!
//! Variants carry the URL or path they concern; the helper constructors
//! attach that context, which is why no `From<reqwest::Error>` or
//! `From<std::io::Error>` conversions exist.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while transferring a file.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Network-level error (DNS resolution, connection refused, reset mid-body, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The attempt did not complete in time.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present.
        retry_after: Option<String>,
    },

    /// The transfer URL was refused, usually because it expired.
    #[error("access denied (HTTP {status}) downloading {url}; the transfer URL may have expired")]
    AccessDenied {
        /// The refused URL.
        url: String,
        /// The HTTP status code (401 or 403).
        status: u16,
    },

    /// The server rejected the resume offset; the partial file was discarded.
    #[error("server rejected resume at byte {offset} for {url}")]
    RangeNotSatisfiable {
        /// The URL being resumed.
        url: String,
        /// Offset that was requested.
        offset: u64,
    },

    /// File system error while staging.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The URL is malformed or uses an unsupported scheme.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Received byte count does not match the declared length.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Partial file that failed verification.
        path: PathBuf,
        /// Declared size in bytes.
        expected_bytes: u64,
        /// Actual size in bytes.
        actual_bytes: u64,
    },

    /// The HTTP client could not be built.
    #[error("failed to configure transfer client: {reason}")]
    ClientSetup {
        /// Why construction failed.
        reason: String,
    },

    /// Every attempt failed; the partial file was removed.
    #[error("transfer of {url} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        /// The URL being transferred.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// Error from the last attempt.
        #[source]
        source: Box<TransferError>,
    },
}

impl TransferError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates an access-denied error.
    pub fn access_denied(url: impl Into<String>, status: u16) -> Self {
        Self::AccessDenied {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Wraps the last attempt's error after retries ran out.
    pub fn exhausted(url: impl Into<String>, attempts: u32, last: TransferError) -> Self {
        Self::Exhausted {
            url: url.into(),
            attempts,
            source: Box::new(last),
        }
    }
}
