//! Resumable file transfer into the staging area.
//!
//! A transfer streams a resolved file's bytes to disk, resuming from a
//! `.part` file when one exists, retrying transient failures with backoff,
//! and reporting a SHA-256 of the completed file.
//!
//! # Example
//!
//! ```no_run
//! use linkrelay_core::download::{HttpTransferer, ResumableTransfer, staging_path};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transferer = HttpTransferer::new()?;
//! let url = "https://cdn.example.com/clip.mp4?sig=abc";
//! let dest = staging_path(Path::new("./staging"), url, "clip.mp4");
//! let outcome = transferer.transfer(url, &dest, 3).await?;
//! println!("Staged: {}", outcome.path.display());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

mod client;
pub mod constants;
mod error;
mod retry;
pub mod staging;

pub use client::HttpTransferer;
pub use error::TransferError;
pub use retry::{
    BackoffCurve, DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error,
};
pub use staging::{
    PARTIAL_SUFFIX, partial_path, remove_if_exists, resolve_unique_path, safe_file_name,
    staged_display_name, staging_path, url_fingerprint,
};

/// Result of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Final path of the staged file.
    pub path: PathBuf,
    /// Size of the completed file.
    pub bytes_written: u64,
    /// Bytes received over the network in the successful attempt.
    pub bytes_fetched: u64,
    /// Offset the successful attempt resumed from (0 for a fresh start).
    pub resumed_from: u64,
    /// Lowercase hex SHA-256 of the completed file.
    pub checksum: String,
    /// Wall time across all attempts.
    pub elapsed: Duration,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// Fetches a URL into a local file, resuming partial data across attempts.
#[async_trait]
pub trait ResumableTransfer: Send + Sync {
    /// Transfers `url` to `destination`, making at most `max_attempts` attempts.
    ///
    /// On success `destination` holds the full file and no partial remains.
    /// When attempts run out or the failure is permanent the partial file is
    /// removed before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] describing the last failure.
    async fn transfer(
        &self,
        url: &str,
        destination: &Path,
        max_attempts: u32,
    ) -> Result<TransferOutcome, TransferError>;
}
