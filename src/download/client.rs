//! Resumable HTTP transfers into the staging area.
//!
//! Bytes are streamed into `{destination}.part` through a 1 MiB buffered
//! writer while a SHA-256 is computed on the fly. A partial file left by a
//! previous attempt is resumed with `Range: bytes={len}-`, and its prefix is
//! hashed first so the checksum always covers the whole file. The partial is
//! renamed onto the destination only after its length matches the declared
//! total.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE, RETRY_AFTER};
use sha2::{Digest, Sha256};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_ATTEMPT_TIMEOUT, READ_TIMEOUT_SECS, WRITE_BUFFER_BYTES,
};
use super::error::TransferError;
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use super::staging::{partial_path, remove_if_exists};
use super::{ResumableTransfer, TransferOutcome};
use crate::user_agent;

/// Longest server-requested wait honored for rate limiting.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// HTTP implementation of [`ResumableTransfer`].
///
/// Create once and share; the inner client pools connections.
///
/// # Example
///
/// ```no_run
/// use linkrelay_core::download::{HttpTransferer, ResumableTransfer};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transferer = HttpTransferer::new()?;
/// let outcome = transferer
///     .transfer("https://cdn.example.com/a.mp4", Path::new("/tmp/stage/a.mp4"), 3)
///     .await?;
/// println!("{} bytes, sha256 {}", outcome.bytes_written, outcome.checksum);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransferer {
    client: Client,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl HttpTransferer {
    /// Creates a transferer with default timeouts (30s connect, 5 min read).
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ClientSetup`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, TransferError> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a transferer with explicit timeout values in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ClientSetup`] if the HTTP client cannot be built.
    #[instrument(level = "debug")]
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, TransferError> {
        // Range offsets must refer to the stored representation.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .gzip(false)
            .user_agent(user_agent::default_transfer_user_agent())
            .build()
            .map_err(|e| TransferError::ClientSetup {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            policy: RetryPolicy::default(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        })
    }

    /// Replaces the backoff policy. Its attempt count is overridden per call.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bounds each attempt (request plus body) by `timeout`.
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Returns the backoff policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn attempt_once(
        &self,
        url: &str,
        destination: &Path,
        partial: &Path,
    ) -> Result<TransferOutcome, TransferError> {
        let existing = tokio::fs::metadata(partial)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);

        let mut request = self.client.get(url);
        if existing > 0 {
            request = request.header(RANGE, format!("bytes={existing}-"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransferError::timeout(url)
            } else {
                TransferError::network(url, e)
            }
        })?;

        let status = response.status().as_u16();
        match status {
            416 => {
                remove_if_exists(partial)
                    .await
                    .map_err(|e| TransferError::io(partial, e))?;
                return Err(TransferError::RangeNotSatisfiable {
                    url: url.to_string(),
                    offset: existing,
                });
            }
            401 | 403 => return Err(TransferError::access_denied(url, status)),
            _ if !response.status().is_success() => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(std::string::ToString::to_string);
                return Err(TransferError::http_status_with_retry_after(
                    url,
                    status,
                    retry_after,
                ));
            }
            _ => {}
        }

        let content_length = header_u64(&response, CONTENT_LENGTH);
        let range_total = content_range_total(&response);
        let resuming = status == 206 && existing > 0;

        let (resumed_from, expected_total) = if resuming {
            (
                existing,
                range_total.or_else(|| content_length.map(|len| existing.saturating_add(len))),
            )
        } else {
            if existing > 0 {
                debug!(existing, status, "server ignored range request, restarting");
            }
            (0, if status == 206 { range_total } else { content_length })
        };

        let mut hasher = Sha256::new();
        let file = if resuming {
            hash_existing_prefix(partial, &mut hasher).await?;
            OpenOptions::new()
                .append(true)
                .open(partial)
                .await
                .map_err(|e| TransferError::io(partial, e))?
        } else {
            File::create(partial)
                .await
                .map_err(|e| TransferError::io(partial, e))?
        };

        let bytes_fetched = stream_to_file(file, response, url, partial, &mut hasher).await?;
        let final_size = resumed_from.saturating_add(bytes_fetched);

        if let Some(expected) = expected_total
            && expected != final_size
        {
            if final_size > expected {
                // Overlong data cannot be resumed from.
                remove_if_exists(partial)
                    .await
                    .map_err(|e| TransferError::io(partial, e))?;
            }
            return Err(TransferError::integrity(partial, expected, final_size));
        }

        tokio::fs::rename(partial, destination)
            .await
            .map_err(|e| TransferError::io(destination, e))?;

        Ok(TransferOutcome {
            path: destination.to_path_buf(),
            bytes_written: final_size,
            bytes_fetched,
            resumed_from,
            checksum: hex::encode(hasher.finalize()),
            elapsed: Duration::ZERO,
            attempts: 0,
        })
    }
}

#[async_trait]
impl ResumableTransfer for HttpTransferer {
    #[instrument(skip(self), fields(dest = %destination.display()))]
    async fn transfer(
        &self,
        url: &str,
        destination: &Path,
        max_attempts: u32,
    ) -> Result<TransferOutcome, TransferError> {
        let parsed = Url::parse(url).map_err(|_| TransferError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TransferError::invalid_url(url));
        }
        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::io(parent, e))?;
        }

        let partial = partial_path(destination);
        let policy = self.policy.limited_to(max_attempts);
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, "starting transfer attempt");

            let result = match tokio::time::timeout(
                self.attempt_timeout,
                self.attempt_once(url, destination, &partial),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(TransferError::timeout(url)),
            };

            let error = match result {
                Ok(mut outcome) => {
                    outcome.elapsed = started.elapsed();
                    outcome.attempts = attempt;
                    info!(
                        bytes = outcome.bytes_written,
                        resumed_from = outcome.resumed_from,
                        attempts = attempt,
                        checksum = %outcome.checksum,
                        "transfer complete"
                    );
                    return Ok(outcome);
                }
                Err(error) => error,
            };

            let failure_type = classify_error(&error);
            match policy.should_retry(failure_type, attempt) {
                RetryDecision::Retry { delay, attempt: next } => {
                    let delay = retry_after_delay(&error).map_or(delay, |server| server.max(delay));
                    warn!(
                        attempt,
                        next_attempt = next,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "transfer attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    if let Err(e) = remove_if_exists(&partial).await {
                        warn!(path = %partial.display(), error = %e, "failed to remove partial file");
                    }
                    warn!(attempt, error = %error, reason = %reason, "transfer failed");
                    return Err(match failure_type {
                        FailureType::Transient | FailureType::RateLimited => {
                            TransferError::exhausted(url, attempt, error)
                        }
                        FailureType::Permanent | FailureType::AccessDenied => error,
                    });
                }
            }
        }
    }
}

/// Streams the response body into `file`, returning bytes written.
///
/// Buffered bytes are flushed even when the stream fails so the next
/// attempt can resume from everything that arrived.
async fn stream_to_file(
    file: File,
    response: reqwest::Response,
    url: &str,
    path: &Path,
    hasher: &mut Sha256,
) -> Result<u64, TransferError> {
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = match chunk_result {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = writer.flush().await;
                return Err(if e.is_timeout() {
                    TransferError::timeout(url)
                } else {
                    TransferError::network(url, e)
                });
            }
        };

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TransferError::io(path, e))?;
        hasher.update(&chunk);
        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| TransferError::io(path, e))?;

    Ok(bytes_written)
}

async fn hash_existing_prefix(path: &Path, hasher: &mut Sha256) -> Result<u64, TransferError> {
    let mut file = File::open(path)
        .await
        .map_err(|e| TransferError::io(path, e))?;
    let mut buffer = vec![0u8; WRITE_BUFFER_BYTES];
    let mut total = 0u64;
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| TransferError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        total += read as u64;
    }
    Ok(total)
}

fn header_u64(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Total size from `Content-Range: bytes a-b/total`; `None` for `*`.
fn content_range_total(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range_total)
}

fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

fn retry_after_delay(error: &TransferError) -> Option<Duration> {
    let TransferError::HttpStatus {
        retry_after: Some(value),
        ..
    } = error
    else {
        return None;
    };
    let secs: u64 = value.trim().parse().ok()?;
    Some(Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}
