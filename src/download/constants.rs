//! Constants for the transfer module (timeouts, buffer sizes).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout between body chunks (5 minutes).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Upper bound for one whole transfer attempt (30 minutes).
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Write buffer size for streaming bodies to disk (1 MiB).
pub const WRITE_BUFFER_BYTES: usize = 1024 * 1024;
