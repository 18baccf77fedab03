//! Pipeline and per-job error types.

use thiserror::Error;

use super::job::JobStatus;

/// Errors raised by the pipeline itself, as opposed to a single job.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Transfer concurrency outside the accepted range.
    #[error("concurrency must be between {min} and {max}, got {value}")]
    InvalidConcurrency {
        /// Rejected value.
        value: usize,
        /// Smallest accepted value.
        min: usize,
        /// Largest accepted value.
        max: usize,
    },

    /// Another configuration value is invalid.
    #[error("invalid pipeline configuration: {reason}")]
    InvalidConfig {
        /// What is wrong.
        reason: String,
    },

    /// A job was asked to make a transition the state machine forbids.
    #[error("job {job_id} cannot move from {from} to {to}")]
    IllegalTransition {
        /// Job identifier within the batch.
        job_id: usize,
        /// Current status.
        from: JobStatus,
        /// Requested status.
        to: JobStatus,
    },

    /// A stage queue closed while a job still needed it.
    #[error("{stage} queue closed unexpectedly")]
    QueueClosed {
        /// Stage whose queue closed.
        stage: &'static str,
    },
}

impl PipelineError {
    /// Creates an invalid-config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Why a job or one of its files did not succeed.
///
/// The display text is what ends up in result records.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// Metadata could not be fetched.
    #[error("metadata resolution failed: {reason}")]
    Resolution {
        /// Underlying error text.
        reason: String,
    },

    /// The link resolved to nothing.
    #[error("no files found")]
    NoFiles,

    /// The file could not be downloaded.
    #[error("transfer of {file} failed: {reason}")]
    Transfer {
        /// File name.
        file: String,
        /// Underlying error text.
        reason: String,
    },

    /// The file is larger than the configured cap.
    #[error("{file} is {size_bytes} bytes, over the {max_bytes} byte limit")]
    Oversize {
        /// File name.
        file: String,
        /// Declared size.
        size_bytes: u64,
        /// Configured cap.
        max_bytes: u64,
    },

    /// The primary destination rejected the file.
    #[error("upload of {file} failed: {reason}")]
    Upload {
        /// File name.
        file: String,
        /// Underlying error text.
        reason: String,
    },

    /// The batch was cancelled first.
    #[error("cancelled before completion")]
    Cancelled,

    /// A fault inside the pipeline.
    #[error("internal pipeline error: {reason}")]
    Internal {
        /// What went wrong.
        reason: String,
    },
}

impl JobError {
    /// Creates a resolution error.
    pub fn resolution(reason: impl ToString) -> Self {
        Self::Resolution {
            reason: reason.to_string(),
        }
    }

    /// Creates a transfer error.
    pub fn transfer(file: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transfer {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an upload error.
    pub fn upload(file: impl Into<String>, reason: impl ToString) -> Self {
        Self::Upload {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an internal error.
    pub fn internal(reason: impl ToString) -> Self {
        Self::Internal {
            reason: reason.to_string(),
        }
    }
}
