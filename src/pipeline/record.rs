//! Terminal result records and batch summaries.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::JobError;
use crate::download::TransferOutcome;
use crate::resolver::FileDescriptor;

/// Final outcome of a job or file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Delivered to the primary destination.
    Succeeded,
    /// Gave up after retries, or the link had nothing to deliver.
    Failed,
    /// Skipped for exceeding the size cap.
    Oversized,
    /// Skipped as already processed.
    Duplicate,
    /// The batch was cancelled first.
    Cancelled,
}

impl Outcome {
    /// All outcomes, in summary order.
    pub const ALL: [Self; 5] = [
        Self::Succeeded,
        Self::Failed,
        Self::Oversized,
        Self::Duplicate,
        Self::Cancelled,
    ];

    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Oversized => "oversized",
            Self::Duplicate => "duplicate",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|outcome| outcome.as_str() == s)
            .ok_or_else(|| format!("invalid outcome: {s}"))
    }
}

/// Per-file detail inside a [`ResultRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    /// File name reported by the resolver.
    pub name: String,
    /// Declared size in bytes.
    pub size_bytes: u64,
    /// What happened to this file.
    pub outcome: Outcome,
    /// Error text when the file did not succeed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// SHA-256 of the transferred file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Size of the staged file.
    #[serde(default)]
    pub bytes_transferred: u64,
    /// Offset the final transfer attempt resumed from.
    #[serde(default)]
    pub resumed_from: u64,
    /// Broadcast destinations that rejected the file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub broadcast_failures: Vec<String>,
}

impl FileReport {
    fn base(descriptor: &FileDescriptor, outcome: Outcome, error: Option<String>) -> Self {
        Self {
            name: descriptor.name.clone(),
            size_bytes: descriptor.size_bytes,
            outcome,
            error,
            checksum: None,
            bytes_transferred: 0,
            resumed_from: 0,
            broadcast_failures: Vec::new(),
        }
    }

    /// A file skipped for its size.
    #[must_use]
    pub fn oversized(descriptor: &FileDescriptor, max_bytes: u64) -> Self {
        let error = JobError::Oversize {
            file: descriptor.name.clone(),
            size_bytes: descriptor.size_bytes,
            max_bytes,
        };
        Self::base(descriptor, Outcome::Oversized, Some(error.to_string()))
    }

    /// A file that failed for `error`.
    #[must_use]
    pub fn failed(descriptor: &FileDescriptor, error: &JobError) -> Self {
        Self::base(descriptor, Outcome::Failed, Some(error.to_string()))
    }

    /// A file abandoned because the batch was cancelled.
    #[must_use]
    pub fn cancelled(descriptor: &FileDescriptor) -> Self {
        Self::base(
            descriptor,
            Outcome::Cancelled,
            Some(JobError::Cancelled.to_string()),
        )
    }

    /// A transferred file, successful when `primary_error` is `None`.
    #[must_use]
    pub fn transferred(
        descriptor: &FileDescriptor,
        transfer: &TransferOutcome,
        primary_error: Option<&JobError>,
        broadcast_failures: Vec<String>,
    ) -> Self {
        let outcome = if primary_error.is_some() {
            Outcome::Failed
        } else {
            Outcome::Succeeded
        };
        Self {
            checksum: Some(transfer.checksum.clone()),
            bytes_transferred: transfer.bytes_written,
            resumed_from: transfer.resumed_from,
            broadcast_failures,
            ..Self::base(descriptor, outcome, primary_error.map(ToString::to_string))
        }
    }
}

/// Combines per-file outcomes: failed beats succeeded beats oversized.
///
/// Returns `None` for an empty slice. A cancelled file makes the whole job
/// cancelled unless another file already failed.
#[must_use]
pub fn combine_outcomes(files: &[FileReport]) -> Option<Outcome> {
    let has = |outcome: Outcome| files.iter().any(|f| f.outcome == outcome);
    if files.is_empty() {
        None
    } else if has(Outcome::Failed) {
        Some(Outcome::Failed)
    } else if has(Outcome::Cancelled) {
        Some(Outcome::Cancelled)
    } else if has(Outcome::Succeeded) {
        Some(Outcome::Succeeded)
    } else {
        Some(Outcome::Oversized)
    }
}

/// Terminal summary of one submitted link. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Submitted link.
    pub link: String,
    /// First file's name, empty when nothing resolved.
    pub name: String,
    /// Sum of the files' declared sizes.
    pub size_bytes: u64,
    /// Final outcome.
    pub outcome: Outcome,
    /// Error text for non-successful outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time from admission to settlement.
    pub elapsed_ms: u64,
    /// Per-file detail.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileReport>,
}

impl ResultRecord {
    /// Builds a record from its file reports.
    ///
    /// `fallback` decides the outcome when `files` is empty; the error text is
    /// the first failing file's, else `error`.
    #[must_use]
    pub fn from_files(
        link: impl Into<String>,
        files: Vec<FileReport>,
        fallback: Outcome,
        error: Option<&JobError>,
        elapsed: Duration,
    ) -> Self {
        let outcome = combine_outcomes(&files).unwrap_or(fallback);
        let file_error = files
            .iter()
            .find(|f| f.outcome == outcome && f.error.is_some())
            .and_then(|f| f.error.clone());
        let error = match outcome {
            Outcome::Succeeded => None,
            _ => file_error.or_else(|| error.map(ToString::to_string)),
        };
        Self {
            link: link.into(),
            name: files.first().map(|f| f.name.clone()).unwrap_or_default(),
            size_bytes: files.iter().map(|f| f.size_bytes).sum(),
            outcome,
            error,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            files,
        }
    }

    /// A record settled without any file work.
    #[must_use]
    pub fn settled(
        link: impl Into<String>,
        outcome: Outcome,
        error: Option<&JobError>,
        elapsed: Duration,
    ) -> Self {
        Self::from_files(link, Vec::new(), outcome, error, elapsed)
    }
}

/// Per-outcome counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Records in the batch.
    pub total: usize,
    /// Succeeded records.
    pub succeeded: usize,
    /// Failed records.
    pub failed: usize,
    /// Oversized records.
    pub oversized: usize,
    /// Duplicate records.
    pub duplicate: usize,
    /// Cancelled records.
    pub cancelled: usize,
}

impl BatchSummary {
    /// Counts `records` by outcome.
    #[must_use]
    pub fn from_records(records: &[ResultRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            summary.add(record.outcome);
        }
        summary
    }

    /// Counts one more record.
    pub fn add(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Succeeded => self.succeeded += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Oversized => self.oversized += 1,
            Outcome::Duplicate => self.duplicate += 1,
            Outcome::Cancelled => self.cancelled += 1,
        }
    }

    /// Count for one outcome.
    #[must_use]
    pub fn count(&self, outcome: Outcome) -> usize {
        match outcome {
            Outcome::Succeeded => self.succeeded,
            Outcome::Failed => self.failed,
            Outcome::Oversized => self.oversized,
            Outcome::Duplicate => self.duplicate,
            Outcome::Cancelled => self.cancelled,
        }
    }
}

/// Everything a finished batch produced.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// One record per submitted link, in submission order.
    pub records: Vec<ResultRecord>,
    /// Counts by outcome.
    pub summary: BatchSummary,
    /// Wall time of the batch.
    pub elapsed: Duration,
}
