//! Transfer jobs and their status state machine.

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::PipelineError;
use super::record::FileReport;
use super::status::{EventSender, PipelineEvent};
use crate::resolver::FileDescriptor;

/// Lifecycle status of a [`TransferJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Admitted, not yet looked at.
    Pending,
    /// Fetching (or re-fetching) file metadata.
    ResolvingMetadata,
    /// A file is being transferred.
    Downloading,
    /// A file is staged and waiting for the uploader.
    ReadyForUpload,
    /// A staged file is being delivered.
    Uploading,
    /// Every deliverable file reached the primary destination.
    Succeeded,
    /// Retries ran out or nothing could be delivered.
    FailedPermanent,
    /// Every file exceeded the size cap.
    Oversized,
    /// The link was already processed.
    Duplicate,
    /// The batch was cancelled first.
    Cancelled,
}

impl JobStatus {
    /// Returns the string representation used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ResolvingMetadata => "resolving_metadata",
            Self::Downloading => "downloading",
            Self::ReadyForUpload => "ready_for_upload",
            Self::Uploading => "uploading",
            Self::Succeeded => "succeeded",
            Self::FailedPermanent => "failed_permanent",
            Self::Oversized => "oversized",
            Self::Duplicate => "duplicate",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded
                | Self::FailedPermanent
                | Self::Oversized
                | Self::Duplicate
                | Self::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Failed transfers go back to metadata resolution for a fresh URL, and
    /// multi-file jobs return from uploading to downloading for the next file.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        use JobStatus::{
            Cancelled, Downloading, Duplicate, FailedPermanent, Oversized, Pending,
            ReadyForUpload, ResolvingMetadata, Succeeded, Uploading,
        };
        match (self, next) {
            (Pending, ResolvingMetadata | Duplicate | FailedPermanent | Cancelled)
            | (ResolvingMetadata, Downloading | Oversized | FailedPermanent | Cancelled)
            | (Downloading, ReadyForUpload | ResolvingMetadata | FailedPermanent | Cancelled)
            | (ReadyForUpload, Uploading | FailedPermanent | Cancelled)
            | (Uploading, Downloading | Succeeded | FailedPermanent | Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One submitted link moving through the pipeline.
///
/// Exactly one stage owns a job at any time; it moves between stages by value.
#[derive(Debug)]
pub struct TransferJob {
    /// Position of the link in the submitted batch.
    pub id: usize,
    /// Submitted link.
    pub link: String,
    /// Files still to be delivered, in resolver order.
    pub descriptors: Vec<FileDescriptor>,
    /// Index of the file currently being worked on.
    pub next_file: usize,
    /// Transfer rounds spent on the current file.
    pub attempt: u32,
    /// Staged copy of the current file, when one exists.
    pub staging_path: Option<PathBuf>,
    /// Whether admission recorded the link in the dedup store.
    pub claimed: bool,
    /// When the job was admitted.
    pub started_at: Instant,
    /// Reports for files that are done.
    pub files: Vec<FileReport>,
    status: JobStatus,
}

impl TransferJob {
    /// Creates a pending job.
    #[must_use]
    pub fn new(id: usize, link: impl Into<String>) -> Self {
        Self {
            id,
            link: link.into(),
            descriptors: Vec::new(),
            next_file: 0,
            attempt: 0,
            staging_path: None,
            claimed: false,
            started_at: Instant::now(),
            files: Vec::new(),
            status: JobStatus::Pending,
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// File currently being worked on.
    #[must_use]
    pub fn current_file(&self) -> Option<&FileDescriptor> {
        self.descriptors.get(self.next_file)
    }

    /// Moves to the next file, resetting the per-file attempt counter.
    pub fn finish_file(&mut self, report: FileReport) {
        self.files.push(report);
        self.next_file += 1;
        self.attempt = 0;
        self.staging_path = None;
    }

    /// Changes status and publishes the change.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::IllegalTransition`] when the state machine
    /// does not allow the move; the status is left unchanged.
    pub fn advance(&mut self, next: JobStatus, events: &EventSender) -> Result<(), PipelineError> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::IllegalTransition {
                job_id: self.id,
                from: self.status,
                to: next,
            });
        }
        debug!(job_id = self.id, from = %self.status, to = %next, "job status change");
        self.status = next;
        events.send(PipelineEvent::JobStatus {
            job_id: self.id,
            status: next,
        });
        Ok(())
    }
}
