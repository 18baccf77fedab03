//! Live progress reporting.
//!
//! Stages publish [`PipelineEvent`]s through an [`EventSender`]; sending never
//! blocks. A [`StatusAggregator`] task folds the events into a job-status map
//! and a result list and hands a fresh [`ProgressSnapshot`] to a
//! [`StatusSink`] every K finished jobs, every T seconds, and once at the end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::job::JobStatus;
use super::record::{Outcome, ResultRecord};

/// Something that happened in the pipeline.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A batch of `total` links was submitted.
    BatchStarted {
        /// Submitted link count.
        total: usize,
    },
    /// A job changed status.
    JobStatus {
        /// Job identifier.
        job_id: usize,
        /// New status.
        status: JobStatus,
    },
    /// A job's record was settled.
    JobFinished {
        /// Job identifier.
        job_id: usize,
        /// The settled record.
        record: ResultRecord,
    },
}

/// Non-blocking handle for publishing [`PipelineEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct EventSender {
    tx: Option<UnboundedSender<PipelineEvent>>,
}

impl EventSender {
    /// Creates a connected sender and its receiver.
    #[must_use]
    pub fn channel() -> (Self, UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sender that drops every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Publishes `event`; a closed receiver is ignored.
    pub fn send(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Point-in-time view of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Submitted links.
    pub total: usize,
    /// Links with a settled record.
    pub completed: usize,
    /// Settled as succeeded.
    pub succeeded: usize,
    /// Settled as failed.
    pub failed: usize,
    /// Settled as oversized.
    pub oversized: usize,
    /// Settled as duplicate.
    pub duplicate: usize,
    /// Settled as cancelled.
    pub cancelled: usize,
    /// Not yet picked up by any stage.
    pub queued: usize,
    /// Waiting on metadata or on a free downloader.
    pub resolving: usize,
    /// Currently transferring a file.
    pub in_download: usize,
    /// Staged and waiting for, or in, upload.
    pub in_upload: usize,
}

impl ProgressSnapshot {
    /// Whether every submitted link has a record.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

/// Computes a snapshot from the live job statuses and the settled records.
///
/// Pure: the same inputs always give the same snapshot.
#[must_use]
pub fn snapshot(
    total: usize,
    jobs: &HashMap<usize, JobStatus>,
    results: &[ResultRecord],
) -> ProgressSnapshot {
    let mut snap = ProgressSnapshot {
        total,
        completed: results.len(),
        ..ProgressSnapshot::default()
    };

    for record in results {
        match record.outcome {
            Outcome::Succeeded => snap.succeeded += 1,
            Outcome::Failed => snap.failed += 1,
            Outcome::Oversized => snap.oversized += 1,
            Outcome::Duplicate => snap.duplicate += 1,
            Outcome::Cancelled => snap.cancelled += 1,
        }
    }

    for status in jobs.values() {
        match status {
            JobStatus::ResolvingMetadata => snap.resolving += 1,
            JobStatus::Downloading => snap.in_download += 1,
            JobStatus::ReadyForUpload | JobStatus::Uploading => snap.in_upload += 1,
            _ => {}
        }
    }

    let active = snap.resolving + snap.in_download + snap.in_upload;
    snap.queued = total.saturating_sub(snap.completed + active);
    snap
}

/// Error returned by a [`StatusSink`].
#[derive(Debug, Error)]
#[error("status sink failed: {reason}")]
pub struct SinkError {
    /// What went wrong.
    pub reason: String,
}

impl SinkError {
    /// Creates a sink error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Receives progress snapshots. Errors are logged and otherwise ignored.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Shows an intermediate snapshot.
    async fn publish(&self, snapshot: &ProgressSnapshot) -> Result<(), SinkError>;

    /// Shows the final snapshot.
    async fn finish(&self, snapshot: &ProgressSnapshot) -> Result<(), SinkError> {
        self.publish(snapshot).await
    }
}

/// Logs snapshots through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatusSink;

#[async_trait]
impl StatusSink for LogStatusSink {
    async fn publish(&self, s: &ProgressSnapshot) -> Result<(), SinkError> {
        info!(
            completed = s.completed,
            total = s.total,
            succeeded = s.succeeded,
            failed = s.failed,
            in_download = s.in_download,
            in_upload = s.in_upload,
            queued = s.queued,
            "batch progress"
        );
        Ok(())
    }
}

/// Publishing cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCadence {
    /// Publish after this many finished jobs.
    pub every: usize,
    /// Publish at least this often while something changed.
    pub interval: Duration,
}

impl Default for StatusCadence {
    fn default() -> Self {
        Self {
            every: 5,
            interval: Duration::from_secs(10),
        }
    }
}

/// Folds pipeline events into snapshots for a [`StatusSink`].
pub struct StatusAggregator {
    sink: Arc<dyn StatusSink>,
    cadence: StatusCadence,
    total: usize,
    jobs: HashMap<usize, JobStatus>,
    results: Vec<ResultRecord>,
    finished_since_publish: usize,
    dirty: bool,
}

impl StatusAggregator {
    /// Creates an aggregator publishing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn StatusSink>, cadence: StatusCadence) -> Self {
        Self {
            sink,
            cadence: StatusCadence {
                every: cadence.every.max(1),
                interval: cadence.interval,
            },
            total: 0,
            jobs: HashMap::new(),
            results: Vec::new(),
            finished_since_publish: 0,
            dirty: false,
        }
    }

    /// Starts the aggregator task and returns the event handle feeding it.
    ///
    /// The task ends once every [`EventSender`] clone is dropped and resolves
    /// to the final snapshot.
    #[must_use]
    pub fn spawn(self) -> (EventSender, JoinHandle<ProgressSnapshot>) {
        let (events, rx) = EventSender::channel();
        let handle = tokio::spawn(self.run(rx));
        (events, handle)
    }

    /// Current snapshot of everything seen so far.
    #[must_use]
    pub fn current(&self) -> ProgressSnapshot {
        snapshot(self.total, &self.jobs, &self.results)
    }

    /// Applies one event. Returns true when a publish is due.
    pub fn apply(&mut self, event: PipelineEvent) -> bool {
        self.dirty = true;
        match event {
            PipelineEvent::BatchStarted { total } => {
                self.total = total;
                false
            }
            PipelineEvent::JobStatus { job_id, status } => {
                if status.is_terminal() {
                    self.jobs.remove(&job_id);
                } else {
                    self.jobs.insert(job_id, status);
                }
                false
            }
            PipelineEvent::JobFinished { job_id, record } => {
                self.jobs.remove(&job_id);
                self.results.push(record);
                self.finished_since_publish += 1;
                self.finished_since_publish >= self.cadence.every
            }
        }
    }

    async fn run(mut self, mut rx: UnboundedReceiver<PipelineEvent>) -> ProgressSnapshot {
        let mut ticker = tokio::time::interval(self.cadence.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    if self.apply(event) {
                        self.publish().await;
                    }
                }
                _ = ticker.tick() => {
                    if self.dirty {
                        self.publish().await;
                    }
                }
            }
        }

        let last = self.current();
        if let Err(e) = self.sink.finish(&last).await {
            warn!(error = %e, "final status publish failed");
        }
        last
    }

    async fn publish(&mut self) {
        let snap = self.current();
        self.finished_since_publish = 0;
        self.dirty = false;
        if let Err(e) = self.sink.publish(&snap).await {
            debug!(error = %e, "status publish failed");
        }
    }
}
