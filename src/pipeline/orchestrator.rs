//! Bounded three-stage transfer pipeline.
//!
//! ```text
//! links ──► Stage A (1 task) ──download queue (N)──► Stage B (N tasks)
//!              │  dedup, resolve, oversize split          │ transfer files
//!              │                                          ▼
//!              └──────── settled records ────► upload queue (N) ──► Stage C (1 task)
//!                                                 ▲        uploads, appends records
//!                                                 └──── job returned via one-shot reply
//! ```
//!
//! Stage C stops once it holds one record per submitted link. Faults and
//! panics are contained per job and turned into `failed` records.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::error::{JobError, PipelineError};
use super::job::{JobStatus, TransferJob};
use super::record::{BatchReport, BatchSummary, FileReport, Outcome, ResultRecord, combine_outcomes};
use super::status::{EventSender, PipelineEvent, StatusAggregator, StatusCadence, StatusSink};
use crate::dedup::DedupStore;
use crate::download::{
    ResumableTransfer, TransferOutcome, partial_path, remove_if_exists, staging_path,
};
use crate::history::ResultHistory;
use crate::parser::normalize_link;
use crate::resolver::{BYTES_PER_MB, FileDescriptor, MetadataResolver, ResolveError};
use crate::upload::{Destinations, UploadDispatcher};

/// Default number of concurrent transfers.
pub const DEFAULT_CONCURRENCY: usize = 5;
/// Smallest accepted concurrency.
pub const MIN_CONCURRENCY: usize = 1;
/// Largest accepted concurrency.
pub const MAX_CONCURRENCY: usize = 100;
/// Default size cap (50 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * BYTES_PER_MB;

const STOPPED_EARLY: &str = "pipeline stopped before the job finished";

/// Settings for one [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Concurrent transfers (N); also the capacity of both queues.
    pub concurrency: usize,
    /// Files larger than this are skipped as oversized.
    pub max_file_size: u64,
    /// Transfer rounds per file, each after the first with a re-resolved URL.
    /// Also bounds metadata resolution attempts.
    pub retry_ceiling: u32,
    /// HTTP attempts inside one transfer round.
    pub transfer_attempts: u32,
    /// Bound on one metadata request.
    pub resolve_timeout: Duration,
    /// Bound on one transfer attempt, applied by the transferer.
    pub attempt_timeout: Duration,
    /// Base of the linear backoff between rounds.
    pub job_backoff: Duration,
    /// Where transfers are staged.
    pub staging_dir: PathBuf,
    /// Upload targets.
    pub destinations: Destinations,
    /// Status publishing cadence.
    pub status: StatusCadence,
    /// Skip the persistent dedup check.
    pub allow_duplicates: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            retry_ceiling: 3,
            transfer_attempts: 3,
            resolve_timeout: Duration::from_secs(120),
            attempt_timeout: Duration::from_secs(30 * 60),
            job_backoff: Duration::from_secs(3),
            staging_dir: std::env::temp_dir().join("linkrelay-staging"),
            destinations: Destinations::primary_only("delivered"),
            status: StatusCadence::default(),
            allow_duplicates: false,
        }
    }
}

impl PipelineConfig {
    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConcurrency`] or
    /// [`PipelineError::InvalidConfig`].
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(PipelineError::InvalidConcurrency {
                value: self.concurrency,
                min: MIN_CONCURRENCY,
                max: MAX_CONCURRENCY,
            });
        }
        if self.retry_ceiling == 0 {
            return Err(PipelineError::invalid_config("retry ceiling must be at least 1"));
        }
        if self.transfer_attempts == 0 {
            return Err(PipelineError::invalid_config(
                "transfer attempts must be at least 1",
            ));
        }
        if self.status.every == 0 {
            return Err(PipelineError::invalid_config(
                "status cadence must be at least one job",
            ));
        }
        if self.status.interval.is_zero() {
            return Err(PipelineError::invalid_config(
                "status interval must be greater than zero",
            ));
        }
        if self.destinations.primary.trim().is_empty() {
            return Err(PipelineError::invalid_config(
                "primary destination must not be empty",
            ));
        }
        Ok(())
    }
}

enum DownloadMsg {
    Job(TransferJob),
    Shutdown,
}

struct UploadRequest {
    job: TransferJob,
    descriptor: FileDescriptor,
    transfer: TransferOutcome,
    reply: oneshot::Sender<TransferJob>,
}

enum UploadMsg {
    Upload(UploadRequest),
    Settled {
        job_id: usize,
        record: ResultRecord,
        claimed: bool,
    },
}

enum Admission {
    Ready,
    Settled(ResultRecord),
}

enum FileStep {
    Staged {
        descriptor: FileDescriptor,
        transfer: TransferOutcome,
    },
    Failed(FileReport),
    Cancelled,
}

enum ResolveFailure {
    Cancelled,
    Failed(ResolveError),
}

/// Runs batches of links through resolve, transfer and upload.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    resolver: Arc<dyn MetadataResolver>,
    transferer: Arc<dyn ResumableTransfer>,
    uploader: UploadDispatcher,
    dedup: Option<Arc<DedupStore>>,
    history: Option<Arc<ResultHistory>>,
    status_sink: Option<Arc<dyn StatusSink>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("dedup", &self.dedup.is_some())
            .field("history", &self.history.is_some())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when `config` fails validation.
    pub fn new(
        config: PipelineConfig,
        resolver: Arc<dyn MetadataResolver>,
        transferer: Arc<dyn ResumableTransfer>,
        uploader: UploadDispatcher,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            resolver,
            transferer,
            uploader,
            dedup: None,
            history: None,
            status_sink: None,
        })
    }

    /// Skips links already recorded in `dedup` and records new ones.
    #[must_use]
    pub fn with_dedup(mut self, dedup: Arc<DedupStore>) -> Self {
        self.dedup = Some(dedup);
        self
    }

    /// Publishes progress snapshots to `sink`.
    #[must_use]
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status_sink = Some(sink);
        self
    }

    /// Appends every settled record to `history`.
    #[must_use]
    pub fn with_result_log(mut self, history: Arc<ResultHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// The pipeline's configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processes `links` and returns one record per link, in submission order.
    ///
    /// Cancelling `cancel` settles unfinished links as `cancelled` and removes
    /// their partial and staged files.
    #[instrument(skip(self, links, cancel), fields(links = links.len(), concurrency = self.config.concurrency))]
    pub async fn run(&self, links: Vec<String>, cancel: CancellationToken) -> BatchReport {
        let started = Instant::now();
        let total = links.len();
        let workers = self.config.concurrency;

        let (events, aggregator) = match &self.status_sink {
            Some(sink) => {
                let (events, handle) =
                    StatusAggregator::new(Arc::clone(sink), self.config.status).spawn();
                (events, Some(handle))
            }
            None => (EventSender::disabled(), None),
        };
        events.send(PipelineEvent::BatchStarted { total });
        info!(total, workers, "batch started");

        let stages = Arc::new(Stages {
            config: Arc::clone(&self.config),
            resolver: Arc::clone(&self.resolver),
            transferer: Arc::clone(&self.transferer),
            uploader: self.uploader.clone(),
            dedup: self.dedup.clone(),
            history: self.history.clone(),
            events: events.clone(),
            cancel,
        });
        let links: Arc<[String]> = links.into();

        let (download_tx, download_rx) = mpsc::channel(workers);
        let (upload_tx, upload_rx) = mpsc::channel(workers);
        let download_rx = Arc::new(Mutex::new(download_rx));

        let mut handles = Vec::with_capacity(workers + 1);
        for worker in 0..workers {
            handles.push(tokio::spawn(Arc::clone(&stages).download_worker(
                worker,
                Arc::clone(&download_rx),
                download_tx.downgrade(),
                upload_tx.clone(),
            )));
        }
        drop(download_rx);
        handles.push(tokio::spawn(Arc::clone(&stages).admit_all(
            Arc::clone(&links),
            download_tx,
            upload_tx,
        )));

        let records = stages.upload_stage(&links, upload_rx).await;

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "pipeline stage task ended abnormally");
            }
        }
        drop(stages);
        drop(events);

        if let Some(handle) = aggregator
            && let Err(e) = handle.await
        {
            warn!(error = %e, "status aggregator ended abnormally");
        }

        let summary = BatchSummary::from_records(&records);
        let elapsed = started.elapsed();
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            oversized = summary.oversized,
            duplicate = summary.duplicate,
            cancelled = summary.cancelled,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "batch finished"
        );

        BatchReport {
            records,
            summary,
            elapsed,
        }
    }
}

/// Shared state for the stage tasks of one batch.
struct Stages {
    config: Arc<PipelineConfig>,
    resolver: Arc<dyn MetadataResolver>,
    transferer: Arc<dyn ResumableTransfer>,
    uploader: UploadDispatcher,
    dedup: Option<Arc<DedupStore>>,
    history: Option<Arc<ResultHistory>>,
    events: EventSender,
    cancel: CancellationToken,
}

impl Stages {
    // ---- Stage A ----

    async fn admit_all(
        self: Arc<Self>,
        links: Arc<[String]>,
        download_tx: mpsc::Sender<DownloadMsg>,
        upload_tx: mpsc::Sender<UploadMsg>,
    ) {
        let mut seen = HashSet::new();

        for (id, link) in links.iter().enumerate() {
            let mut job = TransferJob::new(id, link.as_str());

            let admission = if self.cancel.is_cancelled() {
                Ok(Ok(Admission::Settled(ResultRecord::settled(
                    link.as_str(),
                    Outcome::Cancelled,
                    Some(&JobError::Cancelled),
                    Duration::ZERO,
                ))))
            } else {
                AssertUnwindSafe(self.admit(&mut job, &mut seen))
                    .catch_unwind()
                    .await
            };

            let record = match admission {
                Ok(Ok(Admission::Ready)) => match download_tx.send(DownloadMsg::Job(job)).await {
                    Ok(()) => continue,
                    Err(mpsc::error::SendError(msg)) => {
                        let claimed = matches!(&msg, DownloadMsg::Job(job) if job.claimed);
                        let record = internal_failure(link, &PipelineError::QueueClosed {
                            stage: "download",
                        });
                        if upload_tx
                            .send(UploadMsg::Settled {
                                job_id: id,
                                record,
                                claimed,
                            })
                            .await
                            .is_err()
                        {
                            break;
                        }
                        continue;
                    }
                },
                Ok(Ok(Admission::Settled(record))) => record,
                Ok(Err(e)) => {
                    warn!(job_id = id, error = %e, "admission failed");
                    internal_failure(link, &e)
                }
                Err(_) => {
                    warn!(job_id = id, "admission panicked");
                    internal_failure(link, &"panic while resolving metadata")
                }
            };

            let claimed = job.claimed;
            if upload_tx
                .send(UploadMsg::Settled {
                    job_id: id,
                    record,
                    claimed,
                })
                .await
                .is_err()
            {
                warn!("upload stage gone, stopping admission");
                break;
            }
        }

        for _ in 0..self.config.concurrency {
            if download_tx.send(DownloadMsg::Shutdown).await.is_err() {
                break;
            }
        }
        debug!("admission finished");
    }

    #[instrument(skip(self, job, seen), fields(job_id = job.id, link = %job.link))]
    async fn admit(
        &self,
        job: &mut TransferJob,
        seen: &mut HashSet<String>,
    ) -> Result<Admission, PipelineError> {
        if !seen.insert(normalize_link(&job.link)) {
            debug!("duplicate within batch");
            job.advance(JobStatus::Duplicate, &self.events)?;
            return Ok(self.settle_now(job, Outcome::Duplicate, None));
        }

        if !self.config.allow_duplicates
            && let Some(dedup) = &self.dedup
        {
            match dedup.record_if_new(&job.link).await {
                Ok(true) => job.claimed = true,
                Ok(false) => {
                    debug!("already processed");
                    job.advance(JobStatus::Duplicate, &self.events)?;
                    return Ok(self.settle_now(job, Outcome::Duplicate, None));
                }
                Err(e) => {
                    warn!(error = %e, "dedup check failed");
                    job.advance(JobStatus::FailedPermanent, &self.events)?;
                    let error = JobError::internal(e);
                    return Ok(self.settle_now(job, Outcome::Failed, Some(&error)));
                }
            }
        }

        job.advance(JobStatus::ResolvingMetadata, &self.events)?;
        let files = match self.resolve_with_retry(&job.link).await {
            Ok(files) => files,
            Err(ResolveFailure::Cancelled) => {
                job.advance(JobStatus::Cancelled, &self.events)?;
                return Ok(self.settle_now(job, Outcome::Cancelled, Some(&JobError::Cancelled)));
            }
            Err(ResolveFailure::Failed(e)) => {
                warn!(error = %e, "metadata resolution failed");
                job.advance(JobStatus::FailedPermanent, &self.events)?;
                let error = JobError::resolution(e);
                return Ok(self.settle_now(job, Outcome::Failed, Some(&error)));
            }
        };

        if files.is_empty() {
            info!("link resolved to no files");
            job.advance(JobStatus::FailedPermanent, &self.events)?;
            return Ok(self.settle_now(job, Outcome::Failed, Some(&JobError::NoFiles)));
        }

        let max = self.config.max_file_size;
        if files.iter().all(|file| file.is_oversized(max)) {
            info!(files = files.len(), max_bytes = max, "every file is oversized");
            job.files = files.iter().map(|f| FileReport::oversized(f, max)).collect();
            job.advance(JobStatus::Oversized, &self.events)?;
            return Ok(self.settle_now(job, Outcome::Oversized, None));
        }

        debug!(files = files.len(), "job ready for download");
        job.descriptors = files;
        Ok(Admission::Ready)
    }

    async fn resolve_with_retry(&self, link: &str) -> Result<Vec<FileDescriptor>, ResolveFailure> {
        let timeout = self.config.resolve_timeout;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(ResolveFailure::Cancelled),
                result = tokio::time::timeout(timeout, self.resolver.resolve(link)) => result,
            };
            let error = match result {
                Ok(Ok(files)) => return Ok(files),
                Ok(Err(e)) => e,
                Err(_) => ResolveError::timeout(link, timeout.as_secs()),
            };
            if !error.is_transient() || attempt >= self.config.retry_ceiling {
                return Err(ResolveFailure::Failed(error));
            }
            warn!(attempt, error = %error, "metadata resolution failed, retrying");
            if !self.backoff(attempt).await {
                return Err(ResolveFailure::Cancelled);
            }
        }
    }

    // ---- Stage B ----

    async fn download_worker(
        self: Arc<Self>,
        worker: usize,
        rx: Arc<Mutex<mpsc::Receiver<DownloadMsg>>>,
        requeue: mpsc::WeakSender<DownloadMsg>,
        upload_tx: mpsc::Sender<UploadMsg>,
    ) {
        loop {
            let msg = {
                let mut rx = rx.lock().await;
                rx.recv().await
            };
            let job = match msg {
                Some(DownloadMsg::Job(job)) => job,
                Some(DownloadMsg::Shutdown) => {
                    if let Some(tx) = requeue.upgrade() {
                        let _ = tx.try_send(DownloadMsg::Shutdown);
                    }
                    break;
                }
                None => break,
            };

            let job_id = job.id;
            let claimed = job.claimed;
            let link = job.link.clone();
            let record = match AssertUnwindSafe(self.process_job(job, &upload_tx))
                .catch_unwind()
                .await
            {
                Ok(Ok(record)) => record,
                Ok(Err(e)) => {
                    warn!(worker, job_id, error = %e, "job failed inside downloader");
                    internal_failure(&link, &e)
                }
                Err(_) => {
                    warn!(worker, job_id, "job panicked inside downloader");
                    internal_failure(&link, &"panic during transfer")
                }
            };

            if upload_tx
                .send(UploadMsg::Settled {
                    job_id,
                    record,
                    claimed,
                })
                .await
                .is_err()
            {
                break;
            }
        }
        debug!(worker, "downloader stopped");
    }

    #[instrument(skip(self, job, upload_tx), fields(job_id = job.id, link = %job.link))]
    async fn process_job(
        &self,
        mut job: TransferJob,
        upload_tx: &mpsc::Sender<UploadMsg>,
    ) -> Result<ResultRecord, PipelineError> {
        let max = self.config.max_file_size;

        while let Some(descriptor) = job.current_file().cloned() {
            if self.cancel.is_cancelled() {
                return self.cancel_job(job);
            }
            if descriptor.is_oversized(max) {
                debug!(file = %descriptor.name, "skipping oversized file");
                job.finish_file(FileReport::oversized(&descriptor, max));
                continue;
            }

            match self.transfer_file(&mut job, descriptor).await? {
                FileStep::Staged {
                    descriptor,
                    transfer,
                } => {
                    job = self
                        .hand_to_uploader(job, descriptor, transfer, upload_tx)
                        .await?;
                }
                FileStep::Failed(report) => job.finish_file(report),
                FileStep::Cancelled => return self.cancel_job(job),
            }
        }

        if self.cancel.is_cancelled() && job.status() == JobStatus::ReadyForUpload {
            return self.cancel_job(job);
        }

        let outcome = combine_outcomes(&job.files).unwrap_or(Outcome::Failed);
        let status = match outcome {
            Outcome::Succeeded => JobStatus::Succeeded,
            Outcome::Cancelled => JobStatus::Cancelled,
            Outcome::Failed | Outcome::Oversized | Outcome::Duplicate => JobStatus::FailedPermanent,
        };
        job.advance(status, &self.events)?;
        Ok(ResultRecord::from_files(
            job.link,
            job.files,
            outcome,
            None,
            job.started_at.elapsed(),
        ))
    }

    async fn transfer_file(
        &self,
        job: &mut TransferJob,
        mut descriptor: FileDescriptor,
    ) -> Result<FileStep, PipelineError> {
        let config = &self.config;
        loop {
            job.advance(JobStatus::Downloading, &self.events)?;
            let destination = staging_path(&config.staging_dir, &descriptor.transfer_url, &descriptor.name);
            job.staging_path = Some(destination.clone());

            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    // Transfer URLs expire, so a partial could never be resumed.
                    let partial = partial_path(&destination);
                    if let Err(e) = remove_if_exists(&partial).await {
                        warn!(path = %partial.display(), error = %e, "failed to remove partial file");
                    }
                    job.staging_path = None;
                    return Ok(FileStep::Cancelled);
                }
                result = self.transferer.transfer(
                    &descriptor.transfer_url,
                    &destination,
                    config.transfer_attempts,
                ) => result,
            };

            let error = match result {
                Ok(transfer) => {
                    job.advance(JobStatus::ReadyForUpload, &self.events)?;
                    return Ok(FileStep::Staged {
                        descriptor,
                        transfer,
                    });
                }
                Err(e) => e,
            };

            job.attempt += 1;
            job.staging_path = None;
            job.advance(JobStatus::ResolvingMetadata, &self.events)?;
            warn!(
                file = %descriptor.name,
                round = job.attempt,
                ceiling = config.retry_ceiling,
                error = %error,
                "transfer failed"
            );
            let mut last_error = JobError::transfer(&descriptor.name, &error);

            // Fetch a fresh transfer URL before the next round.
            loop {
                if job.attempt >= config.retry_ceiling {
                    return Ok(FileStep::Failed(FileReport::failed(&descriptor, &last_error)));
                }
                if !self.backoff(job.attempt).await {
                    return Ok(FileStep::Cancelled);
                }

                let fresh = tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => return Ok(FileStep::Cancelled),
                    fresh = tokio::time::timeout(
                        config.resolve_timeout,
                        self.resolver.reresolve(&job.link, &descriptor.name),
                    ) => fresh,
                };

                match fresh {
                    Ok(Ok(Some(refreshed))) if refreshed.is_oversized(config.max_file_size) => {
                        let error = JobError::Oversize {
                            file: refreshed.name.clone(),
                            size_bytes: refreshed.size_bytes,
                            max_bytes: config.max_file_size,
                        };
                        return Ok(FileStep::Failed(FileReport::failed(&descriptor, &error)));
                    }
                    Ok(Ok(Some(refreshed))) => {
                        debug!(file = %refreshed.name, "obtained fresh transfer URL");
                        if let Some(slot) = job.descriptors.get_mut(job.next_file) {
                            *slot = refreshed.clone();
                        }
                        descriptor = refreshed;
                        break;
                    }
                    Ok(Ok(None)) => {
                        let error = JobError::resolution(format!(
                            "{} is no longer listed",
                            descriptor.name
                        ));
                        return Ok(FileStep::Failed(FileReport::failed(&descriptor, &error)));
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "re-resolution failed");
                        job.attempt += 1;
                        last_error = JobError::resolution(e);
                    }
                    Err(_) => {
                        let e = ResolveError::timeout(&job.link, config.resolve_timeout.as_secs());
                        warn!(error = %e, "re-resolution timed out");
                        job.attempt += 1;
                        last_error = JobError::resolution(e);
                    }
                }
            }
        }
    }

    async fn hand_to_uploader(
        &self,
        job: TransferJob,
        descriptor: FileDescriptor,
        transfer: TransferOutcome,
        upload_tx: &mpsc::Sender<UploadMsg>,
    ) -> Result<TransferJob, PipelineError> {
        let staged = transfer.path.clone();
        let (reply, returned) = oneshot::channel();
        let request = UploadRequest {
            job,
            descriptor,
            transfer,
            reply,
        };
        if upload_tx.send(UploadMsg::Upload(request)).await.is_err() {
            let _ = remove_if_exists(&staged).await;
            return Err(PipelineError::QueueClosed { stage: "upload" });
        }
        returned
            .await
            .map_err(|_| PipelineError::QueueClosed { stage: "upload" })
    }

    fn cancel_job(&self, mut job: TransferJob) -> Result<ResultRecord, PipelineError> {
        while let Some(descriptor) = job.current_file().cloned() {
            job.finish_file(FileReport::cancelled(&descriptor));
        }
        job.advance(JobStatus::Cancelled, &self.events)?;
        info!(job_id = job.id, "job cancelled");
        Ok(ResultRecord::from_files(
            job.link,
            job.files,
            Outcome::Cancelled,
            Some(&JobError::Cancelled),
            job.started_at.elapsed(),
        ))
    }

    // ---- Stage C ----

    async fn upload_stage(
        &self,
        links: &[String],
        mut rx: mpsc::Receiver<UploadMsg>,
    ) -> Vec<ResultRecord> {
        let total = links.len();
        let mut settled: Vec<Option<ResultRecord>> = vec![None; total];
        let mut count = 0;

        while count < total {
            let Some(msg) = rx.recv().await else {
                warn!(settled = count, total, "all stages stopped before the batch finished");
                break;
            };
            match msg {
                UploadMsg::Upload(request) => self.deliver(request).await,
                UploadMsg::Settled {
                    job_id,
                    record,
                    claimed,
                } => match settled.get_mut(job_id) {
                    Some(slot) if slot.is_none() => {
                        self.settle(job_id, &record, claimed).await;
                        *slot = Some(record);
                        count += 1;
                    }
                    _ => warn!(job_id, "ignoring repeated settlement"),
                },
            }
        }

        let mut records = Vec::with_capacity(total);
        for (job_id, slot) in settled.into_iter().enumerate() {
            let record = match slot {
                Some(record) => record,
                None => {
                    let record = ResultRecord::settled(
                        links[job_id].as_str(),
                        Outcome::Failed,
                        Some(&JobError::internal(STOPPED_EARLY)),
                        Duration::ZERO,
                    );
                    self.settle(job_id, &record, false).await;
                    record
                }
            };
            records.push(record);
        }
        records
    }

    async fn deliver(&self, request: UploadRequest) {
        let UploadRequest {
            mut job,
            descriptor,
            transfer,
            reply,
        } = request;

        let report = if self.cancel.is_cancelled() {
            discard_staged(&transfer.path).await;
            FileReport::cancelled(&descriptor)
        } else if let Err(e) = job.advance(JobStatus::Uploading, &self.events) {
            discard_staged(&transfer.path).await;
            FileReport::failed(&descriptor, &JobError::internal(e))
        } else {
            let upload = AssertUnwindSafe(self.uploader.upload(
                &transfer.path,
                &descriptor,
                &self.config.destinations,
            ))
            .catch_unwind()
            .await;
            match upload {
                Ok(outcome) => {
                    let primary_error = outcome
                        .primary
                        .as_ref()
                        .err()
                        .map(|e| JobError::upload(&descriptor.name, e));
                    FileReport::transferred(
                        &descriptor,
                        &transfer,
                        primary_error.as_ref(),
                        outcome.broadcast_failures,
                    )
                }
                Err(_) => {
                    warn!(job_id = job.id, "upload panicked");
                    discard_staged(&transfer.path).await;
                    FileReport::failed(&descriptor, &JobError::internal("panic during upload"))
                }
            }
        };

        job.finish_file(report);
        if reply.send(job).is_err() {
            warn!("downloader went away before its job came back");
        }
    }

    async fn settle(&self, job_id: usize, record: &ResultRecord, claimed: bool) {
        info!(
            job_id,
            link = %record.link,
            outcome = %record.outcome,
            error = record.error.as_deref().unwrap_or(""),
            "job settled"
        );

        if claimed
            && matches!(record.outcome, Outcome::Failed | Outcome::Cancelled)
            && let Some(dedup) = &self.dedup
            && let Err(e) = dedup.remove(&record.link).await
        {
            warn!(link = %record.link, error = %e, "failed to release dedup claim");
        }

        if let Some(history) = &self.history
            && let Err(e) = history.append(record).await
        {
            warn!(error = %e, "failed to append result record");
        }

        self.events.send(PipelineEvent::JobFinished {
            job_id,
            record: record.clone(),
        });
    }

    // ---- shared ----

    fn settle_now(
        &self,
        job: &mut TransferJob,
        outcome: Outcome,
        error: Option<&JobError>,
    ) -> Admission {
        Admission::Settled(ResultRecord::from_files(
            job.link.as_str(),
            std::mem::take(&mut job.files),
            outcome,
            error,
            job.started_at.elapsed(),
        ))
    }

    /// Sleeps `job_backoff * attempt`. Returns false when cancelled first.
    async fn backoff(&self, attempt: u32) -> bool {
        let delay = self.config.job_backoff.saturating_mul(attempt);
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}

fn internal_failure(link: &str, error: &impl ToString) -> ResultRecord {
    ResultRecord::settled(
        link,
        Outcome::Failed,
        Some(&JobError::internal(error.to_string())),
        Duration::ZERO,
    )
}

async fn discard_staged(path: &std::path::Path) {
    if let Err(e) = remove_if_exists(path).await {
        warn!(path = %path.display(), error = %e, "failed to remove staged file");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.max_file_size, 52_428_800);
        assert_eq!(config.retry_ceiling, 3);
        assert_eq!(config.status.every, 5);
    }

    #[test]
    fn test_concurrency_bounds() {
        for bad in [0, 101] {
            let config = PipelineConfig {
                concurrency: bad,
                ..PipelineConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(PipelineError::InvalidConcurrency { value, .. }) if value == bad
            ));
        }
        for good in [1, 100] {
            let config = PipelineConfig {
                concurrency: good,
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        let config = PipelineConfig {
            retry_ceiling: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_zero_status_interval_rejected() {
        let config = PipelineConfig {
            status: StatusCadence {
                every: 1,
                interval: Duration::ZERO,
            },
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("status interval"));
    }

    #[test]
    fn test_internal_failure_record() {
        let record = internal_failure("l", &STOPPED_EARLY);
        assert_eq!(record.outcome, Outcome::Failed);
        assert!(record.error.unwrap().contains(STOPPED_EARLY));
    }
}
