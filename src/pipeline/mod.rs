//! The bounded-concurrency transfer pipeline.
//!
//! Links enter Stage A (dedup and metadata resolution), ready jobs flow to N
//! downloaders in Stage B, and a single uploader in Stage C delivers staged
//! files and settles exactly one [`ResultRecord`] per submitted link.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use linkrelay_core::download::HttpTransferer;
//! use linkrelay_core::pipeline::{Pipeline, PipelineConfig};
//! use linkrelay_core::resolver::HttpMetadataResolver;
//! use linkrelay_core::upload::{DirectorySink, UploadDispatcher};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::new(
//!     PipelineConfig::default(),
//!     Arc::new(HttpMetadataResolver::new("https://api.example.com/resolve")?),
//!     Arc::new(HttpTransferer::new()?),
//!     UploadDispatcher::new(Arc::new(DirectorySink::new("./out"))),
//! )?;
//! let report = pipeline
//!     .run(vec!["https://terabox.com/s/1abc".into()], CancellationToken::new())
//!     .await;
//! println!("{} succeeded", report.summary.succeeded);
//! # Ok(())
//! # }
//! ```

mod error;
mod job;
mod orchestrator;
mod record;
pub mod status;

pub use error::{JobError, PipelineError};
pub use job::{JobStatus, TransferJob};
pub use orchestrator::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_FILE_SIZE, MAX_CONCURRENCY, MIN_CONCURRENCY, Pipeline,
    PipelineConfig,
};
pub use record::{BatchReport, BatchSummary, FileReport, Outcome, ResultRecord, combine_outcomes};
pub use status::{
    EventSender, LogStatusSink, PipelineEvent, ProgressSnapshot, SinkError, StatusAggregator,
    StatusCadence, StatusSink, snapshot,
};
