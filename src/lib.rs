//! linkrelay core library
//!
//! Extracts file-hosting links from chat text, resolves them to direct
//! transfer URLs, downloads the files through a local staging area and relays
//! them to one or more destinations, keeping persistent dedup and result state.
//!
//! # Architecture
//!
//! - [`parser`] - Link extraction from chat text and batch documents
//! - [`dedup`] - Persistent set of already-processed links
//! - [`resolver`] - Link to file-descriptor resolution
//! - [`download`] - Resumable, verified HTTP transfers into staging
//! - [`upload`] - Delivery of staged files to destinations
//! - [`pipeline`] - The bounded three-stage pipeline and progress tracking
//! - [`store`] / [`db`] - Key/value persistence over `SQLite`
//! - [`history`] - Persistent log of settled results
//! - [`config`] / [`output`] - File configuration and batch output

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod dedup;
pub mod download;
pub mod history;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod store;
pub mod upload;
pub(crate) mod user_agent;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::{ConfigError, FileConfig, LoadedConfig, load_config};
pub use db::{Database, DbError};
pub use dedup::{BulkAddReport, DedupError, DedupStore};
pub use download::{
    FailureType, HttpTransferer, ResumableTransfer, RetryDecision, RetryPolicy, TransferError,
    TransferOutcome, classify_error,
};
pub use history::{HistoryError, HistoryStats, ResultHistory};
pub use parser::{LinkExtractor, ParseError, extract_links, normalize_link, parse_batch_input};
pub use pipeline::{
    BatchReport, BatchSummary, JobError, JobStatus, Outcome, Pipeline, PipelineConfig,
    PipelineError, ProgressSnapshot, ResultRecord, StatusSink,
};
pub use resolver::{FileDescriptor, HttpMetadataResolver, MediaKind, MetadataResolver, ResolveError};
pub use store::{KvStore, MemoryKvStore, SqliteKvStore, StoreError};
pub use upload::{DirectorySink, Destinations, UploadDispatcher, UploadError, UploadSink};
