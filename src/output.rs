//! Batch result output: the human summary line and the JSON result log.

use std::fs;
use std::io::Write;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::pipeline::{BatchReport, BatchSummary, Outcome, ResultRecord};

/// Errors from writing batch output.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The report file could not be written.
    #[error("failed to write result log '{path}': {source}")]
    Io {
        /// Report path.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Records could not be serialized.
    #[error("failed to serialize result log: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Formats the one-line batch summary.
///
/// ```
/// use linkrelay_core::output::format_summary;
/// use linkrelay_core::pipeline::BatchSummary;
///
/// let summary = BatchSummary { total: 3, succeeded: 1, failed: 1, duplicate: 1, ..Default::default() };
/// assert_eq!(
///     format_summary(&summary),
///     "3 links: 1 succeeded, 1 failed, 0 oversized, 1 duplicate, 0 cancelled"
/// );
/// ```
#[must_use]
pub fn format_summary(summary: &BatchSummary) -> String {
    let parts: Vec<String> = Outcome::ALL
        .iter()
        .map(|outcome| format!("{} {outcome}", summary.count(*outcome)))
        .collect();
    let noun = if summary.total == 1 { "link" } else { "links" };
    format!("{} {noun}: {}", summary.total, parts.join(", "))
}

/// One line per record that did not succeed, for the end-of-run listing.
#[must_use]
pub fn format_problem_lines(records: &[ResultRecord]) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.outcome != Outcome::Succeeded)
        .map(|r| match &r.error {
            Some(error) => format!("{:<9} {}  ({error})", r.outcome.as_str(), r.link),
            None => format!("{:<9} {}", r.outcome.as_str(), r.link),
        })
        .collect()
}

/// Serializes records as a pretty JSON array.
///
/// # Errors
///
/// Returns [`OutputError::Serialize`] if serialization fails.
pub fn records_to_json(records: &[ResultRecord]) -> Result<String, OutputError> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// Writes the batch's records to `path` as a JSON array.
///
/// The file is written to a sibling temp path first and renamed into place.
///
/// # Errors
///
/// Returns [`OutputError`] on serialization or IO failure.
#[instrument(skip(report), fields(path = %path.display(), records = report.records.len()))]
pub fn write_report(path: &Path, report: &BatchReport) -> Result<(), OutputError> {
    let body = records_to_json(&report.records)?;
    let io_err = |source| OutputError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(body.as_bytes()).map_err(io_err)?;
        file.write_all(b"\n").map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    fs::rename(&tmp, path).map_err(io_err)?;
    debug!("result log written");
    Ok(())
}

/// Human-readable byte count (binary units).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
