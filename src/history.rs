//! Persistent log of settled result records.
//!
//! Every record a pipeline settles can be appended here. The log feeds the
//! `stats` and `retry-failed` commands.

use serde::Serialize;
use sqlx::{FromRow, Row};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::pipeline::{Outcome, ResultRecord};

/// Errors from the result history.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The query failed.
    #[error("history database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored outcome label is unknown.
    #[error("history row {id} has unknown outcome '{value}'")]
    InvalidOutcome {
        /// Row id.
        id: i64,
        /// Stored label.
        value: String,
    },
}

/// Aggregate counts over the whole history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    /// Rows recorded.
    pub total: i64,
    /// Succeeded rows.
    pub succeeded: i64,
    /// Failed rows.
    pub failed: i64,
    /// Oversized rows.
    pub oversized: i64,
    /// Duplicate rows.
    pub duplicate: i64,
    /// Cancelled rows.
    pub cancelled: i64,
    /// Bytes delivered by succeeded rows.
    pub bytes_delivered: i64,
}

/// One stored row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Row id.
    pub id: i64,
    /// Submitted link.
    pub link: String,
    /// First file's name.
    pub name: String,
    /// Total declared size.
    pub size_bytes: i64,
    /// Final outcome.
    pub outcome: Outcome,
    /// Error text, if any.
    pub error: Option<String>,
    /// Elapsed milliseconds.
    pub elapsed_ms: i64,
    /// Number of files in the record.
    pub file_count: i64,
    /// `SQLite` timestamp of the append.
    pub recorded_at: String,
}

#[derive(FromRow)]
struct HistoryRow {
    id: i64,
    link: String,
    name: String,
    size_bytes: i64,
    outcome: String,
    error: Option<String>,
    elapsed_ms: i64,
    file_count: i64,
    recorded_at: String,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = HistoryError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let outcome = row
            .outcome
            .parse::<Outcome>()
            .map_err(|_| HistoryError::InvalidOutcome {
                id: row.id,
                value: row.outcome.clone(),
            })?;
        Ok(Self {
            id: row.id,
            link: row.link,
            name: row.name,
            size_bytes: row.size_bytes,
            outcome,
            error: row.error,
            elapsed_ms: row.elapsed_ms,
            file_count: row.file_count,
            recorded_at: row.recorded_at,
        })
    }
}

/// Append-only store of [`ResultRecord`]s.
#[derive(Debug, Clone)]
pub struct ResultHistory {
    db: Database,
}

impl ResultHistory {
    /// Creates a history over `db`.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Appends `record` and returns its row id.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Database`] if the insert fails.
    #[instrument(skip(self, record), fields(link = %record.link, outcome = %record.outcome))]
    pub async fn append(&self, record: &ResultRecord) -> Result<i64, HistoryError> {
        let row = sqlx::query(
            r"INSERT INTO transfer_results (link, name, size_bytes, outcome, error, elapsed_ms, file_count)
              VALUES (?, ?, ?, ?, ?, ?, ?)
              RETURNING id",
        )
        .bind(&record.link)
        .bind(&record.name)
        .bind(i64::try_from(record.size_bytes).unwrap_or(i64::MAX))
        .bind(record.outcome.as_str())
        .bind(record.error.as_deref())
        .bind(i64::try_from(record.elapsed_ms).unwrap_or(i64::MAX))
        .bind(i64::try_from(record.files.len()).unwrap_or(i64::MAX))
        .fetch_one(self.db.pool())
        .await?;

        let id: i64 = row.get("id");
        debug!(id, "result appended");
        Ok(id)
    }

    /// Counts rows by outcome.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<HistoryStats, HistoryError> {
        let rows = sqlx::query(
            r"SELECT outcome, COUNT(*) AS n, COALESCE(SUM(size_bytes), 0) AS bytes
              FROM transfer_results
              GROUP BY outcome",
        )
        .fetch_all(self.db.pool())
        .await?;

        let mut stats = HistoryStats::default();
        for row in rows {
            let outcome: String = row.get("outcome");
            let n: i64 = row.get("n");
            stats.total += n;
            match outcome.parse::<Outcome>() {
                Ok(Outcome::Succeeded) => {
                    stats.succeeded = n;
                    stats.bytes_delivered = row.get("bytes");
                }
                Ok(Outcome::Failed) => stats.failed = n,
                Ok(Outcome::Oversized) => stats.oversized = n,
                Ok(Outcome::Duplicate) => stats.duplicate = n,
                Ok(Outcome::Cancelled) => stats.cancelled = n,
                Err(_) => {}
            }
        }
        Ok(stats)
    }

    /// Links whose latest record failed or was cancelled, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn failed_links(&self, limit: i64, offset: i64) -> Result<Vec<String>, HistoryError> {
        let rows = sqlx::query(
            r"SELECT t.link
              FROM transfer_results t
              WHERE t.id = (SELECT MAX(id) FROM transfer_results WHERE link = t.link)
                AND t.outcome IN ('failed', 'cancelled')
              ORDER BY t.id DESC
              LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(|row| row.get("link")).collect())
    }

    /// Most recent rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] if the query fails or a row is corrupt.
    #[instrument(skip(self))]
    pub async fn recent(&self, limit: i64) -> Result<Vec<HistoryEntry>, HistoryError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r"SELECT id, link, name, size_bytes, outcome, error, elapsed_ms, file_count, recorded_at
              FROM transfer_results
              ORDER BY id DESC
              LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter().map(HistoryEntry::try_from).collect()
    }

    /// Deletes every row and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<u64, HistoryError> {
        let result = sqlx::query("DELETE FROM transfer_results")
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
