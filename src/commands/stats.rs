//! Stats command handler: aggregate counts from the result history.

use anyhow::Result;
use linkrelay_core::HistoryStats;
use linkrelay_core::history::HistoryEntry;
use linkrelay_core::output::format_bytes;
use serde::Serialize;

use crate::app::context::CommandContext;
use crate::cli::StatsArgs;

#[derive(Serialize)]
struct StatsView<'a> {
    #[serde(flatten)]
    stats: &'a HistoryStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    recent: Option<&'a [HistoryEntry]>,
}

pub async fn run_stats_command(ctx: &CommandContext, args: &StatsArgs) -> Result<()> {
    let db = ctx.open_database().await?;
    let history = CommandContext::history(&db);

    let stats = history.stats().await?;
    let recent = match args.recent {
        Some(limit) => Some(history.recent(i64::from(limit)).await?),
        None => None,
    };

    if args.json {
        let view = StatsView {
            stats: &stats,
            recent: recent.as_deref(),
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    for line in render_stats(&stats) {
        println!("{line}");
    }
    if let Some(entries) = recent {
        if entries.is_empty() {
            println!("No results recorded yet.");
        }
        for entry in &entries {
            println!("{}", render_entry(entry));
        }
    }
    Ok(())
}

fn render_stats(stats: &HistoryStats) -> Vec<String> {
    let bytes = u64::try_from(stats.bytes_delivered).unwrap_or(0);
    vec![
        format!("Total:     {}", stats.total),
        format!("Succeeded: {}", stats.succeeded),
        format!("Failed:    {}", stats.failed),
        format!("Oversized: {}", stats.oversized),
        format!("Duplicate: {}", stats.duplicate),
        format!("Cancelled: {}", stats.cancelled),
        format!("Delivered: {}", format_bytes(bytes)),
    ]
}

fn render_entry(entry: &HistoryEntry) -> String {
    let mut line = format!(
        "{}  {:<9} {}",
        entry.recorded_at,
        entry.outcome.as_str(),
        entry.link
    );
    if let Some(error) = &entry.error {
        line.push_str("  (");
        line.push_str(error);
        line.push(')');
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkrelay_core::Outcome;

    #[test]
    fn test_render_stats_formats_bytes() {
        let stats = HistoryStats {
            total: 3,
            succeeded: 2,
            failed: 1,
            bytes_delivered: 2 * 1024 * 1024,
            ..HistoryStats::default()
        };
        let lines = render_stats(&stats);
        assert_eq!(lines[0], "Total:     3");
        assert_eq!(lines[6], "Delivered: 2.0 MiB");
    }

    #[test]
    fn test_render_entry_includes_error() {
        let entry = HistoryEntry {
            id: 1,
            link: "https://terabox.com/s/1a".to_string(),
            name: String::new(),
            size_bytes: 0,
            outcome: Outcome::Failed,
            error: Some("no files found".to_string()),
            elapsed_ms: 3,
            file_count: 0,
            recorded_at: "2026-01-01 00:00:00".to_string(),
        };
        assert_eq!(
            render_entry(&entry),
            "2026-01-01 00:00:00  failed    https://terabox.com/s/1a  (no files found)"
        );
    }
}
