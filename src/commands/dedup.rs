//! Dedup command handler: import, count, clear and export processed links.

use std::path::Path;

use anyhow::{Context, Result};
use linkrelay_core::DedupStore;

use crate::app::context::CommandContext;
use crate::app::input;
use crate::cli::DedupCommand;

pub async fn run_dedup_command(ctx: &CommandContext, action: &DedupCommand) -> Result<()> {
    let db = ctx.open_database().await?;
    let store = ctx.dedup_store(&db);

    match action {
        DedupCommand::Import { file } => import(&store, file).await,
        DedupCommand::Count => {
            println!("{}", store.count().await?);
            Ok(())
        }
        DedupCommand::Clear => {
            let removed = store.clear().await?;
            println!("Removed {removed} links from '{}'.", store.namespace());
            Ok(())
        }
        DedupCommand::Export { file } => export(&store, file.as_deref()).await,
    }
}

async fn import(store: &DedupStore, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read '{}'", file.display()))?;
    let links = input::links_from_document(&raw)
        .with_context(|| format!("failed to parse '{}'", file.display()))?;

    let report = store.bulk_add(links).await?;
    println!(
        "Imported {} links ({} already present, {} total).",
        report.added, report.duplicates_skipped, report.total_after
    );
    Ok(())
}

async fn export(store: &DedupStore, file: Option<&Path>) -> Result<()> {
    let links = store.links().await?;
    let body = serde_json::to_string_pretty(&links)?;
    match file {
        Some(path) => {
            std::fs::write(path, format!("{body}\n"))
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            println!("Exported {} links to {}.", links.len(), path.display());
        }
        None => println!("{body}"),
    }
    Ok(())
}
