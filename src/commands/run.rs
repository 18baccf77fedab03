//! Run command handler: relay the files behind a batch of links.

use std::io::{self, IsTerminal};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use linkrelay_core::output::{format_problem_lines, format_summary, write_report};
use linkrelay_core::pipeline::LogStatusSink;
use linkrelay_core::{
    BatchReport, DirectorySink, HttpMetadataResolver, HttpTransferer, Pipeline, UploadDispatcher,
    extract_links,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ProcessExit;
use crate::app::context::CommandContext;
use crate::app::exit_handler::determine_exit_outcome;
use crate::app::input;
use crate::app::progress::ProgressBarSink;
use crate::app::settings::{RunSettings, resolve_run_settings};
use crate::app::terminal::{is_dumb_terminal, should_use_progress_bar};
use crate::cli::RunArgs;

pub async fn run_run_command(ctx: &CommandContext, args: &RunArgs) -> Result<ProcessExit> {
    let links = if let Some(batch) = &args.batch {
        input::read_batch_file(batch)?
    } else if let Some(text) = input::read_text_input(&args.text)? {
        extract_links(&text)
    } else {
        println!("No input provided. Pass text as arguments, pipe it via stdin, or use --batch FILE.");
        return Ok(ProcessExit::Success);
    };

    if links.is_empty() {
        println!("No recognized links found in input.");
        return Ok(ProcessExit::Success);
    }

    let settings = resolve_run_settings(&args.pipeline, ctx.file_config())?;
    execute_batch(ctx, &settings, links, args.report.as_deref()).await
}

/// Builds the pipeline from `settings`, runs `links` through it and prints
/// the summary. Ctrl-C cancels the batch.
pub(crate) async fn execute_batch(
    ctx: &CommandContext,
    settings: &RunSettings,
    links: Vec<String>,
    report_path: Option<&Path>,
) -> Result<ProcessExit> {
    let db = ctx.open_database().await?;
    let dedup = Arc::new(ctx.dedup_store(&db));
    let history = Arc::new(CommandContext::history(&db));

    let timeouts = settings.http_timeouts;
    let resolver = HttpMetadataResolver::with_timeouts(
        &settings.resolver_base,
        timeouts.resolver_connect_secs,
        timeouts.resolver_read_secs,
    )
    .context("failed to create metadata resolver")?;
    let transferer =
        HttpTransferer::with_timeouts(timeouts.download_connect_secs, timeouts.download_read_secs)
            .context("failed to create transfer client")?
            .with_attempt_timeout(settings.pipeline.attempt_timeout);
    let uploader = UploadDispatcher::new(Arc::new(DirectorySink::new(&settings.output_root)))
        .keep_staged(settings.keep_staged);

    let total = links.len();
    let mut pipeline = Pipeline::new(
        settings.pipeline.clone(),
        Arc::new(resolver),
        Arc::new(transferer),
        uploader,
    )?
    .with_dedup(dedup)
    .with_result_log(history);

    if should_use_progress_bar(
        io::stderr().is_terminal(),
        ctx.quiet,
        !settings.show_progress,
        is_dumb_terminal(),
    ) {
        pipeline = pipeline.with_status_sink(Arc::new(ProgressBarSink::new(total)));
    } else if !ctx.quiet {
        pipeline = pipeline.with_status_sink(Arc::new(LogStatusSink));
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling batch.");
            interrupt.cancel();
        }
    });

    info!(
        links = total,
        concurrency = settings.pipeline.concurrency,
        primary = %settings.pipeline.destinations.primary,
        "Starting batch"
    );
    let report = pipeline.run(links, cancel).await;

    if let Some(path) = report_path {
        write_report(path, &report)?;
        info!(path = %path.display(), "Result log written");
    }
    print_batch_summary(&report, ctx.quiet);

    Ok(determine_exit_outcome(&report.summary))
}

fn print_batch_summary(report: &BatchReport, quiet: bool) {
    println!("{}", format_summary(&report.summary));
    if quiet {
        return;
    }
    for line in format_problem_lines(&report.records) {
        println!("  {line}");
    }
    info!(
        elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        "Batch complete"
    );
}
