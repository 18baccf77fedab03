//! Retry-failed command handler: re-run links whose latest result failed.

use anyhow::Result;
use tracing::info;

use super::run::execute_batch;
use crate::ProcessExit;
use crate::app::context::CommandContext;
use crate::app::settings::resolve_run_settings;
use crate::cli::RetryFailedArgs;

pub async fn run_retry_failed_command(
    ctx: &CommandContext,
    args: &RetryFailedArgs,
) -> Result<ProcessExit> {
    let settings = resolve_run_settings(&args.pipeline, ctx.file_config())?;

    let links = {
        let db = ctx.open_database().await?;
        let history = CommandContext::history(&db);
        history.failed_links(i64::from(args.limit), 0).await?
    };

    if links.is_empty() {
        println!("No failed links to retry.");
        return Ok(ProcessExit::Success);
    }

    info!(count = links.len(), "Retrying failed links");
    execute_batch(ctx, &settings, links, args.report.as_deref()).await
}
