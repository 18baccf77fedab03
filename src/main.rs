//! CLI entry point for linkrelay.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use linkrelay_core::load_config;
use tracing::debug;

mod app;
mod cli;
mod commands;

use app::context::CommandContext;
use app::terminal;
use cli::{Cli, Command};

/// Process outcome mapped to the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Everything requested was done.
    Success,
    /// Some links succeeded and some failed.
    Partial,
    /// Nothing succeeded.
    Failure,
}

impl ProcessExit {
    fn code(self) -> ExitCode {
        match self {
            Self::Success => ExitCode::SUCCESS,
            Self::Partial => ExitCode::from(1),
            Self::Failure => ExitCode::from(2),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    terminal::init_tracing(terminal::resolve_default_log_level(cli.verbose, cli.quiet));
    debug!(?cli, "CLI arguments parsed");

    match run(cli).await {
        Ok(exit) => exit.code(),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ProcessExit::Failure.code()
        }
    }
}

async fn run(cli: Cli) -> Result<ProcessExit> {
    let loaded = load_config(cli.config.as_deref())?;
    if let Some(path) = &loaded.path
        && loaded.config.is_some()
    {
        debug!(path = %path.display(), "Using config file");
    }
    let ctx = CommandContext::new(&cli, loaded);

    match &cli.command {
        Command::Run(args) => commands::run_run_command(&ctx, args).await,
        Command::Extract(args) => {
            commands::run_extract_command(args)?;
            Ok(ProcessExit::Success)
        }
        Command::Dedup { action } => {
            commands::run_dedup_command(&ctx, action).await?;
            Ok(ProcessExit::Success)
        }
        Command::Stats(args) => {
            commands::run_stats_command(&ctx, args).await?;
            Ok(ProcessExit::Success)
        }
        Command::RetryFailed(args) => commands::run_retry_failed_command(&ctx, args).await,
    }
}
