//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Relay hosted files from chat links to local destinations.
///
/// linkrelay extracts file-hosting links from text, resolves them through a
/// metadata service, downloads each file into a staging area with resume
/// support and delivers it to a primary destination plus optional broadcast
/// destinations.
#[derive(Parser, Debug)]
#[command(name = "linkrelay")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/linkrelay/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database holding dedup and history state
    #[arg(long, value_name = "FILE", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract links from text or a batch file and relay their files
    Run(RunArgs),
    /// Print recognized links, one per line
    Extract(ExtractArgs),
    /// Manage the set of already-processed links
    Dedup {
        #[command(subcommand)]
        action: DedupCommand,
    },
    /// Show aggregate counts from the result history
    Stats(StatsArgs),
    /// Re-run links whose latest result failed or was cancelled
    RetryFailed(RetryFailedArgs),
}

/// Pipeline settings shared by `run` and `retry-failed`.
///
/// Every flag is optional so that unset flags fall back to the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct PipelineArgs {
    /// Primary destination identifier
    #[arg(long, value_name = "ID")]
    pub dest: Option<String>,

    /// Broadcast destination identifier (repeatable)
    #[arg(long = "broadcast", value_name = "ID")]
    pub broadcast: Vec<String>,

    /// Root directory destinations are created under
    #[arg(long = "out", value_name = "DIR")]
    pub output_root: Option<PathBuf>,

    /// Directory for in-progress and staged files
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Maximum concurrent transfers (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Skip files larger than this many MiB
    #[arg(long, value_name = "MB", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_size_mb: Option<u64>,

    /// Metadata service endpoint
    #[arg(long, value_name = "URL")]
    pub resolver_base: Option<String>,

    /// Keep staged files after delivery
    #[arg(long)]
    pub keep_staged: bool,

    /// Process links even if they were handled before
    #[arg(long)]
    pub allow_duplicates: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Text containing links (reads stdin when empty)
    #[arg(value_name = "TEXT")]
    pub text: Vec<String>,

    /// Batch file: JSON array of links or {"links": [...]}
    #[arg(long, value_name = "FILE", conflicts_with = "text")]
    pub batch: Option<PathBuf>,

    /// Write the result log as JSON to FILE
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Text containing links (reads stdin when empty)
    #[arg(value_name = "TEXT")]
    pub text: Vec<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum DedupCommand {
    /// Add links from a file (JSON batch or free text) to the set
    Import {
        /// File to read
        file: PathBuf,
    },
    /// Print how many links are in the set
    Count,
    /// Remove every link from the set
    Clear,
    /// Write the set as a JSON array (stdout when FILE is omitted)
    Export {
        /// File to write
        file: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    /// Also list the N most recent results
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub recent: Option<u32>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RetryFailedArgs {
    /// Maximum number of links to retry
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u32).range(1..=10_000))]
    pub limit: u32,

    /// Write the result log as JSON to FILE
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_run_with_text_and_flags() {
        let cli = Cli::try_parse_from([
            "linkrelay",
            "-v",
            "run",
            "see https://terabox.com/s/1a",
            "-c",
            "7",
            "--broadcast",
            "a",
            "--broadcast",
            "b",
            "--keep-staged",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.text, vec!["see https://terabox.com/s/1a"]);
        assert_eq!(args.pipeline.concurrency, Some(7));
        assert_eq!(args.pipeline.broadcast, vec!["a", "b"]);
        assert!(args.pipeline.keep_staged);
        assert!(args.pipeline.dest.is_none());
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["linkrelay", "stats", "-q", "--db", "x.db"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.db, Some(PathBuf::from("x.db")));
    }

    #[test]
    fn test_cli_concurrency_bounds() {
        for bad in ["0", "101"] {
            let err = Cli::try_parse_from(["linkrelay", "run", "-c", bad]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_cli_batch_conflicts_with_text() {
        let err =
            Cli::try_parse_from(["linkrelay", "run", "--batch", "b.json", "text"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_dedup_subcommands() {
        let cli = Cli::try_parse_from(["linkrelay", "dedup", "import", "links.json"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Dedup {
                action: DedupCommand::Import { .. }
            }
        ));

        let cli = Cli::try_parse_from(["linkrelay", "dedup", "export"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Dedup {
                action: DedupCommand::Export { file: None }
            }
        ));
    }

    #[test]
    fn test_cli_retry_failed_default_limit() {
        let cli = Cli::try_parse_from(["linkrelay", "retry-failed"]).unwrap();
        let Command::RetryFailed(args) = cli.command else {
            panic!("expected retry-failed");
        };
        assert_eq!(args.limit, 50);
    }

    #[test]
    fn test_cli_requires_subcommand() {
        let err = Cli::try_parse_from(["linkrelay"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Cli::try_parse_from(["linkrelay", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
