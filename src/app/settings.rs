//! Merges CLI flags, the config file and built-in defaults into run settings.
//!
//! Precedence: CLI flag > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use linkrelay_core::config::{FileConfig, default_database_path};
use linkrelay_core::dedup::DEFAULT_NAMESPACE;
use linkrelay_core::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use linkrelay_core::pipeline::StatusCadence;
use linkrelay_core::resolver::BYTES_PER_MB;
use linkrelay_core::{Destinations, PipelineConfig};

use crate::cli::PipelineArgs;

const DEFAULT_RESOLVER_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RESOLVER_READ_TIMEOUT_SECS: u64 = 30;

/// HTTP client timeouts in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HttpTimeoutSettings {
    pub(crate) download_connect_secs: u64,
    pub(crate) download_read_secs: u64,
    pub(crate) resolver_connect_secs: u64,
    pub(crate) resolver_read_secs: u64,
}

impl Default for HttpTimeoutSettings {
    fn default() -> Self {
        Self {
            download_connect_secs: CONNECT_TIMEOUT_SECS,
            download_read_secs: READ_TIMEOUT_SECS,
            resolver_connect_secs: DEFAULT_RESOLVER_CONNECT_TIMEOUT_SECS,
            resolver_read_secs: DEFAULT_RESOLVER_READ_TIMEOUT_SECS,
        }
    }
}

pub(crate) fn resolve_http_timeouts(file_config: Option<&FileConfig>) -> HttpTimeoutSettings {
    let mut timeouts = HttpTimeoutSettings::default();
    let Some(config) = file_config else {
        return timeouts;
    };
    if let Some(v) = config.download_connect_timeout_secs {
        timeouts.download_connect_secs = v;
    }
    if let Some(v) = config.download_read_timeout_secs {
        timeouts.download_read_secs = v;
    }
    if let Some(v) = config.resolver_connect_timeout_secs {
        timeouts.resolver_connect_secs = v;
    }
    if let Some(v) = config.resolver_read_timeout_secs {
        timeouts.resolver_read_secs = v;
    }
    timeouts
}

/// Database location and dedup namespace, needed by every subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StateSettings {
    pub(crate) database_path: PathBuf,
    pub(crate) dedup_namespace: String,
}

pub(crate) fn resolve_state_settings(
    cli_db: Option<&PathBuf>,
    file_config: Option<&FileConfig>,
) -> StateSettings {
    let database_path = cli_db
        .cloned()
        .or_else(|| file_config.and_then(|c| c.database_path.clone()))
        .unwrap_or_else(default_database_path);
    let dedup_namespace = file_config
        .and_then(|c| c.dedup_namespace.clone())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    StateSettings {
        database_path,
        dedup_namespace,
    }
}

/// Everything `run` and `retry-failed` need to build a pipeline.
#[derive(Debug, Clone)]
pub(crate) struct RunSettings {
    pub(crate) pipeline: PipelineConfig,
    pub(crate) resolver_base: String,
    pub(crate) output_root: PathBuf,
    pub(crate) keep_staged: bool,
    pub(crate) show_progress: bool,
    pub(crate) http_timeouts: HttpTimeoutSettings,
}

pub(crate) fn resolve_run_settings(
    args: &PipelineArgs,
    file_config: Option<&FileConfig>,
) -> Result<RunSettings> {
    let empty = FileConfig::default();
    let file = file_config.unwrap_or(&empty);
    let mut pipeline = PipelineConfig::default();

    let Some(resolver_base) = args
        .resolver_base
        .clone()
        .or_else(|| file.resolver_base.clone())
    else {
        bail!(
            "No metadata service configured.\n  \
             Pass --resolver-base URL or set `resolver_base` in the config file."
        );
    };

    if let Some(concurrency) = args.concurrency.map(usize::from).or(file.concurrency) {
        pipeline.concurrency = concurrency;
    }
    if let Some(mb) = args.max_size_mb.or(file.max_file_size_mb) {
        pipeline.max_file_size = mb
            .checked_mul(BYTES_PER_MB)
            .context("max file size is too large")?;
    }
    if let Some(ceiling) = file.retry_ceiling {
        pipeline.retry_ceiling = ceiling;
    }
    if let Some(attempts) = file.transfer_attempts {
        pipeline.transfer_attempts = attempts;
    }
    if let Some(secs) = file.resolve_timeout_secs {
        pipeline.resolve_timeout = Duration::from_secs(secs);
    }
    if let Some(dir) = args.staging_dir.clone().or_else(|| file.staging_dir.clone()) {
        pipeline.staging_dir = dir;
    }

    let primary = args
        .dest
        .clone()
        .or_else(|| file.primary_destination.clone())
        .unwrap_or_else(|| pipeline.destinations.primary.clone());
    let broadcast = if args.broadcast.is_empty() {
        file.broadcast_destinations.clone().unwrap_or_default()
    } else {
        args.broadcast.clone()
    };
    pipeline.destinations = Destinations { primary, broadcast };

    let mut cadence = StatusCadence::default();
    if let Some(every) = file.status_every {
        cadence.every = every;
    }
    if let Some(secs) = file.status_interval_secs {
        cadence.interval = Duration::from_secs(secs);
    }
    pipeline.status = cadence;

    pipeline.allow_duplicates = args.allow_duplicates || file.allow_duplicates.unwrap_or(false);
    pipeline
        .validate()
        .context("Invalid pipeline settings")?;

    Ok(RunSettings {
        pipeline,
        resolver_base,
        output_root: args
            .output_root
            .clone()
            .or_else(|| file.output_root.clone())
            .unwrap_or_else(|| PathBuf::from(".")),
        keep_staged: args.keep_staged || file.keep_staged.unwrap_or(false),
        show_progress: !args.no_progress,
        http_timeouts: resolve_http_timeouts(Some(file)),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args_with_base() -> PipelineArgs {
        PipelineArgs {
            resolver_base: Some("http://127.0.0.1:9/api".to_string()),
            ..PipelineArgs::default()
        }
    }

    #[test]
    fn test_defaults_without_config() {
        let settings = resolve_run_settings(&args_with_base(), None).unwrap();
        assert_eq!(settings.pipeline.concurrency, 5);
        assert_eq!(settings.pipeline.max_file_size, 50 * BYTES_PER_MB);
        assert_eq!(settings.pipeline.destinations.primary, "delivered");
        assert!(settings.pipeline.destinations.broadcast.is_empty());
        assert_eq!(settings.http_timeouts, HttpTimeoutSettings::default());
        assert!(settings.show_progress);
    }

    #[test]
    fn test_missing_resolver_base_is_an_error() {
        let err = resolve_run_settings(&PipelineArgs::default(), None).unwrap_err();
        assert!(err.to_string().contains("--resolver-base"), "{err}");
    }

    #[test]
    fn test_file_values_apply_when_cli_is_silent() {
        let file = FileConfig {
            resolver_base: Some("https://api.example.com/resolve".to_string()),
            concurrency: Some(9),
            max_file_size_mb: Some(2),
            primary_destination: Some("inbox".to_string()),
            broadcast_destinations: Some(vec!["m1".to_string()]),
            status_every: Some(2),
            download_read_timeout_secs: Some(60),
            ..FileConfig::default()
        };
        let settings = resolve_run_settings(&PipelineArgs::default(), Some(&file)).unwrap();
        assert_eq!(settings.resolver_base, "https://api.example.com/resolve");
        assert_eq!(settings.pipeline.concurrency, 9);
        assert_eq!(settings.pipeline.max_file_size, 2 * BYTES_PER_MB);
        assert_eq!(settings.pipeline.destinations.primary, "inbox");
        assert_eq!(settings.pipeline.destinations.broadcast, vec!["m1"]);
        assert_eq!(settings.pipeline.status.every, 2);
        assert_eq!(settings.http_timeouts.download_read_secs, 60);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = FileConfig {
            concurrency: Some(9),
            primary_destination: Some("inbox".to_string()),
            broadcast_destinations: Some(vec!["m1".to_string()]),
            ..FileConfig::default()
        };
        let args = PipelineArgs {
            concurrency: Some(2),
            dest: Some("elsewhere".to_string()),
            broadcast: vec!["m2".to_string(), "m3".to_string()],
            no_progress: true,
            ..args_with_base()
        };
        let settings = resolve_run_settings(&args, Some(&file)).unwrap();
        assert_eq!(settings.pipeline.concurrency, 2);
        assert_eq!(settings.pipeline.destinations.primary, "elsewhere");
        assert_eq!(settings.pipeline.destinations.broadcast, vec!["m2", "m3"]);
        assert!(!settings.show_progress);
    }

    #[test]
    fn test_state_settings_precedence() {
        let file = FileConfig {
            database_path: Some(PathBuf::from("/from/file.db")),
            dedup_namespace: Some("ns".to_string()),
            ..FileConfig::default()
        };
        let cli_db = PathBuf::from("/from/cli.db");
        let state = resolve_state_settings(Some(&cli_db), Some(&file));
        assert_eq!(state.database_path, cli_db);
        assert_eq!(state.dedup_namespace, "ns");

        let state = resolve_state_settings(None, Some(&file));
        assert_eq!(state.database_path, PathBuf::from("/from/file.db"));
    }
}
