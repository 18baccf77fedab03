//! TOML file configuration.
//!
//! The file lives at `$XDG_CONFIG_HOME/linkrelay/config.toml`, falling back
//! to `$HOME/.config/linkrelay/config.toml`. Every key is optional; CLI flags
//! override file values and file values override built-in defaults.
//!
//! ```toml
//! resolver_base = "https://api.example.com/resolve"
//! concurrency = 5
//! max_file_size_mb = 50
//! primary_destination = "inbox"
//! broadcast_destinations = ["mirror-a", "mirror-b"]
//! ```

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::pipeline::{MAX_CONCURRENCY, MIN_CONCURRENCY};

const APP_DIR: &str = "linkrelay";
const CONFIG_FILE: &str = "config.toml";

/// Errors from loading or validating the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Config path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Config path.
        path: PathBuf,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside its accepted range.
    #[error("invalid config value for `{field}`: {value}. Expected {expected}")]
    InvalidValue {
        /// Offending key.
        field: &'static str,
        /// Offending value.
        value: String,
        /// What is accepted.
        expected: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, value: impl ToString, expected: &'static str) -> Self {
        Self::InvalidValue {
            field,
            value: value.to_string(),
            expected,
        }
    }
}

/// Values read from the config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Metadata service endpoint.
    pub resolver_base: Option<String>,
    /// Concurrent transfers.
    pub concurrency: Option<usize>,
    /// Size cap in MiB.
    pub max_file_size_mb: Option<u64>,
    /// Transfer rounds per file.
    pub retry_ceiling: Option<u32>,
    /// HTTP attempts per transfer round.
    pub transfer_attempts: Option<u32>,
    /// Staging directory.
    pub staging_dir: Option<PathBuf>,
    /// Primary destination identifier.
    pub primary_destination: Option<String>,
    /// Broadcast destination identifiers.
    pub broadcast_destinations: Option<Vec<String>>,
    /// Root directory destinations are resolved against.
    pub output_root: Option<PathBuf>,
    /// `SQLite` database path.
    pub database_path: Option<PathBuf>,
    /// Dedup namespace.
    pub dedup_namespace: Option<String>,
    /// Skip the persistent dedup check.
    pub allow_duplicates: Option<bool>,
    /// Keep staged files after upload.
    pub keep_staged: Option<bool>,
    /// Publish progress every N finished jobs.
    pub status_every: Option<usize>,
    /// Publish progress at least every N seconds.
    pub status_interval_secs: Option<u64>,
    /// Metadata request timeout in seconds.
    pub resolve_timeout_secs: Option<u64>,
    /// Transfer connect timeout in seconds.
    pub download_connect_timeout_secs: Option<u64>,
    /// Transfer read timeout in seconds.
    pub download_read_timeout_secs: Option<u64>,
    /// Resolver connect timeout in seconds.
    pub resolver_connect_timeout_secs: Option<u64>,
    /// Resolver read timeout in seconds.
    pub resolver_read_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::InvalidValue`].
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(concurrency) = self.concurrency
            && !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency)
        {
            return Err(ConfigError::invalid("concurrency", concurrency, "range 1..=100"));
        }
        if let Some(mb) = self.max_file_size_mb
            && mb == 0
        {
            return Err(ConfigError::invalid("max_file_size_mb", mb, "at least 1"));
        }
        validate_count("retry_ceiling", self.retry_ceiling)?;
        validate_count("transfer_attempts", self.transfer_attempts)?;
        if let Some(every) = self.status_every
            && every == 0
        {
            return Err(ConfigError::invalid("status_every", every, "at least 1"));
        }
        for (field, value) in [
            ("status_interval_secs", self.status_interval_secs),
            ("resolve_timeout_secs", self.resolve_timeout_secs),
            ("download_connect_timeout_secs", self.download_connect_timeout_secs),
            ("download_read_timeout_secs", self.download_read_timeout_secs),
            ("resolver_connect_timeout_secs", self.resolver_connect_timeout_secs),
            ("resolver_read_timeout_secs", self.resolver_read_timeout_secs),
        ] {
            validate_timeout_secs(field, value)?;
        }
        if let Some(base) = &self.resolver_base
            && !(base.starts_with("http://") || base.starts_with("https://"))
        {
            return Err(ConfigError::invalid("resolver_base", base, "an http(s) URL"));
        }
        if let Some(primary) = &self.primary_destination
            && primary.trim().is_empty()
        {
            return Err(ConfigError::invalid(
                "primary_destination",
                "\"\"",
                "a non-empty identifier",
            ));
        }
        Ok(())
    }
}

fn validate_count(field: &'static str, value: Option<u32>) -> Result<(), ConfigError> {
    match value {
        Some(v) if !(1..=20).contains(&v) => Err(ConfigError::invalid(field, v, "range 1..=20")),
        _ => Ok(()),
    }
}

fn validate_timeout_secs(field: &'static str, value: Option<u64>) -> Result<(), ConfigError> {
    match value {
        Some(v) if !(1..=3600).contains(&v) => {
            Err(ConfigError::invalid(field, v, "range 1..=3600"))
        }
        _ => Ok(()),
    }
}

/// Loaded config and where it came from.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Path that was checked, if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed config when the file exists.
    pub config: Option<FileConfig>,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/linkrelay/config.toml`
/// 2. `$HOME/.config/linkrelay/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join(APP_DIR).join(CONFIG_FILE));
    }
    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILE),
    )
}

/// Default location of the `SQLite` database, next to the config file.
#[must_use]
pub fn default_database_path() -> PathBuf {
    resolve_default_config_path()
        .and_then(|p| p.parent().map(|dir| dir.join("linkrelay.db")))
        .unwrap_or_else(|| PathBuf::from("linkrelay.db"))
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config at `path`, or the default path when `None`.
///
/// A missing default file is not an error; a missing explicit file is.
///
/// # Errors
///
/// Returns [`ConfigError`] when reading, parsing or validation fails.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let (path, explicit) = match path {
        Some(p) => (Some(p.to_path_buf()), true),
        None => (resolve_default_config_path(), false),
    };
    let Some(path_ref) = path.as_deref() else {
        return Ok(LoadedConfig::default());
    };
    if !explicit && !path_ref.exists() {
        debug!(path = %path_ref.display(), "no config file");
        return Ok(LoadedConfig { path, config: None });
    }

    let raw = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    let config = FileConfig::from_toml_str(&raw, path_ref)?;
    debug!(path = %path_ref.display(), "loaded config file");
    Ok(LoadedConfig {
        path,
        config: Some(config),
    })
}
