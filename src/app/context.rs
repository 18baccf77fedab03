//! State shared by every subcommand.

use std::sync::Arc;

use anyhow::{Context, Result};
use linkrelay_core::config::FileConfig;
use linkrelay_core::{Database, DedupStore, LoadedConfig, ResultHistory, SqliteKvStore};
use tracing::debug;

use crate::app::settings::{StateSettings, resolve_state_settings};
use crate::cli::Cli;

pub(crate) struct CommandContext {
    pub(crate) quiet: bool,
    pub(crate) loaded_config: LoadedConfig,
    pub(crate) state: StateSettings,
}

impl CommandContext {
    pub(crate) fn new(cli: &Cli, loaded_config: LoadedConfig) -> Self {
        let state = resolve_state_settings(cli.db.as_ref(), loaded_config.config.as_ref());
        Self {
            quiet: cli.quiet,
            loaded_config,
            state,
        }
    }

    pub(crate) fn file_config(&self) -> Option<&FileConfig> {
        self.loaded_config.config.as_ref()
    }

    pub(crate) async fn open_database(&self) -> Result<Database> {
        debug!(path = %self.state.database_path.display(), "opening state database");
        Database::new(&self.state.database_path).await.with_context(|| {
            format!(
                "failed to open state database '{}'",
                self.state.database_path.display()
            )
        })
    }

    pub(crate) fn dedup_store(&self, db: &Database) -> DedupStore {
        DedupStore::new(
            Arc::new(SqliteKvStore::new(db.clone())),
            self.state.dedup_namespace.clone(),
        )
    }

    pub(crate) fn history(db: &Database) -> ResultHistory {
        ResultHistory::new(db.clone())
    }
}
