//! CLI command handlers.

mod dedup;
mod extract;
mod retry_failed;
mod run;
mod stats;

pub use dedup::run_dedup_command;
pub use extract::run_extract_command;
pub use retry_failed::run_retry_failed_command;
pub use run::run_run_command;
pub use stats::run_stats_command;
