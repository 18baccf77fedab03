//! Progress bar fed by pipeline snapshots.

use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use linkrelay_core::ProgressSnapshot;
use linkrelay_core::pipeline::{SinkError, StatusSink};

/// Renders [`ProgressSnapshot`]s as an indicatif bar on stderr.
#[derive(Debug)]
pub(crate) struct ProgressBarSink {
    bar: ProgressBar,
}

impl ProgressBarSink {
    pub(crate) fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {bar:30} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    fn render(&self, s: &ProgressSnapshot) {
        self.bar.set_length(s.total as u64);
        self.bar.set_position(s.completed as u64);
        self.bar.set_message(progress_message(s));
    }
}

pub(crate) fn progress_message(s: &ProgressSnapshot) -> String {
    format!(
        "{} downloading, {} uploading, {} queued | {} ok, {} failed",
        s.in_download, s.in_upload, s.queued, s.succeeded, s.failed
    )
}

#[async_trait]
impl StatusSink for ProgressBarSink {
    async fn publish(&self, snapshot: &ProgressSnapshot) -> Result<(), SinkError> {
        self.render(snapshot);
        Ok(())
    }

    async fn finish(&self, snapshot: &ProgressSnapshot) -> Result<(), SinkError> {
        self.render(snapshot);
        self.bar.finish_and_clear();
        Ok(())
    }
}
