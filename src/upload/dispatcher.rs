//! Fan-out of a staged file to primary and broadcast destinations.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::{UploadError, UploadSink};
use crate::download::remove_if_exists;
use crate::resolver::FileDescriptor;

/// Where delivered files go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destinations {
    /// Destination whose result decides the file's outcome.
    pub primary: String,
    /// Additional best-effort destinations.
    pub broadcast: Vec<String>,
}

impl Destinations {
    /// Destinations with only a primary target.
    #[must_use]
    pub fn primary_only(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            broadcast: Vec::new(),
        }
    }
}

/// Result of one dispatch.
#[derive(Debug)]
pub struct UploadOutcome {
    /// Receipt from the primary destination, or why it failed.
    pub primary: Result<String, UploadError>,
    /// Broadcast destinations that accepted the file.
    pub broadcast_delivered: usize,
    /// `destination: error` for every failed broadcast.
    pub broadcast_failures: Vec<String>,
    /// Whether the staged file was deleted.
    pub staged_removed: bool,
}

impl UploadOutcome {
    /// Whether the primary destination accepted the file.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.primary.is_ok()
    }
}

/// Sends staged files through an [`UploadSink`].
#[derive(Clone)]
pub struct UploadDispatcher {
    sink: Arc<dyn UploadSink>,
    keep_staged: bool,
    broadcast_media_only: bool,
}

impl std::fmt::Debug for UploadDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadDispatcher")
            .field("keep_staged", &self.keep_staged)
            .field("broadcast_media_only", &self.broadcast_media_only)
            .finish_non_exhaustive()
    }
}

impl UploadDispatcher {
    /// Creates a dispatcher that deletes staged files and broadcasts media only.
    #[must_use]
    pub fn new(sink: Arc<dyn UploadSink>) -> Self {
        Self {
            sink,
            keep_staged: false,
            broadcast_media_only: true,
        }
    }

    /// Keeps staged files after delivery.
    #[must_use]
    pub fn keep_staged(mut self, keep: bool) -> Self {
        self.keep_staged = keep;
        self
    }

    /// Controls whether documents are broadcast too.
    #[must_use]
    pub fn broadcast_media_only(mut self, media_only: bool) -> Self {
        self.broadcast_media_only = media_only;
        self
    }

    /// Delivers the staged file for `descriptor` and removes the staged copy.
    ///
    /// Every eligible destination is attempted even when earlier ones fail.
    #[instrument(skip(self, descriptor, destinations), fields(file = %descriptor.name, kind = descriptor.kind.as_str()))]
    pub async fn upload(
        &self,
        staging_path: &Path,
        descriptor: &FileDescriptor,
        destinations: &Destinations,
    ) -> UploadOutcome {
        let kind = descriptor.kind;
        let primary = self
            .sink
            .send_media(staging_path, kind, &destinations.primary)
            .await;
        if let Err(e) = &primary {
            warn!(destination = %destinations.primary, error = %e, "primary delivery failed");
        }

        let mut broadcast_delivered = 0;
        let mut broadcast_failures = Vec::new();
        let staged_missing = matches!(primary, Err(UploadError::StagedFile { .. }));
        let broadcast_eligible = !self.broadcast_media_only || kind.is_streamable();

        if broadcast_eligible && !staged_missing {
            for destination in &destinations.broadcast {
                match self.sink.send_media(staging_path, kind, destination).await {
                    Ok(receipt) => {
                        debug!(destination = %destination, receipt = %receipt, "broadcast delivered");
                        broadcast_delivered += 1;
                    }
                    Err(e) => {
                        warn!(destination = %destination, error = %e, "broadcast delivery failed");
                        broadcast_failures.push(format!("{destination}: {e}"));
                    }
                }
            }
        } else if !destinations.broadcast.is_empty() {
            debug!("skipping broadcast for this file");
        }

        let staged_removed = if self.keep_staged {
            false
        } else {
            match remove_if_exists(staging_path).await {
                Ok(removed) => removed,
                Err(e) => {
                    warn!(path = %staging_path.display(), error = %e, "failed to remove staged file");
                    false
                }
            }
        };

        if primary.is_ok() {
            info!(broadcast_delivered, "file delivered");
        }

        UploadOutcome {
            primary,
            broadcast_delivered,
            broadcast_failures,
            staged_removed,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::resolver::MediaKind;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(String, MediaKind)>>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl UploadSink for RecordingSink {
        async fn send_media(
            &self,
            _path: &Path,
            kind: MediaKind,
            destination: &str,
        ) -> Result<String, UploadError> {
            self.calls
                .lock()
                .unwrap()
                .push((destination.to_string(), kind));
            if self.failing.iter().any(|d| d == destination) {
                Err(UploadError::delivery(destination, "refused"))
            } else {
                Ok(format!("{destination}#1"))
            }
        }
    }

    fn descriptor(name: &str, kind: MediaKind) -> FileDescriptor {
        FileDescriptor {
            name: name.into(),
            size_bytes: 3,
            kind,
            transfer_url: "https://cdn/x".into(),
            source_link: "https://terabox.com/s/1".into(),
        }
    }

    fn destinations() -> Destinations {
        Destinations {
            primary: "main".into(),
            broadcast: vec!["b1".into(), "b2".into()],
        }
    }

    #[tokio::test]
    async fn test_video_goes_everywhere_and_staged_is_removed() {
        let dir = TempDir::new().unwrap();
        let staged = dir.path().join("clip.mp4");
        std::fs::write(&staged, b"abc").unwrap();
        let sink = Arc::new(RecordingSink::default());

        let outcome = UploadDispatcher::new(sink.clone())
            .upload(&staged, &descriptor("clip.mp4", MediaKind::Video), &destinations())
            .await;

        assert!(outcome.is_delivered());
        assert_eq!(outcome.broadcast_delivered, 2);
        assert!(outcome.staged_removed);
        assert!(!staged.exists());
        assert_eq!(sink.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_documents_skip_broadcast_by_default() {
        let dir = TempDir::new().unwrap();
        let staged = dir.path().join("a.pdf");
        std::fs::write(&staged, b"abc").unwrap();
        let sink = Arc::new(RecordingSink::default());

        let outcome = UploadDispatcher::new(sink.clone())
            .upload(&staged, &descriptor("a.pdf", MediaKind::Document), &destinations())
            .await;

        assert!(outcome.is_delivered());
        assert_eq!(outcome.broadcast_delivered, 0);
        assert_eq!(sink.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_failure_does_not_fail_primary() {
        let dir = TempDir::new().unwrap();
        let staged = dir.path().join("clip.mp4");
        std::fs::write(&staged, b"abc").unwrap();
        let sink = Arc::new(RecordingSink {
            failing: vec!["b1".into()],
            ..RecordingSink::default()
        });

        let outcome = UploadDispatcher::new(sink)
            .upload(&staged, &descriptor("clip.mp4", MediaKind::Video), &destinations())
            .await;

        assert!(outcome.is_delivered());
        assert_eq!(outcome.broadcast_delivered, 1);
        assert_eq!(outcome.broadcast_failures.len(), 1);
        assert!(outcome.broadcast_failures[0].starts_with("b1:"));
    }

    #[tokio::test]
    async fn test_primary_failure_still_attempts_broadcast_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let staged = dir.path().join("clip.mp4");
        std::fs::write(&staged, b"abc").unwrap();
        let sink = Arc::new(RecordingSink {
            failing: vec!["main".into()],
            ..RecordingSink::default()
        });

        let outcome = UploadDispatcher::new(sink.clone())
            .upload(&staged, &descriptor("clip.mp4", MediaKind::Video), &destinations())
            .await;

        assert!(!outcome.is_delivered());
        assert_eq!(outcome.broadcast_delivered, 2);
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_keep_staged() {
        let dir = TempDir::new().unwrap();
        let staged = dir.path().join("a.pdf");
        std::fs::write(&staged, b"abc").unwrap();

        let outcome = UploadDispatcher::new(Arc::new(RecordingSink::default()))
            .keep_staged(true)
            .upload(
                &staged,
                &descriptor("a.pdf", MediaKind::Document),
                &Destinations::primary_only("main"),
            )
            .await;

        assert!(!outcome.staged_removed);
        assert!(staged.exists());
    }
}
