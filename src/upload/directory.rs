//! Upload sink that copies staged files into local directories.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{UploadError, UploadSink};
use crate::download::{remove_if_exists, resolve_unique_path, staged_display_name};
use crate::resolver::MediaKind;

/// Subdirectory receiving streamable media.
pub const MEDIA_SUBDIR: &str = "media";
/// Subdirectory receiving documents.
pub const DOCUMENTS_SUBDIR: &str = "documents";

/// Treats each destination as a directory and copies files into it.
///
/// Relative destinations are joined onto `root`. Media and documents land in
/// separate subdirectories; existing names get a `_2`, `_3`, ... suffix.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Creates a sink resolving relative destinations against `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory a destination identifier maps to.
    #[must_use]
    pub fn destination_dir(&self, destination: &str) -> PathBuf {
        self.root.join(destination)
    }
}

#[async_trait]
impl UploadSink for DirectorySink {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn send_media(
        &self,
        path: &Path,
        kind: MediaKind,
        destination: &str,
    ) -> Result<String, UploadError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| UploadError::staged_file(path, e))?;
        if !metadata.is_file() {
            return Err(UploadError::staged_file(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        let subdir = if kind.is_streamable() {
            MEDIA_SUBDIR
        } else {
            DOCUMENTS_SUBDIR
        };
        let target_dir = self.destination_dir(destination).join(subdir);
        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|e| UploadError::destination_unavailable(destination, e.to_string()))?;

        let target = resolve_unique_path(&target_dir, &staged_display_name(path), 2);
        if let Err(e) = tokio::fs::copy(path, &target).await {
            let _ = remove_if_exists(&target).await;
            return Err(UploadError::delivery(destination, e.to_string()));
        }

        debug!(target = %target.display(), kind = kind.as_str(), "copied to destination");
        Ok(target.display().to_string())
    }
}
