//! Error types for upload delivery.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while delivering a staged file.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The staged file is missing or unreadable.
    #[error("staged file {path} is not readable: {source}")]
    StagedFile {
        /// Staging path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The destination refused or failed the delivery.
    #[error("delivery to {destination} failed: {reason}")]
    Delivery {
        /// Destination identifier.
        destination: String,
        /// What went wrong.
        reason: String,
    },

    /// The destination does not exist or cannot be written.
    #[error("destination {destination} is unavailable: {reason}")]
    DestinationUnavailable {
        /// Destination identifier.
        destination: String,
        /// What went wrong.
        reason: String,
    },
}

impl UploadError {
    /// Creates a staged-file error.
    pub fn staged_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StagedFile {
            path: path.into(),
            source,
        }
    }

    /// Creates a delivery error.
    pub fn delivery(destination: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Delivery {
            destination: destination.into(),
            reason: reason.into(),
        }
    }

    /// Creates a destination-unavailable error.
    pub fn destination_unavailable(
        destination: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::DestinationUnavailable {
            destination: destination.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_display_names_destination() {
        let msg = UploadError::delivery("archive", "quota exceeded").to_string();
        assert!(msg.contains("archive"));
        assert!(msg.contains("quota exceeded"));
    }
}
