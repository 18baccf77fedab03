//! Delivery of staged files to their destinations.
//!
//! An [`UploadSink`] knows how to send one file to one destination. The
//! [`UploadDispatcher`] fans a staged file out to the primary destination and
//! any broadcast destinations, then removes the staged copy.

mod directory;
mod dispatcher;
mod error;

use std::path::Path;

use async_trait::async_trait;

pub use directory::DirectorySink;
pub use dispatcher::{Destinations, UploadDispatcher, UploadOutcome};
pub use error::UploadError;

use crate::resolver::MediaKind;

/// Sends a staged file to a destination.
#[async_trait]
pub trait UploadSink: Send + Sync {
    /// Delivers `path` to `destination`, as streamable media when `kind` is
    /// [`MediaKind::Video`] and as a document otherwise.
    ///
    /// Returns a receipt identifying the delivered copy.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError`] when the delivery fails.
    async fn send_media(
        &self,
        path: &Path,
        kind: MediaKind,
        destination: &str,
    ) -> Result<String, UploadError>;
}
