//! Link to file-descriptor resolution.
//!
//! A [`MetadataResolver`] turns one link into zero or more typed
//! [`FileDescriptor`]s. Transfer URLs expire, so resolvers also support
//! re-resolving a single file by name to obtain a fresh URL.
//!
//! # Example
//!
//! ```no_run
//! use linkrelay_core::resolver::{HttpMetadataResolver, MetadataResolver};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = HttpMetadataResolver::new("https://api.example.com/resolve")?;
//! for file in resolver.resolve("https://terabox.com/s/1abc").await? {
//!     println!("{} ({} bytes)", file.name, file.size_bytes);
//! }
//! # Ok(())
//! # }
//! ```

mod descriptor;
mod error;
mod http;

use async_trait::async_trait;

pub use descriptor::{BYTES_PER_MB, FileDescriptor, MediaKind, VIDEO_EXTENSIONS, mb_to_bytes};
pub use error::ResolveError;
pub use http::HttpMetadataResolver;

/// Resolves links to file descriptors.
///
/// Implementations must be idempotent: resolving the same link twice yields
/// equivalent descriptors (transfer URLs may differ).
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Resolves `link` to its files. An empty result is not an error.
    async fn resolve(&self, link: &str) -> Result<Vec<FileDescriptor>, ResolveError>;

    /// Resolves `link` again and returns the file named `file_name`, if present.
    async fn reresolve(
        &self,
        link: &str,
        file_name: &str,
    ) -> Result<Option<FileDescriptor>, ResolveError> {
        Ok(self
            .resolve(link)
            .await?
            .into_iter()
            .find(|file| file.name == file_name))
    }
}
