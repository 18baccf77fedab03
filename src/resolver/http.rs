//! JSON metadata service client.
//!
//! Wire format: `GET {base}?url={link}` answers
//! `{ "count": n, "links": [{ "name", "size_mb", "category", "direct_url" }] }`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use super::descriptor::{FileDescriptor, MediaKind, mb_to_bytes};
use super::{MetadataResolver, ResolveError};
use crate::user_agent;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ServiceResponse {
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    links: Option<Vec<ServiceFile>>,
}

#[derive(Debug, Deserialize)]
struct ServiceFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size_mb: Option<Value>,
    #[serde(default)]
    category: Option<Value>,
    #[serde(default)]
    direct_url: Option<String>,
}

/// [`MetadataResolver`] backed by the HTTP metadata service.
#[derive(Debug, Clone)]
pub struct HttpMetadataResolver {
    client: Client,
    base_url: Url,
    read_timeout_secs: u64,
}

impl HttpMetadataResolver {
    /// Creates a resolver for the service at `base_url` with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Client`] when the URL is invalid or the client
    /// cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ResolveError> {
        Self::with_timeouts(base_url, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a resolver with explicit timeouts in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Client`] when the URL is invalid or the client
    /// cannot be built.
    #[instrument(level = "debug")]
    pub fn with_timeouts(
        base_url: &str,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, ResolveError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ResolveError::client(&format!("invalid base URL '{base_url}': {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ResolveError::client(&format!(
                "base URL scheme '{}' is not http(s)",
                base_url.scheme()
            )));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_resolver_user_agent())
            .build()
            .map_err(|e| ResolveError::client(&e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            read_timeout_secs,
        })
    }

    /// Base URL of the metadata service.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request_url(&self, link: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut().append_pair("url", link);
        url
    }
}

#[async_trait]
impl MetadataResolver for HttpMetadataResolver {
    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn resolve(&self, link: &str) -> Result<Vec<FileDescriptor>, ResolveError> {
        let response = self
            .client
            .get(self.request_url(link))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ResolveError::timeout(link, self.read_timeout_secs)
                } else {
                    ResolveError::unreachable(link, &e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::http_status(link, status.as_u16()));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ResolveError::timeout(link, self.read_timeout_secs)
            } else {
                ResolveError::unreachable(link, &e.to_string())
            }
        })?;
        let parsed: ServiceResponse =
            serde_json::from_str(&body).map_err(|e| ResolveError::malformed(link, &e.to_string()))?;

        let descriptors = descriptors_from_response(link, parsed)?;
        debug!(count = descriptors.len(), "link resolved");
        Ok(descriptors)
    }
}

fn descriptors_from_response(
    link: &str,
    response: ServiceResponse,
) -> Result<Vec<FileDescriptor>, ResolveError> {
    let Some(files) = response.links else {
        return Err(ResolveError::malformed(link, "missing `links` array"));
    };
    if let Some(count) = response.count
        && usize::try_from(count).ok() != Some(files.len())
    {
        debug!(count, listed = files.len(), "service count differs from listed files");
    }

    let mut descriptors = Vec::with_capacity(files.len());
    for (index, file) in files.into_iter().enumerate() {
        let Some(transfer_url) = file
            .direct_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
        else {
            warn!(index, name = ?file.name, "dropping file without direct_url");
            continue;
        };

        let name = file
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("file_{}", index + 1));
        let category = file.category.as_ref().and_then(value_as_string);
        let size_bytes = file
            .size_mb
            .as_ref()
            .and_then(value_as_f64)
            .map_or(0, mb_to_bytes);

        descriptors.push(FileDescriptor {
            kind: MediaKind::classify(category.as_deref(), &name),
            name,
            size_bytes,
            transfer_url,
            source_link: link.to_string(),
        });
    }
    Ok(descriptors)
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<Vec<FileDescriptor>, ResolveError> {
        let response: ServiceResponse = serde_json::from_value(value).unwrap();
        descriptors_from_response("https://terabox.com/s/1", response)
    }

    #[test]
    fn test_descriptors_map_fields() {
        let files = parse(json!({
            "count": 2,
            "links": [
                {"name": "a.mp4", "size_mb": 10, "category": "1", "direct_url": "https://cdn/a"},
                {"name": "b.pdf", "size_mb": "1.5", "category": 4, "direct_url": "https://cdn/b"}
            ]
        }))
        .unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].kind, MediaKind::Video);
        assert_eq!(files[0].size_bytes, 10_485_760);
        assert_eq!(files[1].kind, MediaKind::Document);
        assert_eq!(files[1].size_bytes, 1_572_864);
        assert_eq!(files[1].source_link, "https://terabox.com/s/1");
    }

    #[test]
    fn test_descriptors_drop_missing_direct_url() {
        let files = parse(json!({
            "links": [
                {"name": "a.bin", "size_mb": 1},
                {"name": "b.bin", "size_mb": 1, "direct_url": "  "},
                {"size_mb": 1, "direct_url": "https://cdn/c"}
            ]
        }))
        .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "file_3");
    }

    #[test]
    fn test_descriptors_empty_links_is_ok() {
        assert!(parse(json!({"count": 0, "links": []})).unwrap().is_empty());
    }

    #[test]
    fn test_descriptors_missing_links_is_malformed() {
        let err = parse(json!({"error": "bad link"})).unwrap_err();
        assert!(matches!(err, ResolveError::MalformedResponse { .. }));
    }

    #[test]
    fn test_request_url_encodes_link() {
        let resolver = HttpMetadataResolver::new("https://api.example.com/resolve").unwrap();
        let url = resolver.request_url("https://terabox.com/s/1?a=b&c=d");
        assert_eq!(
            url.as_str(),
            "https://api.example.com/resolve?url=https%3A%2F%2Fterabox.com%2Fs%2F1%3Fa%3Db%26c%3Dd"
        );
    }

    #[test]
    fn test_new_rejects_bad_base_url() {
        assert!(matches!(
            HttpMetadataResolver::new("not a url"),
            Err(ResolveError::Client { .. })
        ));
        assert!(matches!(
            HttpMetadataResolver::new("ftp://api.example.com"),
            Err(ResolveError::Client { .. })
        ));
    }
}
