//! Link extraction and normalization from chat text.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace};
use url::Url;

use super::error::MAX_LINK_LENGTH;

/// Host families recognized by default.
pub const DEFAULT_HOST_FAMILIES: &[&str] = &[
    "terabox",
    "teraboxapp",
    "teraboxshare",
    "nephobox",
    "1024tera",
    "1024terabox",
    "freeterabox",
    "terasharefile",
    "terasharelink",
    "mirrobox",
    "momerybox",
    "teraboxlink",
    "teraboxurl",
];

/// Candidate pattern: scheme followed by anything up to whitespace or a delimiter.
#[allow(clippy::expect_used)]
static CANDIDATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s<>"'\]]+"#).expect("link regex is valid") // Static pattern, safe to panic
});

/// Extracts recognized hosted-file links from free text.
///
/// Extraction is deterministic and order-preserving. Host matching is
/// case-insensitive; the returned links keep the spelling found in the input.
/// Two spellings with the same [`normalize_link`] form are reported once,
/// first occurrence wins.
///
/// # Examples
///
/// ```
/// use linkrelay_core::parser::LinkExtractor;
///
/// let links = LinkExtractor::default()
///     .extract("grab https://www.TeraBox.com/s/1abc and https://example.com/x");
/// assert_eq!(links, vec!["https://www.TeraBox.com/s/1abc".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    hosts: Vec<String>,
}

impl Default for LinkExtractor {
    fn default() -> Self {
        Self::with_hosts(DEFAULT_HOST_FAMILIES.iter().copied())
    }
}

impl LinkExtractor {
    /// Creates an extractor for a custom set of host families.
    ///
    /// A family matches when the link's host contains `{family}.`, so
    /// `terabox` matches `www.terabox.com` and `1024terabox.com`.
    #[must_use]
    pub fn with_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|h| h.as_ref().trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        Self { hosts }
    }

    /// Returns the configured host families.
    #[must_use]
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Scans `text` and returns the recognized links in input order.
    #[tracing::instrument(skip(self, text), fields(input_len = text.len()))]
    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for candidate in CANDIDATE_PATTERN.find_iter(text) {
            let cleaned = clean_link_trailing(candidate.as_str());
            trace!(link = %cleaned, "found link candidate");

            if !self.is_recognized(cleaned) {
                continue;
            }
            if seen.insert(normalize_link(cleaned)) {
                links.push(cleaned.to_string());
            } else {
                debug!(link = %cleaned, "dropping repeated link");
            }
        }

        debug!(count = links.len(), "links extracted");
        links
    }

    /// Returns true when `candidate` is a well-formed http(s) link whose host
    /// belongs to one of the configured families.
    #[must_use]
    pub fn is_recognized(&self, candidate: &str) -> bool {
        if candidate.len() > MAX_LINK_LENGTH {
            trace!(length = candidate.len(), "candidate exceeds max length");
            return false;
        }
        let Ok(parsed) = Url::parse(candidate) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.hosts
            .iter()
            .any(|family| host.contains(&format!("{family}.")))
    }
}

/// Extracts links with the default host families.
#[must_use]
pub fn extract_links(text: &str) -> Vec<String> {
    LinkExtractor::default().extract(text)
}

/// Returns the dedup key for a link: trimmed, trailing slashes removed, lower-cased.
#[must_use]
pub fn normalize_link(link: &str) -> String {
    link.trim().trim_end_matches('/').to_lowercase()
}

/// Strips trailing sentence punctuation and unbalanced closers.
fn clean_link_trailing(link: &str) -> &str {
    let mut result = link;

    while let Some(last) = result.chars().last() {
        match last {
            '.' | ',' | ';' | ':' | '!' | '?' => {
                result = &result[..result.len() - 1];
            }
            ')' | ']' => {
                let open = if last == ')' { '(' } else { '[' };
                let open_count = result.chars().filter(|&c| c == open).count();
                let close_count = result.chars().filter(|&c| c == last).count();
                if close_count > open_count {
                    result = &result[..result.len() - 1];
                } else {
                    break;
                }
            }
            _ => break,
        }
    }

    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_empty_input_returns_empty() {
        assert!(extract_links("").is_empty());
        assert!(extract_links("   \n\t").is_empty());
    }

    #[test]
    fn test_extract_single_link() {
        let links = extract_links("https://terabox.com/s/1abcDEF");
        assert_eq!(links, vec!["https://terabox.com/s/1abcDEF"]);
    }

    #[test]
    fn test_extract_preserves_order_across_families() {
        let text = "first https://www.1024tera.com/s/1 then \
                    http://teraboxapp.com/s/2 and last https://nephobox.com/s/3";
        let links = extract_links(text);
        assert_eq!(
            links,
            vec![
                "https://www.1024tera.com/s/1",
                "http://teraboxapp.com/s/2",
                "https://nephobox.com/s/3",
            ]
        );
    }

    #[test]
    fn test_extract_host_match_is_case_insensitive() {
        let links = extract_links("HTTPS://WWW.TERABOX.COM/s/1XyZ");
        assert_eq!(links, vec!["HTTPS://WWW.TERABOX.COM/s/1XyZ"]);
    }

    #[test]
    fn test_extract_ignores_unrelated_hosts() {
        let links = extract_links("https://example.com/terabox and https://github.com/x");
        assert!(links.is_empty());
    }

    #[test]
    fn test_extract_family_in_path_only_is_ignored() {
        let links = extract_links("https://example.com/terabox.com/s/1");
        assert!(links.is_empty());
    }

    #[test]
    fn test_extract_strips_trailing_punctuation() {
        let links = extract_links("see https://terabox.com/s/1abc. or (https://terabox.com/s/2def)");
        assert_eq!(
            links,
            vec!["https://terabox.com/s/1abc", "https://terabox.com/s/2def"]
        );
    }

    #[test]
    fn test_extract_drops_repeats_first_spelling_wins() {
        let text = "https://terabox.com/s/1ABC/ https://TERABOX.com/s/1abc https://terabox.com/s/1abc";
        let links = extract_links(text);
        assert_eq!(links, vec!["https://terabox.com/s/1ABC/"]);
    }

    #[test]
    fn test_extract_malformed_candidates_do_not_panic() {
        let text = "https:// http://[::1 https://terabox. https://terabox";
        let links = extract_links(text);
        assert!(links.is_empty(), "unexpected links: {links:?}");
    }

    #[test]
    fn test_extract_skips_overlong_candidate() {
        let long = format!("https://terabox.com/s/{}", "a".repeat(MAX_LINK_LENGTH));
        assert!(extract_links(&long).is_empty());
    }

    #[test]
    fn test_with_hosts_custom_family() {
        let extractor = LinkExtractor::with_hosts(["Example"]);
        assert_eq!(extractor.hosts(), ["example".to_string()]);
        let links = extractor.extract("https://files.example.org/a https://terabox.com/s/1");
        assert_eq!(links, vec!["https://files.example.org/a"]);
    }

    #[test]
    fn test_normalize_link() {
        assert_eq!(
            normalize_link("  https://TeraBox.com/s/1AbC//  "),
            "https://terabox.com/s/1abc"
        );
        assert_eq!(normalize_link("https://terabox.com/s/1"), "https://terabox.com/s/1");
    }

    #[test]
    fn test_is_recognized_rejects_other_schemes() {
        let extractor = LinkExtractor::default();
        assert!(!extractor.is_recognized("ftp://terabox.com/s/1"));
        assert!(extractor.is_recognized("https://sub.mirrobox.com/s/1"));
    }
}
