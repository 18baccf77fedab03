//! Assembly of input text from positional arguments, stdin or a batch file.

use std::io::{self, IsTerminal, Read};
use std::path::Path;

use anyhow::{Context, Result};
use linkrelay_core::{extract_links, parse_batch_input};

/// Joins positional text, falling back to piped stdin.
///
/// Returns `None` when there is no positional text and stdin is a terminal or
/// empty.
pub(crate) fn read_text_input(text: &[String]) -> Result<Option<String>> {
    if !text.is_empty() {
        return Ok(Some(text.join("\n")));
    }
    if io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read stdin")?;
    Ok(if buffer.trim().is_empty() {
        None
    } else {
        Some(buffer)
    })
}

/// Links in a document: a JSON batch when it looks like one, else free text.
pub(crate) fn links_from_document(raw: &str) -> Result<Vec<String>> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        Ok(parse_batch_input(raw)?)
    } else {
        Ok(extract_links(raw))
    }
}

pub(crate) fn read_batch_file(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read batch file '{}'", path.display()))?;
    parse_batch_input(&raw).with_context(|| format!("invalid batch file '{}'", path.display()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_text_wins() {
        let text = vec!["a".to_string(), "b".to_string()];
        assert_eq!(read_text_input(&text).unwrap().as_deref(), Some("a\nb"));
    }

    #[test]
    fn test_links_from_json_document() {
        let links =
            links_from_document(r#"["https://terabox.com/s/1a", "https://terabox.com/s/1b"]"#)
                .unwrap();
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn test_links_from_free_text() {
        let links = links_from_document("first https://terabox.com/s/1a\nnothing here").unwrap();
        assert_eq!(links, vec!["https://terabox.com/s/1a"]);
    }

    #[test]
    fn test_read_batch_file_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(&path, "not json").unwrap();
        let err = read_batch_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("batch.json"));
    }
}
