//! Batch input documents.
//!
//! A batch is either a bare JSON array of link strings or an object with a
//! `links` array. Entries are trimmed and blank entries dropped; repeated
//! links are kept so the pipeline can report them as duplicates.

use serde_json::Value;
use tracing::debug;

use super::error::ParseError;

/// Parses a batch document into its ordered list of links.
///
/// # Errors
///
/// Returns [`ParseError`] when the document is not JSON, has another shape,
/// or contains non-string entries.
///
/// # Examples
///
/// ```
/// use linkrelay_core::parser::parse_batch_input;
///
/// let links = parse_batch_input(r#"{"links": ["https://terabox.com/s/1", " "]}"#).unwrap();
/// assert_eq!(links, vec!["https://terabox.com/s/1".to_string()]);
/// ```
pub fn parse_batch_input(raw: &str) -> Result<Vec<String>, ParseError> {
    let document: Value =
        serde_json::from_str(raw).map_err(|e| ParseError::invalid_json(&e.to_string()))?;

    let entries = match document {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("links") {
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                return Err(ParseError::unexpected_shape(&format!(
                    "`links` is {}",
                    describe(&other)
                )));
            }
            None => return Err(ParseError::unexpected_shape("object without `links`")),
        },
        other => return Err(ParseError::unexpected_shape(describe(&other))),
    };

    let mut links = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let Value::String(link) = entry else {
            return Err(ParseError::NonStringEntry { index });
        };
        let trimmed = link.trim();
        if !trimmed.is_empty() {
            links.push(trimmed.to_string());
        }
    }

    debug!(count = links.len(), "batch input parsed");
    Ok(links)
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_array() {
        let links = parse_batch_input(r#"["https://terabox.com/s/1", "https://terabox.com/s/2"]"#)
            .unwrap();
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn test_parse_object_with_links() {
        let links = parse_batch_input(r#"{"links": ["  https://terabox.com/s/1  "]}"#).unwrap();
        assert_eq!(links, vec!["https://terabox.com/s/1"]);
    }

    #[test]
    fn test_parse_keeps_repeats_and_drops_blanks() {
        let links = parse_batch_input(r#"["a", "", "a", "   "]"#).unwrap();
        assert_eq!(links, vec!["a", "a"]);
    }

    #[test]
    fn test_parse_empty_array() {
        assert!(parse_batch_input("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let err = parse_batch_input("not json").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson { .. }));
    }

    #[test]
    fn test_parse_rejects_scalar_document() {
        let err = parse_batch_input("42").unwrap_err();
        assert!(err.to_string().contains("a number"));
    }

    #[test]
    fn test_parse_rejects_object_without_links() {
        let err = parse_batch_input(r#"{"urls": []}"#).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedShape { .. }));
    }

    #[test]
    fn test_parse_rejects_non_string_entry() {
        let err = parse_batch_input(r#"["a", 7]"#).unwrap_err();
        assert!(matches!(err, ParseError::NonStringEntry { index: 1 }));
    }
}
