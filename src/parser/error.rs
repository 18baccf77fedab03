//! Error types for input parsing operations.

use thiserror::Error;

/// Maximum link length to accept (standard browser limit).
/// Longer candidates are skipped during extraction.
pub const MAX_LINK_LENGTH: usize = 2000;

/// Errors that can occur while parsing batch input documents.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// The batch document is not valid JSON.
    #[error("batch input is not valid JSON: {reason}\n  Suggestion: {suggestion}")]
    InvalidJson {
        /// Parser message.
        reason: String,
        /// How to fix the issue.
        suggestion: String,
    },

    /// The batch document is JSON but not one of the accepted shapes.
    #[error("batch input has unexpected shape: {found}\n  Suggestion: {suggestion}")]
    UnexpectedShape {
        /// Description of what was found instead.
        found: String,
        /// How to fix the issue.
        suggestion: String,
    },

    /// An entry of the links array is not a string.
    #[error("batch entry {index} is not a string")]
    NonStringEntry {
        /// Zero-based position of the offending entry.
        index: usize,
    },
}

const SHAPE_SUGGESTION: &str = r#"Use a JSON array of links or an object like {"links": [...]}"#;

impl ParseError {
    /// Creates an `InvalidJson` error from a serde message.
    #[must_use]
    pub fn invalid_json(reason: &str) -> Self {
        Self::InvalidJson {
            reason: reason.to_string(),
            suggestion: SHAPE_SUGGESTION.to_string(),
        }
    }

    /// Creates an `UnexpectedShape` error.
    #[must_use]
    pub fn unexpected_shape(found: &str) -> Self {
        Self::UnexpectedShape {
            found: found.to_string(),
            suggestion: SHAPE_SUGGESTION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_json_display_has_suggestion() {
        let msg = ParseError::invalid_json("expected value at line 1").to_string();
        assert!(msg.contains("not valid JSON"));
        assert!(msg.contains("Suggestion"));
    }

    #[test]
    fn test_non_string_entry_display() {
        let msg = ParseError::NonStringEntry { index: 3 }.to_string();
        assert_eq!(msg, "batch entry 3 is not a string");
    }
}
