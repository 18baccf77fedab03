//! Input parsing: link extraction from chat text and batch documents.
//!
//! # Example
//!
//! ```
//! use linkrelay_core::parser::{extract_links, normalize_link};
//!
//! let links = extract_links("check https://terabox.com/s/1Abc/ please");
//! assert_eq!(links.len(), 1);
//! assert_eq!(normalize_link(&links[0]), "https://terabox.com/s/1abc");
//! ```

mod batch;
mod error;
mod link;

pub use batch::parse_batch_input;
pub use error::{MAX_LINK_LENGTH, ParseError};
pub use link::{DEFAULT_HOST_FAMILIES, LinkExtractor, extract_links, normalize_link};
