//! Link candidate extraction from converted email bodies.
//!
//! Recognizes Markdown `[text](url)` links, HTML `<a href>` anchors and bare
//! `http(s)://` URLs, in document order. Images are not links and are skipped.
//!
//! # Example
//!
//! ```
//! use gmailmd_core::parser::extract_links;
//!
//! let mut links = extract_links("[Read more](http://bit.ly/xyz)");
//! let first = links.next().unwrap().unwrap();
//! assert_eq!(first.text, "Read more");
//! assert_eq!(first.url, "http://bit.ly/xyz");
//! ```

mod error;
mod links;

pub use error::{MAX_URL_LENGTH, ParseError};
pub use links::{LinkCandidates, RawLink, extract_links};
pub(crate) use links::{collapse_whitespace, decode_entities};
