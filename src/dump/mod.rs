//! Streaming access to MediaWiki XML exports.

pub mod reader;
pub mod source;

pub use reader::DumpReader;
pub use source::{open_source, DumpSource};

/// Namespace of the MediaWiki export schema the reader accepts by default.
pub const EXPORT_NAMESPACE: &str = "http://www.mediawiki.org/xml/export-0.10/";

/// One `page` element of the dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    pub title: String,
    /// Page namespace id from `<ns>`; 0 is the main article space
    pub namespace: Option<i64>,
    /// Raw wikitext of the page's revision. `None` when the page has no `<text>`.
    pub text: Option<String>,
}
