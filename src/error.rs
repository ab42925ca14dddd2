//! Error types for dump extraction

use thiserror::Error;

/// Errors surfaced by the record reader and the extraction driver.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The dump could not be opened or read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The outer XML is malformed or truncated
    #[error("malformed dump at byte {position} after {records} records: {kind}")]
    Parse {
        /// Byte offset in the (decompressed) stream where parsing stopped
        position: u64,
        /// Number of records successfully yielded before the failure
        records: usize,
        /// What went wrong
        kind: ParseErrorKind,
    },

    /// The output sink rejected a record
    #[error("failed to write output: {0}")]
    Output(std::io::Error),
}

impl ExtractError {
    /// Records yielded before a parse failure, if this is one.
    pub fn records_before_failure(&self) -> Option<usize> {
        match self {
            ExtractError::Parse { records, .. } => Some(*records),
            _ => None,
        }
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, ExtractError::Parse { .. })
    }
}

/// Detail for [`ExtractError::Parse`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Error reported by the XML tokenizer
    #[error("{0}")]
    Xml(String),

    /// The stream ended before the named element was closed
    #[error("unexpected end of document inside <{0}>")]
    UnexpectedEof(&'static str),

    /// The document contains no root element at all
    #[error("document is empty")]
    EmptyDocument,

    /// Root element is not `mediawiki`
    #[error("root element is <{0}>, expected <mediawiki>")]
    NotADump(String),

    /// Root element is not bound to the expected export namespace
    #[error(
        "export namespace mismatch: expected {expected}, found {}",
        found.as_deref().unwrap_or("none")
    )]
    NamespaceMismatch {
        expected: String,
        found: Option<String>,
    },

    /// A page element closed without a title
    #[error("page without <title>")]
    MissingTitle,

    /// The `ns` element did not hold an integer
    #[error("invalid page namespace id {0:?}")]
    InvalidNamespaceId(String),

    /// Element text was not valid UTF-8
    #[error("invalid UTF-8 in element text")]
    InvalidUtf8,
}

pub type Result<T> = std::result::Result<T, ExtractError>;
