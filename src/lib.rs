//! Stream MediaWiki `pages-articles` XML dumps and extract article titles with
//! their section headings, without holding the dump in memory.
//!
//! ```no_run
//! use wikidump_sections::{collect, DumpReader, ExtractOptions};
//!
//! let reader = DumpReader::open("bnwiki-latest-pages-articles.xml.bz2")?;
//! let outcome = collect(reader, &ExtractOptions { max_records: Some(100), ..Default::default() });
//! for article in &outcome.articles {
//!     println!("{}: {} headings", article.title, article.headings.len());
//! }
//! # Ok::<(), wikidump_sections::ExtractError>(())
//! ```

pub mod dump;
pub mod error;
pub mod extract;
pub mod markup;
pub mod remote;
pub mod settings;

pub use dump::{ArticleRecord, DumpReader, EXPORT_NAMESPACE};
pub use error::{ExtractError, ParseErrorKind};
pub use extract::{
    collect, run, ArticleHeadings, ExtractOptions, ExtractionOutcome, RunSummary, StopReason,
};
pub use markup::{extract_headings, Heading, LevelSet};
