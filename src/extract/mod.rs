//! Extraction driver: pulls records from a reader, extracts headings, reports
//! them to a sink in document order.

pub mod sink;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dump::ArticleRecord;
use crate::error::{ExtractError, Result};
use crate::markup::{extract_headings, Heading, LevelSet};

pub use sink::{HeadingSink, JsonLinesSink, OutlineSink, TextSink};

/// Headings extracted from one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleHeadings {
    pub title: String,
    pub headings: Vec<Heading>,
}

impl ArticleHeadings {
    pub fn from_record(record: ArticleRecord, levels: LevelSet) -> Self {
        let headings = extract_headings(record.text.as_deref(), levels);
        ArticleHeadings {
            title: record.title,
            headings,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Heading levels to keep
    pub levels: LevelSet,
    /// Stop after this many extracted records
    pub max_records: Option<usize>,
    /// Only extract pages in these namespaces (`None` = all pages)
    pub namespaces: Option<Vec<i64>>,
    /// Records extracted in parallel per batch; 1 keeps everything sequential
    pub batch_size: usize,
    /// Checked between records; set it to stop the run early
    pub stop: Option<Arc<AtomicBool>>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            levels: LevelSet::default(),
            max_records: None,
            namespaces: None,
            batch_size: 1,
            stop: None,
        }
    }
}

impl ExtractOptions {
    fn accepts(&self, record: &ArticleRecord) -> bool {
        match &self.namespaces {
            None => true,
            Some(allowed) => record.namespace.is_some_and(|ns| allowed.contains(&ns)),
        }
    }

    fn should_stop(&self, extracted: usize) -> Option<StopReason> {
        if self.max_records.is_some_and(|max| extracted >= max) {
            return Some(StopReason::Limit);
        }
        if self.stop.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Some(StopReason::Cancelled);
        }
        None
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    EndOfDump,
    Limit,
    Cancelled,
    Failed,
}

/// Counters for a finished run plus the error that ended it, if any.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Records extracted and handed to the sink
    pub records: usize,
    /// Headings handed to the sink
    pub headings: usize,
    /// Records dropped by the namespace filter
    pub skipped: usize,
    pub stop: StopReason,
    pub error: Option<ExtractError>,
}

/// In-memory result of [`collect`].
#[derive(Debug)]
pub struct ExtractionOutcome {
    pub articles: Vec<ArticleHeadings>,
    pub records: usize,
    pub error: Option<ExtractError>,
}

/// Run the extraction and keep every article's headings in memory.
pub fn collect<I>(records: I, options: &ExtractOptions) -> ExtractionOutcome
where
    I: IntoIterator<Item = Result<ArticleRecord>>,
{
    let mut articles = Vec::new();
    let summary = run(records, options, &mut articles);
    ExtractionOutcome {
        articles,
        records: summary.records,
        error: summary.error,
    }
}

/// Pull records until the dump ends, the cutoff is reached, the stop flag is
/// set or the reader fails. Everything extracted before a failure has already
/// been handed to `sink` when this returns; the failure is in the summary.
pub fn run<I, S>(records: I, options: &ExtractOptions, sink: &mut S) -> RunSummary
where
    I: IntoIterator<Item = Result<ArticleRecord>>,
    S: HeadingSink + ?Sized,
{
    let mut records = records.into_iter();
    let mut summary = RunSummary::default();
    let batch_size = options.batch_size.max(1);
    let mut batch: Vec<ArticleRecord> = Vec::with_capacity(batch_size);

    loop {
        let mut stop = None;
        while batch.len() < batch_size {
            if let Some(reason) = options.should_stop(summary.records + batch.len()) {
                stop = Some(reason);
                break;
            }
            match records.next() {
                None => {
                    stop = Some(StopReason::EndOfDump);
                    break;
                }
                Some(Ok(record)) if options.accepts(&record) => batch.push(record),
                Some(Ok(record)) => {
                    debug!(title = %record.title, namespace = ?record.namespace, "skipping page");
                    summary.skipped += 1;
                }
                Some(Err(e)) => {
                    warn!(records = summary.records + batch.len(), error = %e, "reader failed");
                    summary.error = Some(e);
                    stop = Some(StopReason::Failed);
                    break;
                }
            }
        }

        if let Err(e) = emit_batch(&mut batch, options.levels, sink, &mut summary) {
            fail(&mut summary, e);
            break;
        }
        if let Some(reason) = stop {
            summary.stop = reason;
            break;
        }
    }

    if let Err(e) = sink.finish() {
        fail(&mut summary, ExtractError::Output(e));
    }

    info!(
        records = summary.records,
        headings = summary.headings,
        skipped = summary.skipped,
        stop = ?summary.stop,
        "extraction finished"
    );
    summary
}

/// Extract headings for the batch (in parallel when it holds more than one
/// record) and report them in their original order.
fn emit_batch<S>(
    batch: &mut Vec<ArticleRecord>,
    levels: LevelSet,
    sink: &mut S,
    summary: &mut RunSummary,
) -> Result<()>
where
    S: HeadingSink + ?Sized,
{
    let extracted: Vec<ArticleHeadings> = if batch.len() > 1 {
        // Indexed collect keeps document order
        batch
            .par_drain(..)
            .map(|record| ArticleHeadings::from_record(record, levels))
            .collect()
    } else {
        batch
            .drain(..)
            .map(|record| ArticleHeadings::from_record(record, levels))
            .collect()
    };

    for article in extracted {
        let count = article.headings.len();
        sink.accept(article).map_err(ExtractError::Output)?;
        summary.records += 1;
        summary.headings += count;
    }
    Ok(())
}

fn fail(summary: &mut RunSummary, error: ExtractError) {
    summary.stop = StopReason::Failed;
    match &summary.error {
        None => summary.error = Some(error),
        Some(first) => warn!(error = %error, first = %first, "additional failure after run ended"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::{DumpReader, EXPORT_NAMESPACE};
    use crate::error::ParseErrorKind;

    fn dump_with_pages(n: usize) -> String {
        let mut xml = format!("<mediawiki xmlns=\"{EXPORT_NAMESPACE}\">");
        for i in 0..n {
            xml.push_str(&format!(
                "<page><title>P{i}</title><ns>{ns}</ns><revision><text>== H{i} ==\n=== S{i} ===</text></revision></page>",
                ns = if i % 2 == 0 { 0 } else { 1 }
            ));
        }
        xml.push_str("</mediawiki>");
        xml
    }

    fn titles(articles: &[ArticleHeadings]) -> Vec<&str> {
        articles.iter().map(|a| a.title.as_str()).collect()
    }

    #[test]
    fn extracts_all_records_in_order() {
        let xml = dump_with_pages(5);
        let outcome = collect(DumpReader::new(xml.as_bytes()), &ExtractOptions::default());
        assert!(outcome.error.is_none());
        assert_eq!(outcome.records, 5);
        assert_eq!(titles(&outcome.articles), vec!["P0", "P1", "P2", "P3", "P4"]);
        assert_eq!(outcome.articles[3].headings.len(), 2);
    }

    #[test]
    fn cutoff_stops_without_reading_further() {
        let xml = dump_with_pages(10);
        let mut reader = DumpReader::new(xml.as_bytes());
        let options = ExtractOptions {
            max_records: Some(3),
            ..Default::default()
        };
        let mut articles = Vec::new();
        let summary = run(&mut reader, &options, &mut articles);
        assert_eq!(articles.len(), 3);
        assert_eq!(summary.stop, StopReason::Limit);
        assert_eq!(reader.records_read(), 3);
    }

    #[test]
    fn cutoff_with_batches_never_overshoots() {
        let xml = dump_with_pages(10);
        let mut reader = DumpReader::new(xml.as_bytes());
        let options = ExtractOptions {
            max_records: Some(3),
            batch_size: 4,
            ..Default::default()
        };
        let mut articles = Vec::new();
        run(&mut reader, &options, &mut articles);
        assert_eq!(titles(&articles), vec!["P0", "P1", "P2"]);
        assert_eq!(reader.records_read(), 3);
    }

    #[test]
    fn zero_cutoff_reads_nothing() {
        let xml = dump_with_pages(2);
        let mut reader = DumpReader::new(xml.as_bytes());
        let options = ExtractOptions {
            max_records: Some(0),
            ..Default::default()
        };
        let outcome = collect(&mut reader, &options);
        assert!(outcome.articles.is_empty());
        assert_eq!(reader.records_read(), 0);
    }

    #[test]
    fn parallel_batches_keep_document_order() {
        let xml = dump_with_pages(97);
        let sequential = collect(DumpReader::new(xml.as_bytes()), &ExtractOptions::default());
        let parallel = collect(
            DumpReader::new(xml.as_bytes()),
            &ExtractOptions {
                batch_size: 16,
                ..Default::default()
            },
        );
        assert_eq!(parallel.articles, sequential.articles);
        assert_eq!(parallel.records, 97);
    }

    #[test]
    fn truncated_dump_keeps_prior_records() {
        let xml = dump_with_pages(4);
        let cut = xml.find("<title>P3").unwrap() + 5;
        let outcome = collect(DumpReader::new(&xml.as_bytes()[..cut]), &ExtractOptions::default());
        assert_eq!(titles(&outcome.articles), vec!["P0", "P1", "P2"]);
        let err = outcome.error.expect("parse error surfaced");
        assert!(err.is_parse());
        assert_eq!(err.records_before_failure(), Some(3));
    }

    #[test]
    fn truncated_dump_in_batch_mode_keeps_prior_records() {
        let xml = dump_with_pages(6);
        let cut = xml.find("<title>P5").unwrap();
        let outcome = collect(
            DumpReader::new(&xml.as_bytes()[..cut]),
            &ExtractOptions {
                batch_size: 4,
                ..Default::default()
            },
        );
        assert_eq!(outcome.records, 5);
        assert!(outcome.error.is_some());
    }

    /// Yields `limit` bytes of `data`, then fails every read.
    struct FailingRead<'a> {
        data: &'a [u8],
        limit: usize,
    }

    impl std::io::Read for FailingRead<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.limit == 0 {
                return Err(std::io::Error::other("disk gone"));
            }
            let n = buf.len().min(self.limit).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            self.limit -= n;
            Ok(n)
        }
    }

    #[test]
    fn read_failure_mid_stream_is_io_and_keeps_prior_records() {
        let xml = dump_with_pages(5);
        let source = FailingRead {
            data: xml.as_bytes(),
            limit: xml.find("<title>P3").unwrap(),
        };
        let reader = DumpReader::new(std::io::BufReader::with_capacity(64, source));
        let outcome = collect(reader, &ExtractOptions::default());
        assert_eq!(titles(&outcome.articles), vec!["P0", "P1", "P2"]);
        assert_eq!(outcome.records, 3);
        match outcome.error {
            Some(ExtractError::Io(e)) => assert!(e.to_string().contains("disk gone")),
            other => panic!("expected an io error, got {other:?}"),
        }
    }

    #[test]
    fn namespace_filter_skips_without_counting() {
        let xml = dump_with_pages(6);
        let options = ExtractOptions {
            namespaces: Some(vec![0]),
            max_records: Some(2),
            ..Default::default()
        };
        let mut articles = Vec::new();
        let summary = run(DumpReader::new(xml.as_bytes()), &options, &mut articles);
        assert_eq!(titles(&articles), vec!["P0", "P2"]);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn stop_flag_cancels_between_records() {
        let xml = dump_with_pages(3);
        let flag = Arc::new(AtomicBool::new(true));
        let options = ExtractOptions {
            stop: Some(flag),
            ..Default::default()
        };
        let mut articles = Vec::new();
        let summary = run(DumpReader::new(xml.as_bytes()), &options, &mut articles);
        assert!(articles.is_empty());
        assert_eq!(summary.stop, StopReason::Cancelled);
    }

    #[test]
    fn works_over_any_record_iterator() {
        let records = vec![
            Ok(ArticleRecord {
                title: "A".into(),
                namespace: Some(0),
                text: Some("== One ==\n=== Two ===".into()),
            }),
            Err(ExtractError::Parse {
                position: 10,
                records: 1,
                kind: ParseErrorKind::UnexpectedEof("page"),
            }),
        ];
        let options = ExtractOptions {
            levels: "3".parse().unwrap(),
            ..Default::default()
        };
        let outcome = collect(records, &options);
        assert_eq!(outcome.articles[0].headings, vec![Heading { level: 3, text: "Two".into() }]);
        assert!(outcome.error.is_some());
    }

    struct FailingSink;

    impl HeadingSink for FailingSink {
        fn accept(&mut self, _article: ArticleHeadings) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn sink_failure_ends_run() {
        let xml = dump_with_pages(3);
        let mut reader = DumpReader::new(xml.as_bytes());
        let summary = run(&mut reader, &ExtractOptions::default(), &mut FailingSink);
        assert_eq!(summary.records, 0);
        assert_eq!(summary.stop, StopReason::Failed);
        assert!(matches!(summary.error, Some(ExtractError::Output(_))));
        assert_eq!(reader.records_read(), 1);
    }

    #[test]
    fn fixture_headings() {
        let reader = DumpReader::open("tests/fixtures/bnwiki-sample.xml").unwrap();
        let outcome = collect(reader, &ExtractOptions::default());
        assert!(outcome.error.is_none());
        let dhaka: Vec<(u8, &str)> = outcome.articles[0]
            .headings
            .iter()
            .map(|h| (h.level, h.text.as_str()))
            .collect();
        assert_eq!(
            dhaka,
            vec![
                (2, "ইতিহাস"),
                (3, "মুঘল আমল"),
                (3, "ব্রিটিশ আমল"),
                (2, "ভূগোল"),
                (4, "জলবায়ু"),
                (2, "তথ্যসূত্র"),
            ]
        );
        assert_eq!(outcome.articles[1].headings[1].text, "বাহ্যিক সংযোগ");
        assert!(outcome.articles[3].headings.is_empty());
    }
}
