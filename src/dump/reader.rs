use std::io::BufRead;
use std::path::Path;

use indicatif::ProgressBar;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use tracing::debug;

use super::source::{open_source, DumpSource};
use super::{ArticleRecord, EXPORT_NAMESPACE};
use crate::error::{ExtractError, ParseErrorKind, Result};

/// Pull-based reader yielding one [`ArticleRecord`] per `page` element.
///
/// The document is consumed as a forward-only event stream through one reused
/// scratch buffer; a record's strings are moved out when it is yielded, so
/// memory stays bounded by the largest single page regardless of dump size.
/// After an error the iterator is fused.
pub struct DumpReader<R: BufRead> {
    reader: NsReader<R>,
    buf: Vec<u8>,
    namespace: Vec<u8>,
    state: State,
    records: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Prolog,
    Pages,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Page,
    Title,
    Ns,
    Revision,
    Text,
    Other,
}

impl Tag {
    fn of(in_namespace: bool, local_name: &[u8]) -> Tag {
        if !in_namespace {
            return Tag::Other;
        }
        match local_name {
            b"page" => Tag::Page,
            b"title" => Tag::Title,
            b"ns" => Tag::Ns,
            b"revision" => Tag::Revision,
            b"text" => Tag::Text,
            _ => Tag::Other,
        }
    }
}

#[derive(Debug)]
enum Token {
    Open { tag: Tag, empty: bool },
    Close,
    Text(String),
    Eof,
    Skip,
}

impl DumpReader<DumpSource> {
    /// Open a dump file (`.xml` or `.xml.bz2`).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(open_source(path.as_ref(), None)?))
    }

    /// Open a dump file, advancing `progress` by the bytes read from disk.
    pub fn open_with_progress(path: impl AsRef<Path>, progress: ProgressBar) -> Result<Self> {
        Ok(Self::new(open_source(path.as_ref(), Some(progress))?))
    }
}

impl<R: BufRead> DumpReader<R> {
    pub fn new(source: R) -> Self {
        DumpReader {
            reader: NsReader::from_reader(source),
            buf: Vec::with_capacity(8 * 1024),
            namespace: EXPORT_NAMESPACE.as_bytes().to_vec(),
            state: State::Prolog,
            records: 0,
        }
    }

    /// Require a different export namespace on the root element. Matched exactly.
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.as_bytes().to_vec();
        self
    }

    /// Number of records yielded so far.
    pub fn records_read(&self) -> usize {
        self.records
    }

    /// Byte offset reached in the decompressed stream.
    pub fn position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    /// Capacity of the scratch buffer, the reader's only growing allocation.
    pub fn scratch_capacity(&self) -> usize {
        self.buf.capacity()
    }

    fn next_record(&mut self) -> Result<Option<ArticleRecord>> {
        if self.state == State::Prolog {
            self.read_root()?;
        }
        if self.state == State::Finished {
            return Ok(None);
        }

        loop {
            match self.next_token(false)? {
                Token::Open { tag: Tag::Page, empty: false } => return self.read_page().map(Some),
                Token::Open { tag: Tag::Page, empty: true } => {
                    return Err(self.parse_error(ParseErrorKind::MissingTitle))
                }
                Token::Open { empty: false, .. } => self.skip_element("mediawiki")?,
                Token::Close => {
                    debug!(records = self.records, "reached end of dump");
                    return Ok(None);
                }
                Token::Eof => {
                    return Err(self.parse_error(ParseErrorKind::UnexpectedEof("mediawiki")))
                }
                Token::Open { .. } | Token::Text(_) | Token::Skip => {}
            }
        }
    }

    /// Consume everything up to the root element and check it is a MediaWiki
    /// export in the expected namespace.
    fn read_root(&mut self) -> Result<()> {
        let root = loop {
            self.buf.clear();
            let scanned = match self.reader.read_resolved_event_into(&mut self.buf) {
                Ok((resolved, Event::Start(e))) => {
                    Ok(Some(root_info(&resolved, e.local_name().as_ref(), false)))
                }
                Ok((resolved, Event::Empty(e))) => {
                    Ok(Some(root_info(&resolved, e.local_name().as_ref(), true)))
                }
                Ok((_, Event::Eof)) => Ok(None),
                Ok(_) => continue,
                Err(e) => Err(e),
            };
            break scanned.map_err(|e| self.xml_error(e))?;
        };

        let Some((name, found, empty)) = root else {
            return Err(self.parse_error(ParseErrorKind::EmptyDocument));
        };
        if name != "mediawiki" {
            return Err(self.parse_error(ParseErrorKind::NotADump(name)));
        }
        if found.as_deref().map(str::as_bytes) != Some(self.namespace.as_slice()) {
            let expected = String::from_utf8_lossy(&self.namespace).into_owned();
            return Err(self.parse_error(ParseErrorKind::NamespaceMismatch { expected, found }));
        }

        debug!(namespace = %String::from_utf8_lossy(&self.namespace), "export root accepted");
        self.state = if empty { State::Finished } else { State::Pages };
        Ok(())
    }

    fn read_page(&mut self) -> Result<ArticleRecord> {
        let mut title = None;
        let mut namespace = None;
        let mut text = None;

        loop {
            match self.next_token(false)? {
                Token::Open { tag: Tag::Title, empty } => {
                    title = Some(self.read_text(empty, "title")?)
                }
                Token::Open { tag: Tag::Ns, empty } => {
                    let raw = self.read_text(empty, "ns")?;
                    match raw.trim().parse::<i64>() {
                        Ok(id) => namespace = Some(id),
                        Err(_) => {
                            return Err(self.parse_error(ParseErrorKind::InvalidNamespaceId(raw)))
                        }
                    }
                }
                // Full-history dumps carry several revisions; the last one is current.
                Token::Open { tag: Tag::Revision, empty: false } => {
                    if let Some(revision_text) = self.read_revision()? {
                        text = Some(revision_text);
                    }
                }
                Token::Open { empty: false, .. } => self.skip_element("page")?,
                Token::Close => break,
                Token::Eof => return Err(self.parse_error(ParseErrorKind::UnexpectedEof("page"))),
                Token::Open { .. } | Token::Text(_) | Token::Skip => {}
            }
        }

        let Some(title) = title else {
            return Err(self.parse_error(ParseErrorKind::MissingTitle));
        };
        self.records += 1;
        Ok(ArticleRecord { title, namespace, text })
    }

    fn read_revision(&mut self) -> Result<Option<String>> {
        let mut text = None;
        loop {
            match self.next_token(false)? {
                Token::Open { tag: Tag::Text, empty } => {
                    text = Some(self.read_text(empty, "text")?)
                }
                Token::Open { empty: false, .. } => self.skip_element("revision")?,
                Token::Close => return Ok(text),
                Token::Eof => {
                    return Err(self.parse_error(ParseErrorKind::UnexpectedEof("revision")))
                }
                Token::Open { .. } | Token::Text(_) | Token::Skip => {}
            }
        }
    }

    /// Collect the character content of the element just opened.
    fn read_text(&mut self, empty: bool, element: &'static str) -> Result<String> {
        let mut content = String::new();
        if empty {
            return Ok(content);
        }
        loop {
            match self.next_token(true)? {
                Token::Text(chunk) => {
                    if content.is_empty() {
                        content = chunk;
                    } else {
                        content.push_str(&chunk);
                    }
                }
                Token::Open { empty: false, .. } => self.skip_element(element)?,
                Token::Close => return Ok(content),
                Token::Eof => return Err(self.parse_error(ParseErrorKind::UnexpectedEof(element))),
                Token::Open { .. } | Token::Skip => {}
            }
        }
    }

    /// Skip the element just opened, including all of its descendants.
    fn skip_element(&mut self, parent: &'static str) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.next_token(false)? {
                Token::Open { empty: false, .. } => depth += 1,
                Token::Close if depth == 0 => return Ok(()),
                Token::Close => depth -= 1,
                Token::Eof => return Err(self.parse_error(ParseErrorKind::UnexpectedEof(parent))),
                Token::Open { .. } | Token::Text(_) | Token::Skip => {}
            }
        }
    }

    fn next_token(&mut self, want_text: bool) -> Result<Token> {
        self.buf.clear();
        let scanned = match self.reader.read_resolved_event_into(&mut self.buf) {
            Ok((resolved, event)) => {
                let in_namespace = matches!(
                    resolved,
                    ResolveResult::Bound(Namespace(ns)) if ns == self.namespace.as_slice()
                );
                Ok(classify(in_namespace, event, want_text))
            }
            Err(e) => Err(e),
        };
        match scanned {
            Ok(Ok(token)) => Ok(token),
            Ok(Err(kind)) => Err(self.parse_error(kind)),
            Err(e) => Err(self.xml_error(e)),
        }
    }

    fn parse_error(&self, kind: ParseErrorKind) -> ExtractError {
        ExtractError::Parse {
            position: self.position(),
            records: self.records,
            kind,
        }
    }

    fn xml_error(&self, err: quick_xml::Error) -> ExtractError {
        match err {
            quick_xml::Error::Io(io) => {
                ExtractError::Io(std::io::Error::new(io.kind(), io.to_string()))
            }
            other => self.parse_error(ParseErrorKind::Xml(other.to_string())),
        }
    }
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = Result<ArticleRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == State::Finished {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.state = State::Finished;
                None
            }
            Err(e) => {
                self.state = State::Finished;
                Some(Err(e))
            }
        }
    }
}

fn root_info(
    resolved: &ResolveResult<'_>,
    local_name: &[u8],
    empty: bool,
) -> (String, Option<String>, bool) {
    let found = match resolved {
        ResolveResult::Bound(Namespace(ns)) => Some(String::from_utf8_lossy(ns).into_owned()),
        _ => None,
    };
    (String::from_utf8_lossy(local_name).into_owned(), found, empty)
}

fn classify(
    in_namespace: bool,
    event: Event<'_>,
    want_text: bool,
) -> std::result::Result<Token, ParseErrorKind> {
    let token = match event {
        Event::Start(e) => Token::Open {
            tag: Tag::of(in_namespace, e.local_name().as_ref()),
            empty: false,
        },
        Event::Empty(e) => Token::Open {
            tag: Tag::of(in_namespace, e.local_name().as_ref()),
            empty: true,
        },
        Event::End(_) => Token::Close,
        Event::Text(e) if want_text => {
            let text = e.unescape().map_err(|err| ParseErrorKind::Xml(err.to_string()))?;
            Token::Text(text.into_owned())
        }
        Event::CData(e) if want_text => {
            let bytes = e.into_inner().into_owned();
            Token::Text(String::from_utf8(bytes).map_err(|_| ParseErrorKind::InvalidUtf8)?)
        }
        Event::Eof => Token::Eof,
        _ => Token::Skip,
    };
    Ok(token)
}
