use std::io::{self, Write};

use super::ArticleHeadings;
use crate::markup::outline::{self, OutlineNode};

/// Receives extracted articles in document order.
pub trait HeadingSink {
    fn accept(&mut self, article: ArticleHeadings) -> io::Result<()>;

    /// Called once after the last article.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl HeadingSink for Vec<ArticleHeadings> {
    fn accept(&mut self, article: ArticleHeadings) -> io::Result<()> {
        self.push(article);
        Ok(())
    }
}

/// Title line followed by one line per heading, indented two spaces per level.
pub struct TextSink<W: Write> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        TextSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> HeadingSink for TextSink<W> {
    fn accept(&mut self, article: ArticleHeadings) -> io::Result<()> {
        writeln!(self.out, "{}", article.title)?;
        for heading in &article.headings {
            let indent = "  ".repeat(usize::from(heading.level).saturating_sub(1));
            writeln!(self.out, "{}{}", indent, heading.text)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// One JSON object per line: `{"title": ..., "headings": [{"level": 2, "text": ...}]}`.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        JsonLinesSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> HeadingSink for JsonLinesSink<W> {
    fn accept(&mut self, article: ArticleHeadings) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, &article)?;
        self.out.write_all(b"\n")
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Title followed by the section tree, indented by nesting depth.
pub struct OutlineSink<W: Write> {
    out: W,
}

impl<W: Write> OutlineSink<W> {
    pub fn new(out: W) -> Self {
        OutlineSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_nodes(&mut self, nodes: &[OutlineNode], depth: usize) -> io::Result<()> {
        for node in nodes {
            writeln!(
                self.out,
                "{}- {} (h{})",
                "  ".repeat(depth),
                node.heading.text,
                node.heading.level
            )?;
            self.write_nodes(&node.children, depth + 1)?;
        }
        Ok(())
    }
}

impl<W: Write> HeadingSink for OutlineSink<W> {
    fn accept(&mut self, article: ArticleHeadings) -> io::Result<()> {
        writeln!(self.out, "{}", article.title)?;
        let tree = outline::build(&article.headings);
        self.write_nodes(&tree, 1)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
