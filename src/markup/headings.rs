use std::borrow::Cow;

use super::strip::{find_ci, strip_markup};
use super::{Heading, LevelSet};

/// Elements whose content is never parsed as wikitext.
const VERBATIM_TAGS: &[&str] = &["nowiki", "pre", "source", "syntaxhighlight", "math"];

/// Private-use delimiters around the index of an inline verbatim body.
const SLOT_OPEN: char = '\u{E000}';
const SLOT_CLOSE: char = '\u{E001}';

/// Parse every heading at levels 2-6 in document order.
pub fn parse_headings(raw: &str) -> Vec<Heading> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    let (visible, verbatim) = mask_hidden(raw);
    visible
        .lines()
        .filter_map(|line| heading_line(line, &verbatim))
        .collect()
}

/// Recognize a heading line: a run of `=` at both ends, level = the shorter run.
/// Surplus markers on the longer side stay in the label.
fn heading_line(line: &str, verbatim: &[&str]) -> Option<Heading> {
    let line = line.trim_end();
    let open = line.bytes().take_while(|&b| b == b'=').count();
    // All-marker lines are treated as text
    if open == 0 || open == line.len() {
        return None;
    }
    let close = line.bytes().rev().take_while(|&b| b == b'=').count();
    let level = open.min(close);
    if level < LevelSet::MIN_LEVEL as usize || level > LevelSet::MAX_LEVEL as usize {
        return None;
    }
    let inner = &line[level..line.len() - level];
    let mut text = strip_markup(inner);
    if text.contains(SLOT_OPEN) {
        text = restore_verbatim(&text, verbatim);
    }
    Some(Heading {
        level: level as u8,
        text,
    })
}

/// Drop comments and multi-line verbatim bodies so that `=` lines inside them
/// are not taken as headings. Inline verbatim bodies are replaced by an indexed
/// slot and returned separately, to be put back verbatim into the label.
/// Unterminated comments and tags are left as text.
fn mask_hidden(raw: &str) -> (Cow<'_, str>, Vec<&str>) {
    let mut verbatim = Vec::new();
    if !raw.contains('<') {
        return (Cow::Borrowed(raw), verbatim);
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(lt) = rest.find('<') {
        out.push_str(&rest[..lt]);
        let tail = &rest[lt..];

        if let Some(body) = tail.strip_prefix("<!--") {
            if let Some(end) = body.find("-->") {
                rest = &body[end + 3..];
                continue;
            }
        } else if let Some((inner, consumed)) = verbatim_element(tail) {
            if inner.contains('\n') {
                out.extend(std::iter::repeat('\n').take(inner.matches('\n').count()));
            } else if !inner.is_empty() {
                out.push(SLOT_OPEN);
                out.push_str(&verbatim.len().to_string());
                out.push(SLOT_CLOSE);
                verbatim.push(inner);
            }
            rest = &tail[consumed..];
            continue;
        }

        out.push('<');
        rest = &tail[1..];
    }
    out.push_str(rest);
    (Cow::Owned(out), verbatim)
}

/// Replace slots in a stripped label with their verbatim bodies (entities decoded).
fn restore_verbatim(label: &str, verbatim: &[&str]) -> String {
    let mut out = String::with_capacity(label.len());
    let mut rest = label;
    while let Some(at) = rest.find(SLOT_OPEN) {
        out.push_str(&rest[..at]);
        let after = &rest[at + SLOT_OPEN.len_utf8()..];
        let body = after.find(SLOT_CLOSE).and_then(|end| {
            let index: usize = after[..end].parse().ok()?;
            Some((verbatim.get(index)?, end))
        });
        match body {
            Some((body, end)) => {
                out.push_str(&html_escape::decode_html_entities(body));
                rest = &after[end + SLOT_CLOSE.len_utf8()..];
            }
            None => rest = after,
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// If `tail` starts a closed verbatim element, return its body and the number of
/// bytes the whole element spans.
fn verbatim_element(tail: &str) -> Option<(&str, usize)> {
    let name_len = tail[1..]
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .count();
    let name = &tail[1..1 + name_len];
    if !VERBATIM_TAGS.iter().any(|t| t.eq_ignore_ascii_case(name)) {
        return None;
    }

    let open_end = tail.find('>')?;
    if tail[..open_end].ends_with('/') {
        return Some(("", open_end + 1));
    }
    let body_start = open_end + 1;
    let closing = format!("</{}", name);
    let close_at = body_start + find_ci(&tail[body_start..], &closing)?;
    let close_end = close_at + tail[close_at..].find('>')? + 1;
    Some((&tail[body_start..close_at], close_end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels_and_text(raw: &str) -> Vec<(u8, String)> {
        parse_headings(raw)
            .into_iter()
            .map(|h| (h.level, h.text))
            .collect()
    }

    #[test]
    fn basic_levels() {
        let raw = "Intro\n== History ==\n=== Early years ===\n==== Detail ====";
        assert_eq!(
            levels_and_text(raw),
            vec![
                (2, "History".to_string()),
                (3, "Early years".to_string()),
                (4, "Detail".to_string()),
            ]
        );
    }

    #[test]
    fn no_spaces_and_trailing_whitespace() {
        assert_eq!(levels_and_text("==History==  \t"), vec![(2, "History".to_string())]);
    }

    #[test]
    fn level_one_and_deeper_than_six_are_text() {
        assert!(parse_headings("= Title =").is_empty());
        assert!(parse_headings("======= Seven =======").is_empty());
    }

    #[test]
    fn unbalanced_markers_keep_surplus_in_label() {
        assert_eq!(levels_and_text("=== A =="), vec![(2, "= A".to_string())]);
        assert_eq!(levels_and_text("== A ==="), vec![(2, "A =".to_string())]);
        assert!(parse_headings("== A =").is_empty());
        assert!(parse_headings("== A").is_empty());
    }

    #[test]
    fn indented_or_marker_only_lines_are_not_headings() {
        assert!(parse_headings(" == A ==").is_empty());
        assert!(parse_headings("======").is_empty());
        assert!(parse_headings("a == b ==").is_empty());
    }

    #[test]
    fn empty_label_still_emitted() {
        assert_eq!(levels_and_text("== {{anchor|x}} =="), vec![(2, String::new())]);
        assert_eq!(levels_and_text("==  =="), vec![(2, String::new())]);
    }

    #[test]
    fn trailing_comment_is_allowed() {
        assert_eq!(
            levels_and_text("== Notes == <!-- keep short -->"),
            vec![(2, "Notes".to_string())]
        );
    }

    #[test]
    fn commented_out_heading_is_skipped() {
        let raw = "<!--\n== Hidden ==\n-->\n== Shown ==";
        assert_eq!(levels_and_text(raw), vec![(2, "Shown".to_string())]);
    }

    #[test]
    fn verbatim_blocks_hide_headings() {
        let raw = "<pre>\n== Not a heading ==\n</pre>\n== Real ==\n<syntaxhighlight lang=\"ini\">\n==x==\n</syntaxhighlight>";
        assert_eq!(levels_and_text(raw), vec![(2, "Real".to_string())]);
    }

    #[test]
    fn inline_nowiki_is_literal() {
        assert_eq!(
            levels_and_text("== a <nowiki>[[b]]</nowiki> =="),
            vec![(2, "a [[b]]".to_string())]
        );
        assert_eq!(
            levels_and_text("== {{x}} <nowiki>''y'' &amp; {{z}}</nowiki> =="),
            vec![(2, "''y'' & {{z}}".to_string())]
        );
    }

    #[test]
    fn nowiki_escapes_heading_markers() {
        assert!(parse_headings("== A <nowiki>==</nowiki>").is_empty());
        assert!(parse_headings("<nowiki>==</nowiki> A ==").is_empty());
        assert_eq!(
            levels_and_text("== A <nowiki>==</nowiki> ==\n== B =="),
            vec![(2, "A ==".to_string()), (2, "B".to_string())]
        );
    }

    #[test]
    fn inline_verbatim_slots_follow_document_order() {
        let raw = "x <math>a+b</math>\n== <code>c</code> <nowiki>[1]</nowiki> ==";
        assert_eq!(levels_and_text(raw), vec![(2, "c [1]".to_string())]);
    }

    #[test]
    fn unterminated_comment_is_plain_text() {
        let raw = "== A ==\n<!-- never closed\n== B ==";
        assert_eq!(
            levels_and_text(raw),
            vec![(2, "A".to_string()), (2, "B".to_string())]
        );
    }

    #[test]
    fn bengali_headings() {
        let raw = "'''ঢাকা''' বাংলাদেশের রাজধানী।\n== ইতিহাস ==\n=== মুঘল আমল ===";
        assert_eq!(
            levels_and_text(raw),
            vec![(2, "ইতিহাস".to_string()), (3, "মুঘল আমল".to_string())]
        );
    }

    #[test]
    fn crlf_line_endings() {
        assert_eq!(
            levels_and_text("== A ==\r\ntext\r\n=== B ===\r\n"),
            vec![(2, "A".to_string()), (3, "B".to_string())]
        );
    }
}
