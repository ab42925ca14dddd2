//! Reduce inline wikitext to plain text.
//!
//! Links keep their visible label, templates and references disappear, emphasis
//! quotes and HTML tags are dropped while their content is kept. Anything that
//! does not close properly is copied through unchanged.

/// Tags whose content is not part of the visible label.
const HIDDEN_TAGS: &[&str] = &["ref", "references"];

const URL_PREFIXES: &[&str] = &[
    "http://", "https://", "ftp://", "//", "mailto:", "news:", "irc://",
];

/// Strip inline markup from `text`, decode HTML entities and trim.
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    strip_into(text, &mut out);
    let decoded = html_escape::decode_html_entities(&out);
    decoded.replace('\u{a0}', " ").trim().to_string()
}

fn strip_into(text: &str, out: &mut String) {
    let mut rest = text;
    while let Some(at) = rest.find(['[', '{', '\'', '<']) {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];
        let consumed = match tail.as_bytes()[0] {
            b'[' => wikilink(tail, out).or_else(|| external_link(tail, out)),
            b'{' => template(tail),
            b'\'' => Some(quotes(tail, out)),
            _ => comment(tail).or_else(|| tag(tail)),
        };
        match consumed {
            Some(n) => rest = &tail[n..],
            None => {
                out.push_str(&tail[..1]);
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
}

/// `[[target]]` or `[[target|label]]`.
fn wikilink(tail: &str, out: &mut String) -> Option<usize> {
    let body = tail.strip_prefix("[[")?;
    let end = find_closing(body, "[[", "]]")?;
    let inner = &body[..end];
    let label = match split_top_level_pipe(inner) {
        Some((_, label)) => label,
        None => inner.strip_prefix(':').unwrap_or(inner),
    };
    strip_into(label, out);
    Some(2 + end + 2)
}

/// `[url label]` keeps the label, a bare `[url]` renders nothing.
fn external_link(tail: &str, out: &mut String) -> Option<usize> {
    let body = &tail[1..];
    if !URL_PREFIXES.iter().any(|p| starts_with_ci(body, p)) {
        return None;
    }
    let end = body.find(']')?;
    let inner = &body[..end];
    if inner.contains('\n') {
        return None;
    }
    if let Some((_, label)) = inner.split_once(char::is_whitespace) {
        strip_into(label, out);
    }
    Some(1 + end + 1)
}

/// Templates `{{...}}` and arguments `{{{...}}}` are removed with everything nested in them.
fn template(tail: &str) -> Option<usize> {
    if let Some(body) = tail.strip_prefix("{{{") {
        if let Some(end) = find_closing(body, "{{{", "}}}") {
            return Some(3 + end + 3);
        }
    }
    let body = tail.strip_prefix("{{")?;
    let end = find_closing(body, "{{", "}}")?;
    Some(2 + end + 2)
}

/// Emphasis runs: `''` and `'''` vanish; a run of four leaves one apostrophe,
/// longer runs keep their surplus beyond five.
fn quotes(tail: &str, out: &mut String) -> usize {
    let run = tail.bytes().take_while(|&b| b == b'\'').count();
    let literal = match run {
        1 => 1,
        4 => 1,
        n if n > 5 => n - 5,
        _ => 0,
    };
    out.extend(std::iter::repeat('\'').take(literal));
    run
}

fn comment(tail: &str) -> Option<usize> {
    let body = tail.strip_prefix("<!--")?;
    body.find("-->").map(|end| 4 + end + 3)
}

/// HTML-like tag: hidden elements are removed whole, other tags only lose the
/// tag itself.
fn tag(tail: &str) -> Option<usize> {
    let after = &tail[1..];
    let closing = after.starts_with('/');
    let name_start = usize::from(closing);
    let name_len = after[name_start..]
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric())
        .count();
    if name_len == 0 || !after.as_bytes()[name_start].is_ascii_alphabetic() {
        return None;
    }
    let name = &after[name_start..name_start + name_len];
    let open_end = 1 + after.find('>')? + 1;
    if tail[1..open_end].contains('<') {
        return None;
    }

    let self_closing = tail[..open_end - 1].ends_with('/');
    if !closing && !self_closing && HIDDEN_TAGS.iter().any(|t| t.eq_ignore_ascii_case(name)) {
        let close_tag = format!("</{}", name);
        if let Some(close_at) = find_ci(&tail[open_end..], &close_tag) {
            let close_at = open_end + close_at;
            if let Some(gt) = tail[close_at..].find('>') {
                return Some(close_at + gt + 1);
            }
        }
    }
    Some(open_end)
}

/// Index of the `close` delimiter matching an already-consumed `open`.
fn find_closing(body: &str, open: &str, close: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(close.as_bytes()) {
            if depth == 0 {
                return Some(i);
            }
            depth -= 1;
            i += close.len();
        } else if bytes[i..].starts_with(open.as_bytes()) {
            depth += 1;
            i += open.len();
        } else {
            i += 1;
        }
    }
    None
}

/// Split a link body at its first `|` that is not nested in a link or template.
fn split_top_level_pipe(inner: &str) -> Option<(&str, &str)> {
    let bytes = inner.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match &bytes[i..] {
            [b'[', b'[', ..] | [b'{', b'{', ..] => {
                depth += 1;
                i += 2;
            }
            [b']', b']', ..] | [b'}', b'}', ..] => {
                depth = depth.saturating_sub(1);
                i += 2;
            }
            [b'|', ..] if depth == 0 => return Some((&inner[..i], &inner[i + 1..])),
            _ => i += 1,
        }
    }
    None
}

fn starts_with_ci(haystack: &str, prefix: &str) -> bool {
    haystack.len() >= prefix.len()
        && haystack.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// ASCII case-insensitive substring search returning a byte offset.
pub(crate) fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_trimmed() {
        assert_eq!(strip_markup("  History  "), "History");
    }

    #[test]
    fn wikilinks() {
        assert_eq!(strip_markup("[[Dhaka]] division"), "Dhaka division");
        assert_eq!(strip_markup("[[Dhaka Division|Dhaka]]"), "Dhaka");
        assert_eq!(strip_markup("[[:Category:Rivers]]"), "Category:Rivers");
        assert_eq!(strip_markup("[[a|b [[c|d]]]]"), "b d");
    }

    #[test]
    fn pipe_inside_nested_template_does_not_split() {
        assert_eq!(strip_markup("[[A{{x|y}}|label]]"), "label");
    }

    #[test]
    fn external_links() {
        assert_eq!(strip_markup("[https://example.org Official site]"), "Official site");
        assert_eq!(strip_markup("see [https://example.org]"), "see");
        assert_eq!(strip_markup("[not a link]"), "[not a link]");
    }

    #[test]
    fn templates_removed() {
        assert_eq!(strip_markup("Awards{{citation needed|date=2020}}"), "Awards");
        assert_eq!(strip_markup("a{{outer|{{inner}}}}b"), "ab");
        assert_eq!(strip_markup("x{{{1|default}}}y"), "xy");
    }

    #[test]
    fn emphasis_removed() {
        assert_eq!(strip_markup("'''Bold''' and ''italic''"), "Bold and italic");
        assert_eq!(strip_markup("'''''both'''''"), "both");
        assert_eq!(strip_markup("Rock 'n' roll"), "Rock 'n' roll");
    }

    #[test]
    fn tags() {
        assert_eq!(strip_markup("<small>Small</small> print"), "Small print");
        assert_eq!(strip_markup("Line<br/>break"), "Linebreak");
        assert_eq!(strip_markup("Sources<ref name=\"a\">Cite {{x}}</ref>"), "Sources");
        assert_eq!(strip_markup("Sources<ref name=\"a\" />"), "Sources");
        assert_eq!(strip_markup("a <!-- note --> b"), "a  b");
    }

    #[test]
    fn entities_decoded() {
        assert_eq!(strip_markup("Q&amp;A&nbsp;session"), "Q&A session");
        assert_eq!(strip_markup("&#2437;"), "অ");
    }

    #[test]
    fn unbalanced_markup_is_literal() {
        assert_eq!(strip_markup("[[broken"), "[[broken");
        assert_eq!(strip_markup("{{broken"), "{{broken");
        assert_eq!(strip_markup("a < b"), "a < b");
        assert_eq!(strip_markup("x <!-- open"), "x <!-- open");
        assert_eq!(strip_markup("]] }}"), "]] }}");
    }

    #[test]
    fn find_ci_matches_any_case() {
        assert_eq!(find_ci("abc</REF>", "</ref"), Some(3));
        assert_eq!(find_ci("abc", "zz"), None);
    }
}
