use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// A top-level piece of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    /// Text reproduced as-is, including any unbalanced markup.
    Literal(String),
    /// A balanced `{{...}}` block, braces included.
    Template(String),
}

const ESCAPE_TAGS: &[&str] = &["nowiki", "pre", "math", "source", "syntaxhighlight"];

static ESCAPE_OPEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^<(nowiki|pre|math|source|syntaxhighlight)(?:\s[^<>]*?)?(/?)>").unwrap()
});

static ESCAPE_CLOSE_RES: Lazy<HashMap<&'static str, Regex>> = Lazy::new(|| {
    ESCAPE_TAGS
        .iter()
        .map(|tag| (*tag, Regex::new(&format!(r"(?i)</{tag}\s*>")).unwrap()))
        .collect()
});

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("\u{E000}(\\d+)\u{E001}").unwrap());

const PLACEHOLDER_OPEN: char = '\u{E000}';
const PLACEHOLDER_CLOSE: char = '\u{E001}';

/// An escape region starting at some position: a comment or a literal-text tag.
struct EscapeMatch {
    end: usize,
    closed: bool,
}

/// Match a comment or literal-escape region starting exactly at `pos`.
/// An unterminated region extends to the end of the text with `closed == false`.
fn match_escape(text: &str, pos: usize) -> Option<EscapeMatch> {
    let rest = &text[pos..];
    if !rest.starts_with('<') {
        return None;
    }
    if rest.starts_with("<!--") {
        return Some(match rest[4..].find("-->") {
            Some(i) => EscapeMatch { end: pos + 4 + i + 3, closed: true },
            None => EscapeMatch { end: text.len(), closed: false },
        });
    }
    let caps = ESCAPE_OPEN_RE.captures(rest)?;
    let open_end = pos + caps.get(0)?.end();
    if &caps[2] == "/" {
        return Some(EscapeMatch { end: open_end, closed: true });
    }
    let tag = caps[1].to_lowercase();
    let close_re = ESCAPE_CLOSE_RES.get(tag.as_str())?;
    Some(match close_re.find(&text[open_end..]) {
        Some(m) => EscapeMatch { end: open_end + m.end(), closed: true },
        None => EscapeMatch { end: text.len(), closed: false },
    })
}

fn next_char_len(text: &str, pos: usize) -> usize {
    text[pos..].chars().next().map_or(1, char::len_utf8)
}

/// Split document text into literal and template spans.
///
/// Escape regions are opaque; `{{`/`}}` nesting is tracked with a depth
/// counter. An opener without a matching close stays literal text and
/// scanning resumes after it.
pub fn tokenize(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut literal_start = 0;
    let mut pos = 0;
    while pos < text.len() {
        if let Some(esc) = match_escape(text, pos) {
            pos = esc.end;
            continue;
        }
        if text[pos..].starts_with("{{") {
            if let Some(end) = find_template_end(text, pos) {
                if literal_start < pos {
                    spans.push(Span::Literal(text[literal_start..pos].to_string()));
                }
                spans.push(Span::Template(text[pos..end].to_string()));
                pos = end;
                literal_start = end;
            } else {
                pos += 2;
            }
            continue;
        }
        pos += next_char_len(text, pos);
    }
    if literal_start < text.len() {
        spans.push(Span::Literal(text[literal_start..].to_string()));
    }
    spans
}

/// Byte offset just past the `}}` closing the template opened at `start`.
fn find_template_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut pos = start;
    while pos < text.len() {
        if let Some(esc) = match_escape(text, pos) {
            if !esc.closed {
                return None;
            }
            pos = esc.end;
            continue;
        }
        let rest = &text[pos..];
        if rest.starts_with("{{") {
            depth += 1;
            pos += 2;
        } else if rest.starts_with("}}") {
            depth -= 1;
            pos += 2;
            if depth == 0 {
                return Some(pos);
            }
        } else {
            pos += next_char_len(text, pos);
        }
    }
    None
}

/// Replace every closed escape region with an opaque placeholder.
/// Returns the masked text and the escaped originals, indexed by placeholder.
pub fn mask_escapes(text: &str) -> (String, Vec<String>) {
    let mut masked = String::with_capacity(text.len());
    let mut escapes = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        if let Some(esc) = match_escape(text, pos)
            && esc.closed
        {
            masked.push(PLACEHOLDER_OPEN);
            masked.push_str(&escapes.len().to_string());
            masked.push(PLACEHOLDER_CLOSE);
            escapes.push(text[pos..esc.end].to_string());
            pos = esc.end;
            continue;
        }
        let len = next_char_len(text, pos);
        masked.push_str(&text[pos..pos + len]);
        pos += len;
    }
    (masked, escapes)
}

/// Restore placeholders produced by [`mask_escapes`].
pub fn unmask(text: &str, escapes: &[String]) -> String {
    if !has_placeholder(text) {
        return text.to_string();
    }
    PLACEHOLDER_RE
        .replace_all(text, |caps: &regex::Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| escapes.get(i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub fn has_placeholder(text: &str) -> bool {
    text.contains(PLACEHOLDER_OPEN)
}

/// Drop placeholders entirely, e.g. to read a template name past a comment.
pub fn strip_placeholders(text: &str) -> String {
    PLACEHOLDER_RE.replace_all(text, "").into_owned()
}

/// Byte offsets of `sep` occurring outside nested `{{ }}` and `[[ ]]`.
fn top_level_positions(text: &str, sep: char) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut braces = 0usize;
    let mut brackets = 0usize;
    let mut iter = text.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        let doubled = iter.peek().is_some_and(|&(_, next)| next == c);
        match c {
            '{' if doubled => {
                braces += 1;
                iter.next();
            }
            '}' if doubled && braces > 0 => {
                braces -= 1;
                iter.next();
            }
            '[' if doubled => {
                brackets += 1;
                iter.next();
            }
            ']' if doubled && brackets > 0 => {
                brackets -= 1;
                iter.next();
            }
            _ if c == sep && braces == 0 && brackets == 0 => positions.push(i),
            _ => {}
        }
    }
    positions
}

/// Split on `sep` at nesting depth zero.
pub fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for pos in top_level_positions(text, sep) {
        parts.push(&text[start..pos]);
        start = pos + sep.len_utf8();
    }
    parts.push(&text[start..]);
    parts
}

/// First occurrence of `ch` at nesting depth zero.
pub fn find_top_level(text: &str, ch: char) -> Option<usize> {
    top_level_positions(text, ch).first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn templates(spans: &[Span]) -> Vec<&str> {
        spans
            .iter()
            .filter_map(|s| match s {
                Span::Template(t) => Some(t.as_str()),
                Span::Literal(_) => None,
            })
            .collect()
    }

    fn rejoin(spans: &[Span]) -> String {
        spans
            .iter()
            .map(|s| match s {
                Span::Literal(t) | Span::Template(t) => t.as_str(),
            })
            .collect()
    }

    #[test]
    fn splits_literal_and_template_spans() {
        let text = "Intro {{cite web|url=http://a.b}} middle {{cite book|title=X}} end";
        let spans = tokenize(text);
        assert_eq!(
            templates(&spans),
            vec!["{{cite web|url=http://a.b}}", "{{cite book|title=X}}"]
        );
        assert_eq!(rejoin(&spans), text);
    }

    #[test]
    fn nested_templates_stay_inside_outer_span() {
        let text = "{{cite journal|title={{lang|fr|Le titre}}|year=2001}}";
        let spans = tokenize(text);
        assert_eq!(templates(&spans), vec![text]);
    }

    #[test]
    fn braces_inside_escapes_are_opaque() {
        let text = "<nowiki>{{not a template}}</nowiki> <!-- {{nor this}} --> {{cite web|title=a}}";
        let spans = tokenize(text);
        assert_eq!(templates(&spans), vec!["{{cite web|title=a}}"]);
        assert_eq!(rejoin(&spans), text);
    }

    #[test]
    fn unbalanced_template_degrades_to_literal() {
        let text = "{{cite web|title=open {{cite book|title=B}}";
        let spans = tokenize(text);
        assert_eq!(templates(&spans), vec!["{{cite book|title=B}}"]);
        assert_eq!(rejoin(&spans), text);

        let text = "before {{cite web|title=never closed";
        assert_eq!(tokenize(text), vec![Span::Literal(text.to_string())]);
    }

    #[test]
    fn unterminated_comment_swallows_rest_as_literal() {
        let text = "a <!-- open {{cite web|title=x}}";
        assert_eq!(tokenize(text), vec![Span::Literal(text.to_string())]);
    }

    #[test]
    fn mask_and_unmask_round_trip() {
        let text = "pages=3<nowiki>-</nowiki>6 <!-- note --> <math>x|y</math>";
        let (masked, escapes) = mask_escapes(text);
        assert_eq!(escapes.len(), 3);
        assert!(!masked.contains('|'));
        assert!(has_placeholder(&masked));
        assert_eq!(unmask(&masked, &escapes), text);
        assert_eq!(strip_placeholders(&masked), "pages=36  ");
    }

    #[test]
    fn self_closing_nowiki_is_an_escape() {
        let (masked, escapes) = mask_escapes("a<nowiki />b");
        assert_eq!(escapes, vec!["<nowiki />".to_string()]);
        assert!(masked.starts_with('a') && masked.ends_with('b'));
    }

    #[test]
    fn top_level_split_ignores_nested_pipes() {
        let parts = split_top_level("cite web|title={{a|b}}|url=[[x|y]]|z", '|');
        assert_eq!(parts, vec!["cite web", "title={{a|b}}", "url=[[x|y]]", "z"]);
        assert_eq!(find_top_level("{{a=b}}c=d", '='), Some(8));
    }
}
