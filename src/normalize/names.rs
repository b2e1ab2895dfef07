use once_cell::sync::Lazy;
use regex::Regex;

use super::Context;
use crate::kb;
use crate::params::ParamStore;
use crate::tokenizer::has_placeholder;
use crate::types::Provenance;

/// A personal name split for `last<n>`/`first<n>`, or a name kept whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameParts {
    Person { last: String, first: String },
    Single(String),
}

/// Lowercase particles that belong to the surname ("van Beethoven").
const PARTICLES: &[&str] = &[
    "van", "von", "de", "der", "den", "del", "della", "di", "da", "du", "la", "le", "ter", "ten",
    "dos", "das", "bin", "ibn", "al",
];

static ET_AL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[,;]?\s*(?:et\.?\s*al\.?|and others)\s*$").unwrap());

static AND_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+and\s+|\s*&\s*").unwrap());

fn strip_one_dot(s: &str) -> String {
    s.strip_suffix('.').unwrap_or(s).trim().to_string()
}

/// Split a name into surname and given names.
///
/// "Shannon, Claude E." → Person { last: "Shannon", first: "Claude E" }
/// "Ludwig van Beethoven" → Person { last: "van Beethoven", first: "Ludwig" }
/// "ATLAS Collaboration" → Single("ATLAS Collaboration")
pub fn split_name(name: &str) -> NameParts {
    let name = name.trim();
    if kb::is_organisation(name) {
        return NameParts::Single(name.to_string());
    }
    if let Some((last, first)) = name.split_once(',') {
        let (last, first) = (last.trim(), strip_one_dot(first.trim()));
        if last.is_empty() || first.is_empty() {
            return NameParts::Single(name.trim_matches(',').trim().to_string());
        }
        return NameParts::Person {
            last: last.to_string(),
            first,
        };
    }
    let words: Vec<&str> = name.split_whitespace().collect();
    if words.len() < 2 {
        return NameParts::Single(name.to_string());
    }
    let mut surname_start = words.len() - 1;
    while surname_start > 1 && PARTICLES.contains(&words[surname_start - 1]) {
        surname_start -= 1;
    }
    NameParts::Person {
        last: words[surname_start..].join(" "),
        first: strip_one_dot(&words[..surname_start].join(" ")),
    }
}

/// Break a free-text author list into individual names.
/// Returns the names and whether the list ended in "et al.".
///
/// Lists are split on `;` when present; otherwise on commas and "and". A
/// comma-split list of single words is read as surname, given-name pairs.
pub fn parse_author_list(text: &str) -> Option<(Vec<String>, bool)> {
    let (body, etal) = match ET_AL_RE.find(text) {
        Some(m) => (&text[..m.start()], true),
        None => (text, false),
    };
    let body = body.trim().trim_end_matches([',', ';']).trim();
    if body.is_empty() {
        return None;
    }
    if body.contains(';') {
        let names: Vec<String> = body
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        return Some((names, etal));
    }
    let comma_pieces: Vec<&str> = body.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    let pieces: Vec<&str> = comma_pieces
        .iter()
        .copied()
        .flat_map(|piece| AND_RE.split(piece))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if pieces.iter().all(|p| p.split_whitespace().count() > 1) {
        return Some((pieces.into_iter().map(String::from).collect(), etal));
    }
    let used_and = pieces.len() != comma_pieces.len();
    if !used_and && pieces.len() % 2 == 0 {
        let names = pieces
            .chunks(2)
            .map(|pair| format!("{}, {}", pair[0], pair[1]))
            .collect();
        return Some((names, etal));
    }
    None
}

/// Split a plural `authors` list into numbered name parameters in place.
/// A singular `author` is left alone, as is any list next to existing
/// numbered authors.
pub fn split_author_lists(store: &mut ParamStore, _ctx: &mut Context) -> bool {
    let Some(idx) = store.position("authors") else {
        return false;
    };
    let value = store.at(idx).value.clone();
    if has_placeholder(&value) || value.contains("{{") || value.contains("[[") {
        return false;
    }
    if store.next_ordinal(&["last", "first", "author"]) != 1 {
        return false;
    }
    let Some((names, etal)) = parse_author_list(&value) else {
        return false;
    };
    let mut fields = Vec::new();
    for (i, name) in names.iter().enumerate() {
        let n = i + 1;
        match split_name(name) {
            NameParts::Person { last, first } => {
                fields.push((format!("last{n}"), last));
                fields.push((format!("first{n}"), first));
            }
            NameParts::Single(whole) => fields.push((format!("author{n}"), whole)),
        }
    }
    if etal && !store.has("displayauthors") {
        fields.push(("displayauthors".to_string(), "etal".to_string()));
    }
    tracing::debug!(count = names.len(), etal, "split author list");
    store.replace_with(idx, &fields, Provenance::Derived);
    true
}
