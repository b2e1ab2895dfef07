use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

// Force recompilation when KB files change (hash set by build.rs).
#[allow(dead_code)]
const _KB_HASH: &str = env!("KB_HASH");

static PARAMETERS_KB: &str = include_str!("../kbs/parameters.kb");
static ALIASES_KB: &str = include_str!("../kbs/aliases.kb");
static COLLABORATIONS_KB: &str = include_str!("../kbs/collaborations.kb");
static DOI_REGISTRANTS_KB: &str = include_str!("../kbs/doi-registrants.kb");
static JUNK_KB: &str = include_str!("../kbs/junk.kb");

/// Iterate the meaningful lines of a KB file (no blanks, no `#` comments).
fn kb_lines(kb_text: &str) -> impl Iterator<Item = &str> {
    kb_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Iterate `left --- right` pairs of a KB file.
fn kb_pairs(kb_text: &str) -> impl Iterator<Item = (&str, &str)> {
    kb_lines(kb_text).filter_map(|line| {
        let (left, right) = line.split_once("---")?;
        Some((left.trim(), right.trim()))
    })
}

struct ParamSpec {
    rank: usize,
    ordinal: bool,
}

/// Known parameter base names → emission rank and whether they form an
/// ordinal family (`last<n>` in the KB).
static PARAMETERS: Lazy<HashMap<String, ParamSpec>> = Lazy::new(|| {
    kb_lines(PARAMETERS_KB)
        .enumerate()
        .map(|(rank, line)| match line.strip_suffix("<n>") {
            Some(base) => (base.to_string(), ParamSpec { rank, ordinal: true }),
            None => (line.to_string(), ParamSpec { rank, ordinal: false }),
        })
        .collect()
});

/// Misspelling / obsolete name → canonical parameter name.
static ALIASES: Lazy<HashMap<String, String>> = Lazy::new(|| {
    kb_pairs(ALIASES_KB)
        .map(|(alias, canonical)| (alias.to_lowercase(), canonical.to_lowercase()))
        .collect()
});

/// Collaboration name mapping: uppercase name → standardized name.
static COLLABORATIONS: Lazy<HashMap<String, String>> = Lazy::new(|| {
    kb_pairs(COLLABORATIONS_KB)
        .map(|(name, standardized)| (name.to_uppercase(), standardized.to_string()))
        .collect()
});

/// DOI registrant prefix → required suffix shape.
static DOI_REGISTRANTS: Lazy<HashMap<String, Regex>> = Lazy::new(|| {
    kb_pairs(DOI_REGISTRANTS_KB)
        .filter_map(|(prefix, pattern)| Some((prefix.to_string(), Regex::new(pattern).ok()?)))
        .collect()
});

/// (parameter, value) pairs that say nothing.
static JUNK: Lazy<HashSet<(String, String)>> = Lazy::new(|| {
    kb_pairs(JUNK_KB)
        .map(|(name, value)| (name.to_lowercase(), value.to_lowercase()))
        .collect()
});

/// Words that mark a name as an organisation rather than a person.
static ORGANISATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:collaboration|consortium|group|team|committee|council|society|association|institute|organi[sz]ation|project|commission|agency|foundation|working party)\b",
    )
    .unwrap()
});

/// Largest ordinal read as part of a family; longer numbers make a plain name.
pub const MAX_ORDINAL: u32 = 9999;

/// Split a trailing ordinal off a parameter name.
/// "last12" → ("last", Some(12)), "title" → ("title", None)
pub fn split_ordinal(name: &str) -> (&str, Option<u32>) {
    let base = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if base.is_empty() || base.len() == name.len() {
        return (name, None);
    }
    match name[base.len()..].parse::<u32>() {
        Ok(n) if n <= MAX_ORDINAL => (base, Some(n)),
        _ => (name, None),
    }
}

/// Whether `name` (any case) is a recognised template parameter.
pub fn is_known_parameter(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    if PARAMETERS.contains_key(&lower) {
        return true;
    }
    let (base, ordinal) = split_ordinal(&lower);
    ordinal.is_some() && PARAMETERS.get(base).is_some_and(|spec| spec.ordinal)
}

/// Position of a base name in the canonical emission order; unknown names sort last.
pub fn param_rank(base: &str) -> usize {
    PARAMETERS.get(base).map_or(usize::MAX, |spec| spec.rank)
}

/// Sort key for emitting record fields: author-like families interleave by
/// ordinal (last1, first1, last2, ...) at the position of the family head.
pub fn emission_key(name: &str) -> (usize, u32, usize) {
    let (base, ordinal) = split_ordinal(name);
    let rank = param_rank(base);
    let group = match base {
        "last" | "first" | "author" | "authorlink" | "author-link" => param_rank("last"),
        "editor" | "editor-last" | "editor-first" => param_rank("editor"),
        _ => return (rank, 0, rank),
    };
    (group, ordinal.unwrap_or(1), rank)
}

/// Canonical name for a misspelt or obsolete parameter name, if one is known.
pub fn resolve_alias(name: &str) -> Option<&'static str> {
    ALIASES.get(&name.trim().to_lowercase()).map(String::as_str)
}

/// Lowercased, alias-resolved form of a parameter name.
pub fn canonical_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match ALIASES.get(&lower) {
        Some(canonical) => canonical.clone(),
        None => lower,
    }
}

/// Try to match a collaboration name (the whole text, case-insensitively).
pub fn match_collaboration(text: &str) -> Option<String> {
    let upper = text.trim().trim_end_matches('.').to_uppercase();
    COLLABORATIONS.get(&upper).cloned()
}

/// Whether a name denotes an organisation that must not be split into parts.
pub fn is_organisation(name: &str) -> bool {
    match_collaboration(name).is_some() || ORGANISATION_RE.is_match(name)
}

/// Suffix shape required by a known DOI registrant.
pub fn registrant_shape(prefix: &str) -> Option<&'static Regex> {
    DOI_REGISTRANTS.get(prefix)
}

/// Whether `name=value` is a known placeholder value with no content.
pub fn is_junk(name: &str, value: &str) -> bool {
    JUNK.contains(&(name.trim().to_lowercase(), value.trim().to_lowercase()))
}
