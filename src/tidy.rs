//! Final cleanup once normalization has settled: drop what is redundant,
//! empty or superseded, and collapse duplicates.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::kb;
use crate::params::ParamStore;
use crate::types::{IssnPolicy, Kind, Options, Provenance};

static ZERO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*0+\s*$").unwrap());

const ZERO_MEANS_ABSENT: &[&str] = &["issue", "volume", "pages", "page"];

const AUTHOR_ROLES: &[&str] = &["last", "first", "author", "authorlink", "author-link"];

fn discard(store: &mut ParamStore, name: &str, reason: &str) -> bool {
    match store.remove(name) {
        Some(param) => {
            info!(param = %param.name, reason, "parameter dropped");
            true
        }
        None => false,
    }
}

/// Run every cleanup rule once. Returns whether anything changed.
pub fn tidy(store: &mut ParamStore, kind: &Kind, options: &Options) -> bool {
    let mut changed = false;
    changed |= preprint_identifiers(store, kind);
    changed |= drop_superseded(store, kind);
    changed |= drop_empty_values(store);
    changed |= apply_issn_policy(store, options.issn_policy);
    changed |= dedupe_parameters(store);
    changed |= dedupe_authors(store);
    changed
}

/// `eprint` is the preprint templates' name for what others call `arxiv`.
fn preprint_identifiers(store: &mut ParamStore, kind: &Kind) -> bool {
    if *kind == Kind::Arxiv {
        if store.has("arxiv") && store.position("eprint").is_none() {
            info!(from = "arxiv", to = "eprint", "parameter renamed");
            return store.rename("arxiv", "eprint");
        }
        return false;
    }
    let Some(eprint) = store.get("eprint").map(str::to_string) else {
        return false;
    };
    match store.get("arxiv").map(str::to_string) {
        None => {
            info!(from = "eprint", to = "arxiv", "parameter renamed");
            store.rename("eprint", "arxiv")
        }
        Some(arxiv) if arxiv.trim() == eprint.trim() => discard(store, "eprint", "same as arxiv"),
        Some(_) => false,
    }
}

fn drop_superseded(store: &mut ParamStore, kind: &Kind) -> bool {
    let mut changed = false;
    if *kind != Kind::Arxiv {
        changed |= discard(store, "class", "not a preprint");
    }
    if store.get("publisher").is_some_and(|p| p.to_lowercase().contains("arxiv")) {
        changed |= discard(store, "publisher", "preprint server");
    }
    if *kind == Kind::Journal && store.has("journal") {
        changed |= discard(store, "publisher", "journal named");
    }
    if !store.has("url") {
        for name in ["accessdate", "access-date"] {
            changed |= discard(store, name, "no url");
        }
    }
    changed
}

fn drop_empty_values(store: &mut ParamStore) -> bool {
    let mut changed = false;
    for name in ZERO_MEANS_ABSENT {
        if store.get(name).is_some_and(|v| ZERO_RE.is_match(v)) {
            changed |= discard(store, name, "zero");
        }
    }
    let junk: Vec<String> = store
        .params()
        .iter()
        .filter(|p| !p.is_positional() && kb::is_junk(&p.name, &p.value))
        .map(|p| p.name.clone())
        .collect();
    for name in junk {
        changed |= discard(store, &name, "junk value");
    }
    changed
}

/// Whether `issn` goes once a journal name is known.
fn apply_issn_policy(store: &mut ParamStore, policy: IssnPolicy) -> bool {
    if !store.has("issn") || !store.has("journal") {
        return false;
    }
    let journal_original = store
        .get_param("journal")
        .is_some_and(|p| p.provenance == Provenance::Original && p.name == "journal");
    let remove = match policy {
        IssnPolicy::Keep => false,
        IssnPolicy::DropWithJournal => true,
        IssnPolicy::KeepWithOriginalJournal => !journal_original,
    };
    remove && discard(store, "issn", "journal named")
}

/// Later copies of an identical named parameter go.
fn dedupe_parameters(store: &mut ParamStore) -> bool {
    let mut changed = false;
    let mut i = 1;
    while i < store.len() {
        let current = store.at(i);
        let duplicate = !current.is_positional()
            && store.params()[..i].iter().any(|earlier| {
                !earlier.is_positional()
                    && earlier.key() == current.key()
                    && earlier.value.trim() == current.value.trim()
            });
        if duplicate {
            let removed = store.remove_at(i);
            info!(param = %removed.name, "duplicate parameter dropped");
            changed = true;
        } else {
            i += 1;
        }
    }
    changed
}

/// The name at ordinal `n`: (surname or whole name, given names).
fn author_at(store: &ParamStore, n: u32) -> Option<(String, Option<String>)> {
    let head = store.get_nth("last", n).or_else(|| store.get_nth("author", n))?;
    let first = store.get_nth("first", n).map(|f| f.trim().to_string());
    Some((head.trim().to_string(), first))
}

/// Repeated authors go; later ordinals shift down to stay contiguous.
fn dedupe_authors(store: &mut ParamStore) -> bool {
    let mut changed = false;
    'scan: loop {
        let next = store.next_ordinal(AUTHOR_ROLES);
        let mut seen = Vec::new();
        for n in 1..next {
            let Some(author) = author_at(store, n) else {
                continue;
            };
            if seen.contains(&author) {
                info!(ordinal = n, "duplicate author dropped");
                store.remove_from_family(AUTHOR_ROLES, n);
                changed = true;
                continue 'scan;
            }
            seen.push(author);
        }
        return changed;
    }
}
