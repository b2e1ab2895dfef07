//! Citation kind from the parameters present.
//!
//! Rules are tried in order and the first that answers wins. Identifiers
//! speak louder than field names, so they come before the URL fallback.

use tracing::info;

use crate::normalize::identifiers::is_google_books;
use crate::params::ParamStore;
use crate::types::Kind;

type ClassifyRule = fn(&Kind, &ParamStore) -> Option<Kind>;

const SERIAL_IDS: &[&str] = &["journal", "issn", "doi", "pmid", "pmc", "jstor", "bibcode"];
const CATALOG_IDS: &[&str] = &["isbn", "asin"];

const RULES: &[(&str, ClassifyRule)] = &[
    ("explicit", explicit),
    ("published-preprint", published_preprint),
    ("preprint", preprint),
    ("serial", serial),
    ("catalog", catalog),
    ("bare-url", bare_url),
];

fn has_any(store: &ParamStore, names: &[&str]) -> bool {
    names.iter().any(|name| store.has(name))
}

/// A specific kind is kept as it is.
fn explicit(current: &Kind, _store: &ParamStore) -> Option<Kind> {
    (current.rank() >= 3).then(|| current.clone())
}

fn published_preprint(current: &Kind, store: &ParamStore) -> Option<Kind> {
    (*current == Kind::Arxiv && store.has("journal")).then_some(Kind::Journal)
}

fn preprint(_current: &Kind, store: &ParamStore) -> Option<Kind> {
    if !has_any(store, &["arxiv", "eprint"]) {
        return None;
    }
    Some(if store.has("journal") { Kind::Journal } else { Kind::Arxiv })
}

fn serial(_current: &Kind, store: &ParamStore) -> Option<Kind> {
    (has_any(store, SERIAL_IDS) && !has_any(store, CATALOG_IDS)).then_some(Kind::Journal)
}

fn catalog(_current: &Kind, store: &ParamStore) -> Option<Kind> {
    let google_books = store.get("url").is_some_and(is_google_books);
    (has_any(store, CATALOG_IDS) || google_books).then_some(Kind::Book)
}

fn bare_url(_current: &Kind, store: &ParamStore) -> Option<Kind> {
    store.has("url").then_some(Kind::Web)
}

/// The kind the parameters point to, given the current one.
pub fn classify(current: &Kind, store: &ParamStore) -> Kind {
    RULES
        .iter()
        .find_map(|(_, rule)| rule(current, store))
        .unwrap_or_else(|| current.clone())
}

/// Move `kind` to a more specific kind if the parameters call for one.
/// Never downgrades. Returns whether the kind changed.
pub fn reclassify(kind: &mut Kind, store: &ParamStore) -> bool {
    upgrade(kind, classify(kind, store))
}

/// Replace `kind` with `candidate` only if the candidate is more specific.
pub fn upgrade(kind: &mut Kind, candidate: Kind) -> bool {
    if candidate.rank() <= kind.rank() {
        return false;
    }
    info!(from = ?kind, to = ?candidate, "citation kind upgraded");
    *kind = candidate;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameter;

    fn store(parts: &[&str]) -> ParamStore {
        ParamStore::from_params(parts.iter().map(|p| Parameter::parse(p)).collect())
    }

    #[test]
    fn identifiers_choose_kind() {
        assert_eq!(classify(&Kind::Web, &store(&["jstor=1701972"])), Kind::Journal);
        assert_eq!(classify(&Kind::Web, &store(&["asin=0226845494"])), Kind::Book);
        assert_eq!(classify(&Kind::Web, &store(&["doi=10.1/x", "isbn=123"])), Kind::Book);
        assert_eq!(classify(&Kind::Web, &store(&["eprint=1203.0149"])), Kind::Arxiv);
        assert_eq!(
            classify(&Kind::Generic, &store(&["url=https://books.google.com/?id=X"])),
            Kind::Book
        );
        assert_eq!(classify(&Kind::Generic, &store(&["url=http://a.org"])), Kind::Web);
        assert_eq!(classify(&Kind::Generic, &store(&["title=T"])), Kind::Generic);
    }

    #[test]
    fn preprint_with_journal_is_journal() {
        let s = store(&["arxiv=0806.0013", "journal=Phys. Rev."]);
        assert_eq!(classify(&Kind::Arxiv, &s), Kind::Journal);
        assert_eq!(classify(&Kind::Web, &s), Kind::Journal);
    }

    #[test]
    fn reclassification_only_upgrades() {
        let mut kind = Kind::Book;
        assert!(!reclassify(&mut kind, &store(&["doi=10.1/x"])));
        assert_eq!(kind, Kind::Book);

        let mut kind = Kind::Web;
        assert!(reclassify(&mut kind, &store(&["pmid=1941451"])));
        assert_eq!(kind, Kind::Journal);

        let mut kind = Kind::Arxiv;
        assert!(!reclassify(&mut kind, &store(&["url=http://a.org"])));
        assert_eq!(kind, Kind::Arxiv);
    }

    #[test]
    fn blank_values_do_not_count() {
        assert_eq!(classify(&Kind::Web, &store(&["journal=", "url=http://a"])), Kind::Web);
    }
}
