use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::Context;
use super::identifiers::url_identifier;
use crate::kb;
use crate::params::ParamStore;
use crate::tokenizer::has_placeholder;
use crate::types::Provenance;

static TTP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^ttps?://").unwrap());

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(?:https?|ftp)://\S+$").unwrap());

static BARE_HOST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}(?:/\S*)?$").unwrap()
});

static EDITION_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\b(?:ed\.?|edn\.?|edition)$").unwrap());

/// Fix parameter names: misspellings go to their canonical name, and
/// capitalised known names are lowercased. A misspelling never displaces a
/// filled canonical slot; it is dropped only when it says the same thing.
pub fn correct_names(store: &mut ParamStore, _ctx: &mut Context) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i < store.len() {
        let param = store.at(i);
        if param.is_positional() {
            i += 1;
            continue;
        }
        let key = param.key();
        if let Some(target) = kb::resolve_alias(&key) {
            match store.exact_position(target) {
                None => {
                    if store.rename(&key, target) {
                        debug!(from = %key, to = target, "misspelt parameter renamed");
                        changed = true;
                    }
                }
                Some(j) if store.at(j).value.trim() == store.at(i).value.trim() => {
                    debug!(param = %key, "duplicate misspelt parameter dropped");
                    store.remove_at(i);
                    changed = true;
                    continue;
                }
                Some(_) => {}
            }
        } else if key != param.name
            && kb::is_known_parameter(&key)
            && same_key_agree(store, &key)
        {
            let param = store.at_mut(i);
            param.name = key;
            if param.provenance == Provenance::Original {
                param.provenance = Provenance::Renamed;
            }
            changed = true;
        }
        i += 1;
    }
    changed
}

/// Every parameter written under `key` holds the same value, so lowercasing
/// one of them cannot make it shadow a different one.
fn same_key_agree(store: &ParamStore, key: &str) -> bool {
    let mut values = store
        .params()
        .iter()
        .filter(|p| !p.is_positional() && p.key() == key)
        .map(|p| p.value.trim());
    match values.next() {
        Some(first) => values.all(|v| v == first),
        None => true,
    }
}

/// Read a `website` value as a URL: "ttp://x.org" and "x.org" count, free text does not.
fn website_as_url(value: &str) -> Option<String> {
    let value = value.trim();
    if value.chars().any(char::is_whitespace) {
        return None;
    }
    if TTP_RE.is_match(value) {
        return Some(format!("h{value}"));
    }
    if URL_RE.is_match(value) {
        return Some(value.to_string());
    }
    BARE_HOST_RE.is_match(value).then(|| format!("http://{value}"))
}

/// Move a URL written under `website` to `url`. A website that only points
/// at an identifier already present is redundant and removed.
pub fn website_to_url(store: &mut ParamStore, _ctx: &mut Context) -> bool {
    let Some(idx) = store.position("website") else {
        return false;
    };
    let value = store.at(idx).value.clone();
    if has_placeholder(&value) {
        return false;
    }
    let Some(url) = website_as_url(&value) else {
        return false;
    };
    if let Some((name, id)) = url_identifier(&url)
        && store.get(name).is_some_and(|v| v.trim() == id)
    {
        debug!(param = name, "website duplicates identifier");
        store.remove_at(idx);
        return true;
    }
    if store.has("url") {
        return false;
    }
    let format = store.format_profile();
    store.remove("url");
    let idx = store.position("website").unwrap_or(idx);
    store.at_mut(idx).make_named("url", &url, &format, Provenance::Derived);
    true
}

/// "3rd ed." → "3rd"
pub fn edition(store: &mut ParamStore, _ctx: &mut Context) -> bool {
    let Some(value) = store.get("edition") else {
        return false;
    };
    if has_placeholder(value) {
        return false;
    }
    let trimmed = EDITION_SUFFIX_RE.replace(value, "").trim_end().to_string();
    if trimmed.is_empty() || trimmed == value {
        return false;
    }
    store.rewrite("edition", &trimmed)
}
