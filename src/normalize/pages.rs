use once_cell::sync::Lazy;
use regex::Regex;

use super::Context;
use crate::params::ParamStore;
use crate::tokenizer::{has_placeholder, split_top_level};

static PAGE_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:pages?|pp?)\s*\.?\s*(?:\d|[A-Z]\d)").unwrap());

static PREFIX_ONLY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*(?:pages?|pp?)\s*\.?\s*").unwrap());

/// A page range written with a hyphen, double hyphen or any dash variant.
static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)([A-Za-z]?\d+[A-Za-z]?)\s*(?:-{1,2}|[‐‑‒−—–])\s*([A-Za-z]?\d+[A-Za-z]?)(\s*)$")
        .unwrap()
});

/// Clean a page value: drop a "p."/"pp." prefix and write ranges with an en dash.
/// "pp. 1-5" → "1–5", "12--14, 20" → "12–14, 20"
pub fn format_pages(value: &str) -> String {
    let value = if PAGE_PREFIX_RE.is_match(value) {
        PREFIX_ONLY_RE.replace(value, "").into_owned()
    } else {
        value.to_string()
    };
    split_top_level(&value, ',')
        .into_iter()
        .map(|item| match RANGE_RE.captures(item) {
            Some(c) => format!("{}{}–{}{}", &c[1], &c[2], &c[3], &c[4]),
            None => item.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether a page value denotes more than one page.
pub fn is_range(value: &str) -> bool {
    value.contains('–') || value.contains(',')
}

/// Clean `pages`, `page`, `p` and `pp`, and move a range held under a
/// single-page name to `pages` when that slot is free.
pub fn normalize(store: &mut ParamStore, _ctx: &mut Context) -> bool {
    let mut changed = false;
    for name in ["pages", "page", "pp", "p"] {
        let Some(value) = store.get_param(name).map(|p| p.value.clone()) else {
            continue;
        };
        if has_placeholder(&value) || value.contains("{{") {
            continue;
        }
        let formatted = format_pages(&value);
        if formatted != value {
            changed |= store.rewrite(name, &formatted);
        }
        if name != "pages" && is_range(&formatted) && store.rename(name, "pages") {
            changed = true;
        }
    }
    changed
}
