use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use super::Context;
use crate::kb;
use crate::params::ParamStore;
use crate::tokenizer::has_placeholder;
use crate::types::{Flag, Provenance};

static DOI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^10\.\d{4,9}/\S+$").unwrap());

static DOI_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:doi\s*:\s*|https?://(?:dx\.)?doi\.org/|https?://hdl\.handle\.net/)").unwrap()
});

static DOI_IN_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(10\.\d{4,9}(?:/|%2[Ff])[^?#\s]+)").unwrap());

static JSTOR_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)jstor\.org/(?:stable|discover|pdf)/(?:pdfplus/|pdf/)?(?:10\.2307/)?(\d+)").unwrap()
});

static PUBMED_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ncbi\.nlm\.nih\.gov/(?:m/)?pubmed/(\d+)").unwrap());

static PMC_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)/pmc/articles/PMC(\d+)").unwrap());

static ARXIV_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)arxiv\.org/(?:abs|pdf)/([a-z\-]+(?:\.[a-z]{2})?/\d{7}|\d{4}\.\d{4,5})(?:v\d+)?").unwrap()
});

/// Old mirror layout: arxiv.org/PS_cache/<archive>/pdf/<yymm>/<number>.
static ARXIV_CACHE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)arxiv\.org/PS_cache/([a-z\-]+)/pdf/\d{4}/(\d{4}\.\d{4,5}|\d{7})(?:v\d+)?").unwrap()
});

static AMAZON_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)amazon\.[a-z.]+/(?:[^?#]*/)?(?:dp|gp/product)/([0-9A-Z]{10})\b").unwrap()
});

static GOOGLE_BOOKS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://books\.google\.[a-z.]+/books(?:/about/[^?#]*)?\?([^#]*)(?:#.*)?$").unwrap()
});

static GOOGLE_BOOKS_HOST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://books\.google\.[a-z.]+/").unwrap());

/// Serial Item and Contribution Identifier: ISSN(date)volume:issue<page...
static SICI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4}-\d{3}[\dXx])\((\d{4})(?:\d{2}){0,2}(?:/\d{4})?\)(\d+)(?::(\d+))?(?:<|\[|%3C|%5B)0*(\d+)")
        .unwrap()
});

static ISSN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-?(\d{3}[\dXx])$").unwrap());

const DOI_URL_SUFFIXES: &[&str] = &["/abstract", "/full", "/pdf", "/epdf", "/abs", ".pdf"];

const GOOGLE_BOOKS_KEYS: &[&str] = &["id", "redir_esc", "hl"];

/// Strip `doi:` and resolver prefixes, decode `%2F` and trailing punctuation.
/// "doi: 10.1000/xyz." → "10.1000/xyz"
pub fn clean_doi(value: &str) -> String {
    let stripped = DOI_PREFIX_RE.replace(value, "");
    stripped
        .replace("%2F", "/")
        .replace("%2f", "/")
        .trim()
        .trim_end_matches(['.', ',', ';'])
        .to_string()
}

/// Generic DOI shape, plus the registrant's own suffix shape when known.
pub fn is_valid_doi(doi: &str) -> bool {
    if !DOI_RE.is_match(doi) {
        return false;
    }
    let Some((prefix, suffix)) = doi.split_once('/') else {
        return false;
    };
    kb::registrant_shape(prefix).is_none_or(|shape| shape.is_match(suffix))
}

/// ISBN-10 or ISBN-13 check digit.
pub fn isbn_checksum_ok(value: &str) -> bool {
    let digits: Vec<char> = value
        .chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .map(|c| c.to_ascii_uppercase())
        .collect();
    match digits.len() {
        10 => {
            let mut sum = 0;
            for (i, &c) in digits.iter().enumerate() {
                let d = match (i, c) {
                    (9, 'X') => 10,
                    (_, c) => match c.to_digit(10) {
                        Some(d) => d,
                        None => return false,
                    },
                };
                sum += d * (10 - i as u32);
            }
            sum % 11 == 0
        }
        13 => {
            let mut sum = 0;
            for (i, c) in digits.iter().enumerate() {
                let Some(d) = c.to_digit(10) else {
                    return false;
                };
                sum += if i % 2 == 0 { d } else { d * 3 };
            }
            sum % 10 == 0
        }
        _ => false,
    }
}

/// ISSN check digit. "0097-3157" → true
pub fn issn_checksum_ok(value: &str) -> bool {
    let Some(caps) = ISSN_RE.captures(value.trim()) else {
        return false;
    };
    let digits: Vec<char> = format!("{}{}", &caps[1], &caps[2]).chars().collect();
    let sum: u32 = digits[..7]
        .iter()
        .zip((2..=8).rev())
        .filter_map(|(c, w)| c.to_digit(10).map(|d| d * w))
        .sum();
    let check = (11 - sum % 11) % 11;
    let expected = if check == 10 { 'X' } else { char::from_digit(check, 10).unwrap_or('?') };
    digits[7].to_ascii_uppercase() == expected
}

fn doi_from_url(url: &str) -> Option<String> {
    let found = DOI_IN_URL_RE.captures(url)?;
    let mut doi = clean_doi(&found[1]);
    while let Some(suffix) = DOI_URL_SUFFIXES.iter().find(|s| doi.ends_with(*s)) {
        doi.truncate(doi.len() - suffix.len());
    }
    DOI_RE.is_match(&doi).then_some(doi)
}

/// Identifier named by a site-specific URL: (parameter, value).
/// "http://www.ncbi.nlm.nih.gov/pubmed/1941451?dopt=AbstractPlus" → ("pmid", "1941451")
pub fn url_identifier(url: &str) -> Option<(&'static str, String)> {
    if let Some(c) = JSTOR_URL_RE.captures(url) {
        return Some(("jstor", c[1].to_string()));
    }
    if let Some(c) = PUBMED_URL_RE.captures(url) {
        return Some(("pmid", c[1].to_string()));
    }
    if let Some(c) = PMC_URL_RE.captures(url) {
        return Some(("pmc", c[1].to_string()));
    }
    if let Some(c) = ARXIV_URL_RE.captures(url) {
        return Some(("arxiv", c[1].to_string()));
    }
    if let Some(c) = ARXIV_CACHE_RE.captures(url) {
        let id = if c[2].contains('.') {
            c[2].to_string()
        } else {
            format!("{}/{}", &c[1], &c[2])
        };
        return Some(("arxiv", id));
    }
    if let Some(c) = AMAZON_URL_RE.captures(url) {
        return Some(("asin", c[1].to_string()));
    }
    doi_from_url(url)
        .filter(|doi| is_valid_doi(doi))
        .map(|doi| ("doi", doi))
}

pub fn is_google_books(url: &str) -> bool {
    GOOGLE_BOOKS_HOST_RE.is_match(url.trim())
}

/// Canonical form of a Google Books link that carries nothing but a volume id.
/// Links with search terms or page anchors are left alone.
pub fn canonical_google_books(url: &str) -> Option<String> {
    let caps = GOOGLE_BOOKS_RE.captures(url.trim())?;
    let mut id = None;
    for pair in caps[1].split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if !GOOGLE_BOOKS_KEYS.contains(&key) {
            return None;
        }
        if key == "id" {
            id = Some(value);
        }
    }
    id.filter(|id| !id.is_empty())
        .map(|id| format!("https://books.google.com/?id={id}"))
}

/// Recognise identifiers in `url`. A URL that was itself inferred is
/// dropped once it has been turned into an identifier.
pub fn from_url(store: &mut ParamStore, _ctx: &mut Context) -> bool {
    let Some(param) = store.get_param("url") else {
        return false;
    };
    let (url, provenance) = (param.value.clone(), param.provenance);
    if has_placeholder(&url) {
        return false;
    }
    if let Some(canonical) = canonical_google_books(&url)
        && canonical != url
    {
        store.set("url", &canonical, provenance);
        return true;
    }
    let Some((name, id)) = url_identifier(&url) else {
        return false;
    };
    let added = store.add_if_new(name, &id, Provenance::Derived);
    if added {
        debug!(param = name, value = %id, "identifier taken from url");
    }
    if provenance.is_inferred() && store.get(name).is_some_and(|v| v.trim() == id) {
        store.remove("url");
        return true;
    }
    added
}

/// Pull ISSN, year, volume, issue and first page out of a SICI in `url`.
/// Explicit data wins: no `issn` beside a `journal`, no `year` beside a date.
pub fn sici(store: &mut ParamStore, ctx: &mut Context) -> bool {
    let Some(url) = store.get("url").map(str::to_string) else {
        return false;
    };
    let Some(caps) = SICI_RE.captures(&url) else {
        return false;
    };
    let issn = caps[1].to_uppercase();
    if !issn_checksum_ok(&issn) {
        ctx.flag(Flag::RejectedInference(format!("issn={issn}")));
        return false;
    }
    let mut changed = false;
    if !store.has("journal") {
        changed |= store.add_if_new("issn", &issn, Provenance::Derived);
    }
    if !store.has("date") && !store.has("year") {
        changed |= store.add_if_new("year", &caps[2], Provenance::Derived);
    }
    changed |= store.add_if_new("volume", &caps[3], Provenance::Derived);
    if let Some(issue) = caps.get(4) {
        changed |= store.add_if_new("issue", issue.as_str(), Provenance::Derived);
    }
    if !store.has("page") {
        changed |= store.add_if_new("pages", &caps[5], Provenance::Derived);
    }
    changed
}

/// Clean `doi` and check its shape. A malformed explicit DOI is kept and
/// marked broken; a malformed inferred one is withdrawn.
pub fn doi(store: &mut ParamStore, ctx: &mut Context) -> bool {
    let Some(param) = store.get_param("doi") else {
        return false;
    };
    let (value, provenance) = (param.value.clone(), param.provenance);
    if has_placeholder(&value) || value.trim().is_empty() {
        return false;
    }
    let mut changed = false;
    let cleaned = clean_doi(&value);
    if cleaned != value {
        changed |= store.rewrite("doi", &cleaned);
    }
    if is_valid_doi(&cleaned) {
        return changed;
    }
    if !provenance.is_inferred() {
        ctx.flag(Flag::BrokenDoi(cleaned.clone()));
        let stamp = ctx.options.today.format("%Y-%m-%d").to_string();
        if store.add_if_new("doi-broken-date", &stamp, Provenance::Derived) {
            info!(doi = %cleaned, "doi marked broken");
            changed = true;
        }
        return changed;
    }
    ctx.flag(Flag::RejectedInference(format!("doi={cleaned}")));
    store.remove("doi");
    true
}

fn checked(
    store: &mut ParamStore,
    ctx: &mut Context,
    name: &str,
    valid: fn(&str) -> bool,
    invalid: fn(String) -> Flag,
) -> bool {
    let Some(param) = store.get_param(name) else {
        return false;
    };
    let (value, provenance) = (param.value.trim().to_string(), param.provenance);
    if value.is_empty() || has_placeholder(&value) || valid(&value) {
        return false;
    }
    if !provenance.is_inferred() {
        ctx.flag(invalid(value));
        return false;
    }
    debug!(param = name, value = %value, "inferred value failed checksum");
    ctx.flag(Flag::RejectedInference(format!("{name}={value}")));
    store.remove(name);
    true
}

pub fn isbn(store: &mut ParamStore, ctx: &mut Context) -> bool {
    checked(store, ctx, "isbn", isbn_checksum_ok, Flag::InvalidIsbn)
}

pub fn issn(store: &mut ParamStore, ctx: &mut Context) -> bool {
    checked(store, ctx, "issn", issn_checksum_ok, Flag::InvalidIssn)
}
