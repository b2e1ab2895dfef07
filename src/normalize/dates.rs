use once_cell::sync::Lazy;
use regex::Regex;

use super::Context;
use crate::params::{ParamStore, is_blank};
use crate::tokenizer::has_placeholder;

static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-(?:0[1-9]|1[0-2])(?:-(?:0[1-9]|[12]\d|3[01]))?$").unwrap());

/// Reference-manager dates: "1948/07//", "1990/05/17/", "2001///Spring".
static SLASH_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})/(\d{1,2})?(?:/(\d{1,2})?(?:/.*)?)?$").unwrap());

static YEAR_PUNCT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})[.,;]$").unwrap());

static YEAR_IN_TEXT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})\b").unwrap());

/// Convert a slash-separated date to ISO form, keeping only the parts given.
/// "1948/07//" → "1948-07", "1957" → "1957"
pub fn slash_to_iso(value: &str) -> Option<String> {
    let value = value.trim();
    if !value.contains('/') {
        return value
            .parse::<u16>()
            .ok()
            .filter(|_| value.len() == 4)
            .map(|_| value.to_string());
    }
    let caps = SLASH_DATE_RE.captures(value)?;
    let mut iso = caps[1].to_string();
    if let Some(month) = caps.get(2).and_then(|m| m.as_str().parse::<u8>().ok())
        && (1..=12).contains(&month)
    {
        iso.push_str(&format!("-{month:02}"));
        if let Some(day) = caps.get(3).and_then(|m| m.as_str().parse::<u8>().ok())
            && (1..=31).contains(&day)
        {
            iso.push_str(&format!("-{day:02}"));
        }
    }
    Some(iso)
}

pub fn is_iso_date(value: &str) -> bool {
    ISO_DATE_RE.is_match(value.trim())
}

fn is_in_press(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("in press")
}

/// Date rules: ISO dates held in `year` move to `date`, slash dates become
/// ISO, stray punctuation after a year goes, "in press" yields to a real
/// year, and a `year` repeating the year of `date` is dropped.
pub fn normalize(store: &mut ParamStore, _ctx: &mut Context) -> bool {
    let mut changed = false;
    changed |= move_iso_year_to_date(store);
    for name in ["date", "year"] {
        changed |= tidy_value(store, name);
    }
    changed |= drop_in_press(store);
    changed |= drop_redundant_year(store);
    changed
}

fn move_iso_year_to_date(store: &mut ParamStore) -> bool {
    let Some(year) = store.get("year") else {
        return false;
    };
    if !is_iso_date(year) || store.position("date").is_some() {
        return false;
    }
    store.rename("year", "date")
}

fn tidy_value(store: &mut ParamStore, name: &str) -> bool {
    let Some(value) = store.get(name) else {
        return false;
    };
    if has_placeholder(value) {
        return false;
    }
    let replacement = if let Some(caps) = YEAR_PUNCT_RE.captures(value) {
        caps[1].to_string()
    } else if value.contains('/') {
        match slash_to_iso(value) {
            Some(iso) => iso,
            None => return false,
        }
    } else {
        return false;
    };
    if replacement == value {
        return false;
    }
    store.rewrite(name, &replacement)
}

fn drop_in_press(store: &mut ParamStore) -> bool {
    let mut changed = false;
    for (name, other) in [("date", "year"), ("year", "date")] {
        let pending = store.get(name).is_some_and(is_in_press);
        if pending && store.has(other) {
            store.remove(name);
            changed = true;
        }
    }
    changed
}

fn drop_redundant_year(store: &mut ParamStore) -> bool {
    let (Some(date), Some(year)) = (store.get("date"), store.get("year")) else {
        return false;
    };
    if is_blank("date", date) || has_placeholder(date) {
        return false;
    }
    let date_year = YEAR_IN_TEXT_RE.captures(date).map(|c| c[1].to_string());
    if date_year.as_deref() == Some(year.trim()) {
        store.remove("year");
        return true;
    }
    false
}
