//! RIS: one `XX  - value` line per field, closed by `ER  -`.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::{collect_entries, standard_number_field};
use crate::normalize::dates::slash_to_iso;
use crate::normalize::pages::format_pages;
use crate::types::{Kind, PartialRecord, Source};

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([A-Z][A-Z0-9])\s{1,2}-\s?(.*)$").unwrap());

static START_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*TY\s{1,2}-[ \t]?\S").unwrap());

pub fn looks_like(text: &str) -> bool {
    START_RE.is_match(text)
}

fn tag_of(line: &str) -> Option<(&str, &str)> {
    let caps = TAG_RE.captures(line)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

fn kind_for(ty: &str) -> Option<Kind> {
    Some(match ty {
        "JOUR" | "EJOUR" | "JFULL" | "MGZN" => Kind::Journal,
        "BOOK" | "EBOOK" | "CHAP" | "ECHAP" => Kind::Book,
        "THES" => Kind::Thesis,
        "NEWS" => Kind::News,
        "ELEC" | "WEB" | "BLOG" => Kind::Web,
        _ => return None,
    })
}

/// Parse one RIS record. Unknown tags are skipped.
pub fn import(text: &str) -> PartialRecord {
    let entries = collect_entries(text, tag_of, Some("ER"));
    let ty = entries
        .iter()
        .find(|(tag, _)| *tag == "TY")
        .map(|(_, value)| value.to_uppercase())
        .unwrap_or_default();
    let chapter = matches!(ty.as_str(), "CHAP" | "ECHAP");

    let mut record = PartialRecord::new(Source::Ris);
    record.kind_hint = kind_for(&ty);
    let (mut start_page, mut end_page) = (None, None);
    for (tag, value) in &entries {
        let value = value.as_str();
        match *tag {
            "TY" => {}
            "AU" | "A1" => record.push_author(value),
            "A2" | "A3" | "ED" => record.push_editor(value),
            "TI" | "T1" if chapter => record.insert_new("chapter", value),
            "TI" | "T1" => record.insert_new("title", value),
            "T2" | "BT" => match ty.as_str() {
                "JOUR" | "EJOUR" | "MGZN" => record.insert_new("journal", value),
                "NEWS" => record.insert_new("newspaper", value),
                "CHAP" | "ECHAP" => record.insert_new("title", value),
                _ => record.insert_new("series", value),
            },
            "JO" | "JF" | "JA" | "J2" => record.insert_new("journal", value),
            "PY" | "Y1" | "DA" => {
                let date = slash_to_iso(value).unwrap_or_else(|| value.to_string());
                record.insert_new("date", &date);
            }
            "SP" => start_page = Some(value),
            "EP" => end_page = Some(value),
            "VL" => record.insert_new("volume", value),
            "IS" => record.insert_new("issue", value),
            "DO" => record.insert_new("doi", value),
            "SN" => record.insert_new(standard_number_field(value), value),
            "PB" => record.insert_new("publisher", value),
            "CY" | "PP" => record.insert_new("location", value),
            "UR" | "L2" => record.insert_new("url", value),
            "LA" => record.insert_new("language", value),
            "ET" => record.insert_new("edition", value),
            _ => debug!(tag, "RIS tag ignored"),
        }
    }
    match (start_page, end_page) {
        (Some(start), Some(end)) if !end.is_empty() && start != end => {
            record.insert("pages", &format_pages(&format!("{start}-{end}")));
        }
        (Some(start), _) => record.insert("pages", start),
        (None, _) => {}
    }
    record
}
