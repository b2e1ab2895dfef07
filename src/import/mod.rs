//! Reference-manager export formats pasted into a template in place of
//! parameters.

pub mod endnote;
pub mod ris;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::types::PartialRecord;

static ISSN_SHAPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-?\d{3}[\dXx]$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ris,
    EndNote,
}

/// Which export format, if any, a block of text is written in.
pub fn detect(text: &str) -> Option<Format> {
    if ris::looks_like(text) {
        Some(Format::Ris)
    } else if endnote::looks_like(text) {
        Some(Format::EndNote)
    } else {
        None
    }
}

/// Import a block of export text. None when the format is not recognised
/// or nothing usable was found.
pub fn import_record(text: &str) -> Option<PartialRecord> {
    let format = detect(text)?;
    let record = match format {
        Format::Ris => ris::import(text),
        Format::EndNote => endnote::import(text),
    };
    if record.is_empty() {
        return None;
    }
    info!(format = ?format, fields = record.len(), "record imported");
    Some(record)
}

/// A standard number field holds either an ISSN or an ISBN.
fn standard_number_field(value: &str) -> &'static str {
    if ISSN_SHAPE_RE.is_match(value.trim()) {
        "issn"
    } else {
        "isbn"
    }
}

/// Append continuation lines to the previous entry.
fn collect_entries<'a>(
    text: &'a str,
    tag_of: impl Fn(&'a str) -> Option<(&'a str, &'a str)>,
    end_tag: Option<&str>,
) -> Vec<(&'a str, String)> {
    let mut entries: Vec<(&str, String)> = Vec::new();
    for line in text.lines() {
        if let Some((tag, value)) = tag_of(line) {
            if Some(tag) == end_tag {
                break;
            }
            entries.push((tag, value.trim().to_string()));
        } else if let Some((_, value)) = entries.last_mut()
            && !line.trim().is_empty()
        {
            value.push(' ');
            value.push_str(line.trim());
        }
    }
    entries
}
