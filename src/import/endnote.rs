//! EndNote/refer export: one `%X value` line per field.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::{collect_entries, standard_number_field};
use crate::normalize::dates::slash_to_iso;
use crate::normalize::pages::format_pages;
use crate::types::{Kind, PartialRecord, Source};

static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*%(\S)\s+(.*)$").unwrap());

/// Two field lines make a record; one could be chance.
pub fn looks_like(text: &str) -> bool {
    text.lines().filter(|line| CODE_RE.is_match(line)).take(2).count() == 2
}

fn code_of(line: &str) -> Option<(&str, &str)> {
    let caps = CODE_RE.captures(line)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

fn kind_for(record_type: &str) -> Option<Kind> {
    Some(match record_type.to_lowercase().as_str() {
        "journal article" | "magazine article" => Kind::Journal,
        "book" | "edited book" | "book section" => Kind::Book,
        "thesis" => Kind::Thesis,
        "newspaper article" => Kind::News,
        "web page" | "electronic source" => Kind::Web,
        _ => return None,
    })
}

/// Parse one EndNote record. Unknown codes are skipped.
pub fn import(text: &str) -> PartialRecord {
    let entries = collect_entries(text, code_of, None);
    let record_type = entries
        .iter()
        .find(|(code, _)| *code == "0")
        .map(|(_, value)| value.to_lowercase())
        .unwrap_or_default();
    let article = matches!(record_type.as_str(), "journal article" | "magazine article");
    let section = record_type == "book section";
    let book = matches!(record_type.as_str(), "book" | "edited book");

    let mut record = PartialRecord::new(Source::EndNote);
    record.kind_hint = kind_for(&record_type);
    for (code, value) in &entries {
        let value = value.as_str();
        match *code {
            "0" => {}
            "A" => record.push_author(value),
            "E" => record.push_editor(value),
            "D" => {
                let date = slash_to_iso(value).unwrap_or_else(|| value.to_string());
                record.insert_new("date", &date);
            }
            "T" if section => record.insert_new("chapter", value),
            "T" => record.insert_new("title", value),
            "B" if article => record.insert_new("journal", value),
            "B" if section => record.insert_new("title", value),
            "B" => record.insert_new("series", value),
            "J" => record.insert_new("journal", value),
            "V" => record.insert_new("volume", value),
            "N" if book => record.insert_new("edition", value),
            "N" => record.insert_new("issue", value),
            "7" => record.insert_new("edition", value),
            "P" => record.insert_new("pages", &format_pages(value)),
            "I" => record.insert_new("publisher", value),
            "C" => record.insert_new("location", value),
            "R" if value.starts_with("10.") => record.insert_new("doi", value),
            "R" => record.insert_new("id", value),
            "9" => record.insert_new("type", value),
            "U" => record.insert_new("url", value),
            "@" => record.insert_new(standard_number_field(value), value),
            "G" => record.insert_new("language", value),
            _ => debug!(code, "EndNote field ignored"),
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_record() {
        let record = import(
            "\n%0 Book\n%A Geoffrey Chaucer\n%D 1957\n%T The Works of Geoffrey Chaucer\n%E F.\n%I Houghton\n%C Boston\n%N 2nd\n      ",
        );
        assert_eq!(record.kind_hint, Some(Kind::Book));
        assert_eq!(record.get("last1"), Some("Chaucer"));
        assert_eq!(record.get("first1"), Some("Geoffrey"));
        assert_eq!(record.get("date"), Some("1957"));
        assert_eq!(record.get("editor1"), Some("F."));
        assert_eq!(record.get("edition"), Some("2nd"));
        assert_eq!(record.get("issue"), None);
        assert_eq!(record.get("location"), Some("Boston"));
    }

    #[test]
    fn article_record() {
        let record = import(
            "%0 Journal Article\n%A Herbert H. Clark\n%D 1982\n%T Hearers and Speech Acts\n%B Language\n%V 58\n%P 332-373",
        );
        assert_eq!(record.kind_hint, Some(Kind::Journal));
        assert_eq!(record.get("first1"), Some("Herbert H"));
        assert_eq!(record.get("journal"), Some("Language"));
        assert_eq!(record.get("pages"), Some("332–373"));
    }

    #[test]
    fn thesis_record() {
        let record = import(
            "%0 Thesis\n%A Cantucci, Elena\n%T Permian strata in South-East Asia\n%D 1990\n%I University of California, Berkeley\n%R 10.1038/ntheses.01928\n%9 Dissertation",
        );
        assert_eq!(record.kind_hint, Some(Kind::Thesis));
        assert_eq!(record.get("author1"), None);
        assert_eq!(record.get("last1"), Some("Cantucci"));
        assert_eq!(record.get("publisher"), Some("University of California, Berkeley"));
        assert_eq!(record.get("doi"), Some("10.1038/ntheses.01928"));
        assert_eq!(record.get("type"), Some("Dissertation"));
    }
}
