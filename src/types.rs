use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::kb;

/// Citation kind, derived from the template name and refined by classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Kind {
    Generic,
    Web,
    Arxiv,
    Journal,
    Book,
    Thesis,
    News,
    /// A `cite xxx` template this crate has no special rules for.
    Other(String),
}

impl Kind {
    /// Map a template name to a kind. Returns None for non-citation templates.
    /// "Cite  Web" → Web, "citation" → Generic, "cite conference" → Other("conference")
    pub fn from_template_name(name: &str) -> Option<Kind> {
        let normalized = name
            .replace('_', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if normalized == "citation" {
            return Some(Kind::Generic);
        }
        let rest = normalized.strip_prefix("cite ")?;
        Some(match rest {
            "web" => Kind::Web,
            "journal" => Kind::Journal,
            "book" => Kind::Book,
            "arxiv" => Kind::Arxiv,
            "thesis" => Kind::Thesis,
            "news" | "newspaper" => Kind::News,
            other => Kind::Other(other.to_string()),
        })
    }

    /// Specificity used by reclassification: a kind may only be replaced by
    /// one of strictly higher rank.
    pub fn rank(&self) -> u8 {
        match self {
            Kind::Generic => 0,
            Kind::Web => 1,
            Kind::Arxiv => 2,
            Kind::Journal | Kind::Book | Kind::Thesis | Kind::News | Kind::Other(_) => 3,
        }
    }

    pub fn template_name(&self) -> String {
        match self {
            Kind::Generic => "citation".to_string(),
            Kind::Web => "cite web".to_string(),
            Kind::Arxiv => "cite arxiv".to_string(),
            Kind::Journal => "cite journal".to_string(),
            Kind::Book => "cite book".to_string(),
            Kind::Thesis => "cite thesis".to_string(),
            Kind::News => "cite news".to_string(),
            Kind::Other(name) => format!("cite {name}"),
        }
    }
}

/// Where a parameter's current value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Present, under this name, in the input text.
    Original,
    /// Present in the input under another spelling or number.
    Renamed,
    /// Inferred or imported during processing.
    Derived,
    /// Supplied by an external lookup.
    Verified,
}

impl Provenance {
    /// Whether the value was guessed rather than written by someone.
    pub fn is_inferred(self) -> bool {
        self == Provenance::Derived
    }
}

/// Identifier kinds understood by external lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IdKind {
    Doi,
    Pmid,
    Pmc,
    Arxiv,
    Jstor,
    Isbn,
    Issn,
}

impl IdKind {
    pub const LOOKUP_ORDER: [IdKind; 6] = [
        IdKind::Doi,
        IdKind::Pmid,
        IdKind::Pmc,
        IdKind::Arxiv,
        IdKind::Jstor,
        IdKind::Isbn,
    ];

    pub fn param_name(self) -> &'static str {
        match self {
            IdKind::Doi => "doi",
            IdKind::Pmid => "pmid",
            IdKind::Pmc => "pmc",
            IdKind::Arxiv => "arxiv",
            IdKind::Jstor => "jstor",
            IdKind::Isbn => "isbn",
            IdKind::Issn => "issn",
        }
    }
}

/// Origin of a PartialRecord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Source {
    Ris,
    EndNote,
    Lookup(IdKind),
}

/// An unordered bibliographic field bag from an importer or a lookup.
/// Author-like fields are kept as ordinal families (last1, first1, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRecord {
    pub source: Source,
    pub kind_hint: Option<Kind>,
    fields: HashMap<String, String>,
}

impl PartialRecord {
    pub fn new(source: Source) -> Self {
        PartialRecord {
            source,
            kind_hint: None,
            fields: HashMap::new(),
        }
    }

    /// Set a field, ignoring blank values. Later values replace earlier ones.
    pub fn insert(&mut self, name: &str, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            self.fields.insert(name.to_lowercase(), value.to_string());
        }
    }

    /// Set a field unless it already holds a value.
    pub fn insert_new(&mut self, name: &str, value: &str) {
        if self.get(name).is_none() {
            self.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.kind_hint.is_none()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Next unused ordinal across the given roles (1-based).
    pub fn next_ordinal(&self, roles: &[&str]) -> u32 {
        self.fields
            .keys()
            .filter_map(|key| {
                let (base, ordinal) = kb::split_ordinal(key);
                roles.contains(&base).then_some(ordinal.unwrap_or(1))
            })
            .max()
            .map_or(1, |max| max.saturating_add(1))
    }

    /// Append a personal or organisational name to the author family.
    pub fn push_author(&mut self, name: &str) {
        let n = self.next_ordinal(&["last", "first", "author"]);
        match crate::normalize::names::split_name(name) {
            crate::normalize::names::NameParts::Person { last, first } => {
                self.insert(&format!("last{n}"), &last);
                self.insert(&format!("first{n}"), &first);
            }
            crate::normalize::names::NameParts::Single(whole) => {
                self.insert(&format!("author{n}"), &whole);
            }
        }
    }

    /// Append an editor, unsplit.
    pub fn push_editor(&mut self, name: &str) {
        let n = self.next_ordinal(&["editor"]);
        self.insert(&format!("editor{n}"), name);
    }

    /// Fields in canonical citation order, so merges insert deterministically.
    pub fn ordered_fields(&self) -> Vec<(&str, &str)> {
        let mut fields: Vec<(&str, &str)> = self
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        fields.sort_by(|a, b| {
            kb::emission_key(a.0)
                .cmp(&kb::emission_key(b.0))
                .then(a.0.cmp(b.0))
        });
        fields
    }
}

/// Outcome of an external lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(PartialRecord),
    NotFound,
    /// Transient failure: nothing learned, nothing cached.
    Skipped,
}

/// A problem noticed during processing that does not alter the output text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "flag", content = "value", rename_all = "snake_case")]
pub enum Flag {
    BrokenDoi(String),
    InvalidIsbn(String),
    InvalidIssn(String),
    /// An inferred value failed validation and was not stored.
    RejectedInference(String),
    FixpointCap,
}

/// How `issn` is treated once a `journal` name is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IssnPolicy {
    /// Keep `issn` only when `journal` was in the original input as written;
    /// drop it when the journal name was added or renamed during processing.
    #[default]
    KeepWithOriginalJournal,
    DropWithJournal,
    Keep,
}

/// Processing options for one run.
#[derive(Debug, Clone)]
pub struct Options {
    pub issn_policy: IssnPolicy,
    pub max_passes: usize,
    /// Date stamped into broken-identifier markers.
    pub today: NaiveDate,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            issn_policy: IssnPolicy::default(),
            max_passes: 10,
            today: chrono::Local::now().date_naive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_names_map_to_kinds() {
        assert_eq!(Kind::from_template_name("Cite web "), Some(Kind::Web));
        assert_eq!(Kind::from_template_name("cite  arXiv"), Some(Kind::Arxiv));
        assert_eq!(Kind::from_template_name("Citation"), Some(Kind::Generic));
        assert_eq!(
            Kind::from_template_name("cite_conference"),
            Some(Kind::Other("conference".to_string()))
        );
        assert_eq!(Kind::from_template_name("Reflist"), None);
    }

    #[test]
    fn record_authors_fill_contiguous_ordinals() {
        let mut record = PartialRecord::new(Source::Ris);
        record.push_author("Shannon, Claude E.");
        record.push_author("Weaver, Warren");
        record.push_author("ATLAS Collaboration");
        assert_eq!(record.get("last1"), Some("Shannon"));
        assert_eq!(record.get("first1"), Some("Claude E"));
        assert_eq!(record.get("last2"), Some("Weaver"));
        assert_eq!(record.get("author3"), Some("ATLAS Collaboration"));
        assert_eq!(record.next_ordinal(&["last", "first", "author"]), 4);
    }

    #[test]
    fn ordered_fields_follow_canonical_order() {
        let mut record = PartialRecord::new(Source::EndNote);
        record.insert("volume", "58");
        record.insert("first1", "Herbert H");
        record.insert("title", "Hearers and Speech Acts");
        record.insert("last1", "Clark");
        record.insert("last2", "Carlson");
        record.insert("first2", "Thomas B");
        let names: Vec<&str> = record.ordered_fields().iter().map(|f| f.0).collect();
        assert_eq!(
            names,
            vec!["title", "last1", "first1", "last2", "first2", "volume"]
        );
    }
}
