//! One citation template: parse, run the processing pipeline, serialize.
//!
//! Escaped regions are masked before anything looks at the text and only
//! restored on output, so no rule ever rewrites a comment or a nowiki block.
//! Serializing an untouched template gives back its input byte for byte.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::classify;
use crate::import::import_record;
use crate::kb;
use crate::lookup::{Lookup, NoLookup};
use crate::normalize::identifiers::{clean_doi, is_valid_doi, isbn_checksum_ok};
use crate::normalize::{self, Context, fields};
use crate::params::{ParamStore, Parameter};
use crate::tidy;
use crate::tokenizer::{has_placeholder, mask_escapes, split_top_level, strip_placeholders, unmask};
use crate::types::{Flag, IdKind, Kind, LookupOutcome, Options, PartialRecord, Provenance};

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:https?://|ftp://|www\.)\S+$").unwrap());

static HOST_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}/\S*$").unwrap()
});

static DOI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:doi\s*:\s*)?10\.\d{4,9}/\S+$").unwrap());

static ARXIV_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:arxiv:\s*([a-z\-]+(?:\.[a-z]{2})?/\d{7}(?:v\d+)?)|(?:arxiv:\s*)?(\d{4}\.\d{4,5}(?:v\d+)?))$",
    )
    .unwrap()
});

static ISBN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^isbn(?:-1[03])?\s*:?\s*([\dX][\dX\- ]{8,16}[\dX])$").unwrap());

static LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(title|authors|author|journal|publisher|location|volume|vol|issue|number|no|pages|page|pp|p|year|date)\b(\.?)([\s:=\-]*)",
    )
    .unwrap()
});

static NEXT_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[\s,;]+(?:volume|vol|issue|number|no|pages|page|pp|p|year)\b").unwrap()
});

static NUMERIC_VALUE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]?\d").unwrap());

/// Labels whose value is a number, so another label may follow on the same line.
const NUMERIC_LABELS: &[&str] = &["volume", "issue", "pages", "page", "year"];

/// Whether the text after a label word really separates a label from its
/// value: "title: X", "vol. 3", "issue- 9", "title  X", or a number straight
/// after a numeric label. "Journal of X" and "Author's note" are not labels.
fn is_label_separator(name: &str, dot: &str, sep: &str, body: &str) -> bool {
    if !dot.is_empty() || sep.contains(':') || sep.contains('=') {
        return true;
    }
    if sep.contains('-') {
        return sep.ends_with(char::is_whitespace);
    }
    if sep.chars().count() >= 2 {
        return true;
    }
    (NUMERIC_LABELS.contains(&name) || name == "date") && body.starts_with(|c: char| c.is_ascii_digit())
}

const AUTHOR_ROLES: &[&str] = &["last", "first", "author"];

/// Longest author list taken from a lookup.
const MAX_LOOKUP_AUTHORS: u32 = 30;

fn label_param(label: &str) -> &'static str {
    match label.to_ascii_lowercase().as_str() {
        "title" => "title",
        "authors" => "authors",
        "author" => "author",
        "journal" => "journal",
        "publisher" => "publisher",
        "location" => "location",
        "volume" | "vol" => "volume",
        "issue" | "number" | "no" => "issue",
        "pages" | "pp" => "pages",
        "page" | "p" => "page",
        "year" => "year",
        _ => "date",
    }
}

/// Read free text such as "vol. 22 pp. 5-6" as labelled fields. Any text
/// that is not covered by a label makes the whole reading fail.
fn labelled_fields(text: &str) -> Option<Vec<(String, String)>> {
    let mut fields = Vec::new();
    let mut rest = text.trim();
    while !rest.is_empty() {
        let caps = LABEL_RE.captures(rest)?;
        let name = label_param(&caps[1]);
        let body = &rest[caps.get(0)?.end()..];
        if !is_label_separator(name, &caps[2], &caps[3], body) {
            return None;
        }
        if NUMERIC_LABELS.contains(&name) {
            let end = NEXT_LABEL_RE.find(body).map_or(body.len(), |m| m.start());
            let value = body[..end].trim();
            if !NUMERIC_VALUE_RE.is_match(value) {
                return None;
            }
            fields.push((name.to_string(), value.to_string()));
            rest = body[end..].trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == ';');
        } else {
            let value = body.trim();
            if value.is_empty() {
                return None;
            }
            fields.push((name.to_string(), value.to_string()));
            rest = "";
        }
    }
    (!fields.is_empty()).then_some(fields)
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// What a positional value turned out to be.
struct Reading {
    kind_hint: Option<Kind>,
    fields: Vec<(String, String)>,
    provenance: Provenance,
}

impl Reading {
    fn field(name: &str, value: &str) -> Self {
        Reading {
            kind_hint: None,
            fields: vec![(name.to_string(), value.to_string())],
            provenance: Provenance::Derived,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Template {
    original: String,
    /// Name as written, whitespace and masked escapes included.
    name: String,
    kind: Kind,
    citation: bool,
    params: ParamStore,
    escapes: Vec<String>,
    flags: Vec<Flag>,
}

impl Template {
    /// Parse `{{name|param|...}}`. Returns None unless the text is a whole template.
    pub fn parse(text: &str) -> Option<Template> {
        let inner = text.strip_prefix("{{")?.strip_suffix("}}")?;
        let (masked, escapes) = mask_escapes(inner);
        let mut parts = split_top_level(&masked, '|').into_iter();
        let name = parts.next()?.to_string();
        let params = ParamStore::from_params(parts.map(Parameter::parse).collect());
        let kind = Kind::from_template_name(&strip_placeholders(&name));
        Some(Template {
            original: text.to_string(),
            name,
            citation: kind.is_some(),
            kind: kind.unwrap_or(Kind::Generic),
            params,
            escapes,
            flags: Vec::new(),
        })
    }

    pub fn parsed_text(&self) -> String {
        let mut out = String::from("{{");
        out.push_str(&self.name);
        for param in self.params.params() {
            out.push('|');
            param.write_to(&mut out);
        }
        out.push_str("}}");
        unmask(&out, &self.escapes)
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn changed(&self) -> bool {
        self.parsed_text() != self.original
    }

    /// Template name as written, trimmed.
    pub fn name(&self) -> String {
        unmask(self.name.trim(), &self.escapes)
    }

    /// "Cite  Web <!-- x -->" → "cite web"
    pub fn wikiname(&self) -> String {
        strip_placeholders(&self.name)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn is_citation(&self) -> bool {
        self.citation
    }

    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }

    pub fn params(&self) -> &ParamStore {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.params.get(name).map(|value| unmask(value, &self.escapes))
    }

    pub fn has(&self, name: &str) -> bool {
        self.params.has(name)
    }

    pub fn add_if_new(&mut self, name: &str, value: &str) -> bool {
        self.params.add_if_new(name, value, Provenance::Derived)
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.params.set(name, value, Provenance::Derived);
    }

    pub fn forget(&mut self, name: &str) -> bool {
        self.params.remove(name).is_some()
    }

    /// "Last, First" of the first author, or the single-field author name.
    pub fn first_author(&self) -> Option<String> {
        if let Some(author) = self.params.get_nth("author", 1)
            && !author.trim().is_empty()
        {
            return Some(unmask(author.trim(), &self.escapes));
        }
        let last = self.params.get_nth("last", 1)?.trim();
        let name = match self.params.get_nth("first", 1).map(str::trim) {
            Some(first) if !first.is_empty() => format!("{last}, {first}"),
            _ => last.to_string(),
        };
        Some(unmask(&name, &self.escapes))
    }

    /// Process without external lookups.
    pub fn process(&mut self, options: &Options) {
        self.process_with(&NoLookup, options);
    }

    /// Full pipeline. Non-citation templates are left alone.
    pub fn process_with(&mut self, lookup: &dyn Lookup, options: &Options) {
        if !self.citation {
            return;
        }
        {
            let mut ctx = Context::new(&self.kind, options, &mut self.flags);
            fields::correct_names(&mut self.params, &mut ctx);
        }
        self.use_positional();
        let mut passes = normalize::run_to_fixpoint(&mut self.params, &mut self.kind, options, &mut self.flags);
        if self.expand(lookup) {
            passes += normalize::run_to_fixpoint(&mut self.params, &mut self.kind, options, &mut self.flags);
        }
        classify::reclassify(&mut self.kind, &self.params);
        tidy::tidy(&mut self.params, &self.kind, options);
        self.rename_for_kind();
        debug!(template = %self.wikiname(), passes, changed = self.changed(), "template processed");
    }

    /// Give positional values a name when their shape says what they are.
    fn use_positional(&mut self) -> bool {
        let mut changed = false;
        let mut i = 0;
        while i < self.params.len() {
            let param = self.params.at(i);
            if !param.is_positional() || param.value.trim().is_empty() || has_placeholder(&param.value) {
                i += 1;
                continue;
            }
            let value = param.value.clone();
            let Some(reading) = self.read_positional(&value) else {
                i += 1;
                continue;
            };
            let fields: Vec<(String, String)> = reading
                .fields
                .into_iter()
                .filter(|(name, _)| !self.params.has(name))
                .collect();
            if fields.is_empty() {
                i += 1;
                continue;
            }
            if let Some(hint) = reading.kind_hint {
                classify::upgrade(&mut self.kind, hint);
            }
            debug!(value = %value, fields = fields.len(), "positional value used");
            self.params.replace_with(i, &fields, reading.provenance);
            i += fields.len();
            changed = true;
        }
        changed
    }

    fn read_positional(&self, value: &str) -> Option<Reading> {
        let value = value.trim();
        if let Some(record) = import_record(value) {
            return Some(Reading {
                kind_hint: record.kind_hint.clone(),
                fields: record
                    .ordered_fields()
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
                provenance: Provenance::Derived,
            });
        }
        if URL_RE.is_match(value) || HOST_PATH_RE.is_match(value) {
            return Some(Reading::field("url", value));
        }
        if DOI_RE.is_match(value) {
            let doi = clean_doi(value);
            return is_valid_doi(&doi).then(|| Reading::field("doi", &doi));
        }
        if let Some(caps) = ARXIV_RE.captures(value) {
            let id = caps.get(1).or_else(|| caps.get(2))?;
            return Some(Reading::field("arxiv", id.as_str()));
        }
        if let Some(caps) = ISBN_RE.captures(value) {
            let isbn = caps[1].trim();
            return isbn_checksum_ok(isbn).then(|| Reading::field("isbn", isbn));
        }
        if let Some(fields) = labelled_fields(value) {
            // Typed with their labels; only the names are new.
            return Some(Reading {
                kind_hint: None,
                fields,
                provenance: Provenance::Renamed,
            });
        }
        if kb::is_organisation(value) {
            let slot = if self.params.family("author").is_empty() {
                "author".to_string()
            } else {
                format!("author{}", self.params.next_ordinal(&["author"]))
            };
            return Some(Reading::field(&slot, value));
        }
        None
    }

    fn lookup_id(&self, kind: IdKind) -> Option<String> {
        let value = match kind {
            IdKind::Arxiv => self.params.get("arxiv").or_else(|| self.params.get("eprint")),
            _ => self.params.get(kind.param_name()),
        };
        let value = value?.trim();
        (!value.is_empty() && !has_placeholder(value)).then(|| value.to_string())
    }

    /// Query each identifier the template carries and merge what is found.
    pub fn expand(&mut self, lookup: &dyn Lookup) -> bool {
        let mut changed = false;
        for id_kind in IdKind::LOOKUP_ORDER {
            let Some(id) = self.lookup_id(id_kind) else {
                continue;
            };
            match lookup.lookup(id_kind, &id) {
                LookupOutcome::Found(record) => {
                    info!(kind = ?id_kind, id = %id, fields = record.len(), "lookup found record");
                    changed |= self.merge(&record);
                }
                LookupOutcome::NotFound => debug!(kind = ?id_kind, id = %id, "lookup found nothing"),
                LookupOutcome::Skipped => debug!(kind = ?id_kind, id = %id, "lookup skipped"),
            }
        }
        changed
    }

    /// Verified data fills gaps and replaces inferred values; it never
    /// touches what the input itself said.
    fn merge(&mut self, record: &PartialRecord) -> bool {
        let mut changed = false;
        if let Some(hint) = &record.kind_hint {
            changed |= classify::upgrade(&mut self.kind, hint.clone());
        }
        let has_authors = self.params.has("authors")
            || AUTHOR_ROLES.iter().any(|role| !self.params.family(role).is_empty());
        let has_editors = !self.params.family("editor").is_empty();
        let truncated = !has_authors && record.next_ordinal(AUTHOR_ROLES) > MAX_LOOKUP_AUTHORS + 1;
        for (name, value) in record.ordered_fields() {
            let (base, ordinal) = kb::split_ordinal(name);
            if (has_authors && AUTHOR_ROLES.contains(&base)) || (has_editors && base == "editor") {
                continue;
            }
            if AUTHOR_ROLES.contains(&base) && ordinal.unwrap_or(1) > MAX_LOOKUP_AUTHORS {
                continue;
            }
            let replaces_guess = self
                .params
                .get_param(name)
                .is_some_and(|p| p.provenance.is_inferred() && p.value.trim() != value);
            if replaces_guess {
                self.params.set(name, value, Provenance::Verified);
                changed = true;
            } else {
                changed |= self.params.add_if_new(name, value, Provenance::Verified);
            }
        }
        if truncated {
            debug!(max = MAX_LOOKUP_AUTHORS, "long author list cut");
            let shown = (MAX_LOOKUP_AUTHORS - 1).to_string();
            changed |= self.params.add_if_new("displayauthors", &shown, Provenance::Verified);
        }
        changed
    }

    /// Rename a `cite ...` template after its kind was upgraded.
    fn rename_for_kind(&mut self) -> bool {
        if has_placeholder(&self.name) {
            return false;
        }
        let written = self.name.trim();
        let Some(current) = Kind::from_template_name(written) else {
            return false;
        };
        if current == Kind::Generic || current == self.kind {
            return false;
        }
        let mut renamed = self.kind.template_name();
        if written.starts_with(char::is_uppercase) {
            renamed = capitalize(&renamed);
        }
        info!(from = written, to = %renamed, "template renamed");
        let lead_len = self.name.len() - self.name.trim_start().len();
        self.name = format!("{}{renamed}", &self.name[..lead_len]);
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::lookup::MapLookup;
    use crate::types::Source;

    fn options() -> Options {
        Options {
            today: NaiveDate::from_ymd_opt(2024, 3, 1).expect("should be a valid date"),
            ..Options::default()
        }
    }

    fn process(text: &str) -> Template {
        let mut template = Template::parse(text).expect("should parse template");
        template.process(&options());
        template
    }

    fn process_with(text: &str, lookup: &MapLookup) -> Template {
        let mut template = Template::parse(text).expect("should parse template");
        template.process_with(lookup, &options());
        template
    }

    fn record(source: Source, fields: &[(&str, &str)]) -> PartialRecord {
        let mut record = PartialRecord::new(source);
        for (name, value) in fields {
            record.insert(name, value);
        }
        record
    }

    #[test]
    fn nothing_to_do_round_trips() {
        for text in [
            "{{Cite web | text without equals sign  }}",
            "{{  No pipe  }}",
            "{{cite journal| p=546 |doi=10.1103/PhysRev.57.546|title=Nuclear Fission of Separated Uranium Isotopes |journal=Physical Review |volume=57 |issue=6 |year=1940 |last1=Nier |first1=Alfred O. |last2=Booth |first2=E. T. |last3=Dunning |first3=J. R. |last4=Grosse |first4=A. V. }}",
            "{{cite journal|bibcode= 1975STIN...7615344H |title= Development of a transmission error model and an error control model  |volume= 76 |author1= Hammond |first1= J. L. |last2= Brown |first2= J. E. |last3= Liu |first3= S. S. S. |year= 1975}}",
            "{{cite journal|url=http://books.google.com/books?id=p-IDAAAAMBAJ&lpg=PA195&dq=Popular%20Science%201930%20plane%20%22Popular%20Mechanics%22&pg=PA194#v=onepage&q&f=true |title=The Passing of the Carrier Pigeon|journal=Popular Mechanics |date=February 1930|pages= 340}}",
        ] {
            let template = process(text);
            assert_eq!(template.parsed_text(), text);
            assert!(!template.changed());
        }
    }

    #[test]
    fn unnamed_values_are_used() {
        let t = process(
            "{{Cite web | http://google.com | title  I am a title | auhtor = Other, A. N. | issue- 9 | vol. 22 pp. 5-6 }}",
        );
        assert_eq!(t.wikiname(), "cite web");
        assert_eq!(t.get("url").as_deref(), Some("http://google.com"));
        assert_eq!(t.get("title").as_deref(), Some("I am a title"));
        assert_eq!(t.get("author").as_deref(), Some("Other, A. N."));
        assert_eq!(t.get("issue").as_deref(), Some("9"));
        assert_eq!(t.get("volume").as_deref(), Some("22"));
        assert_eq!(t.get("pages").as_deref(), Some("5–6"));
    }

    #[test]
    fn identifier_urls_become_identifiers() {
        let cases = [
            ("{{Cite web | www.jstor.org/stable/pdfplus/1701972.pdf?&acceptTC=true}}", "jstor", "1701972"),
            ("{{Cite web | http://www.ncbi.nlm.nih.gov/pubmed/1941451?dopt=AbstractPlus}}", "pmid", "1941451"),
            ("{{Cite web | http://www.ncbi.nlm.nih.gov/pmc/articles/PMC154623/}}", "pmc", "154623"),
            (
                "{{Cite web | http://onlinelibrary.wiley.com/doi/10.1111/j.1475-4983.2012.01203.x/abstract}}",
                "doi",
                "10.1111/j.1475-4983.2012.01203.x",
            ),
        ];
        for (text, name, id) in cases {
            let t = process(text);
            assert_eq!(t.wikiname(), "cite journal", "{text}");
            assert_eq!(t.get(name).as_deref(), Some(id));
            assert_eq!(t.get("url"), None);
        }
    }

    #[test]
    fn amazon_link_is_a_book() {
        let t = process(
            "{{Cite web | http://www.amazon.com/On-Origin-Phyla-James-Valentine/dp/0226845494 | accessdate=2012-04-20}}",
        );
        assert_eq!(t.wikiname(), "cite book");
        assert_eq!(t.get("asin").as_deref(), Some("0226845494"));
        assert_eq!(t.get("accessdate"), None);
    }

    #[test]
    fn preprints_with_a_journal_become_journal_citations() {
        let lookup = MapLookup::new().with(
            IdKind::Arxiv,
            "0806.0013",
            record(Source::Lookup(IdKind::Arxiv), &[("journal", "Physical Review D")]),
        );
        let t = process_with("{{Cite web | http://uk.arxiv.org/abs/0806.0013}}", &lookup);
        assert_eq!(t.wikiname(), "cite journal");
        assert_eq!(t.get("arxiv").as_deref(), Some("0806.0013"));

        let t = process_with(
            "{{Cite arxiv | eprint = 0806.0013 | class=forgetit|publisher=uk.arxiv}}",
            &lookup,
        );
        assert_eq!(t.wikiname(), "cite journal");
        assert_eq!(t.get("arxiv").as_deref(), Some("0806.0013"));
        assert_eq!(t.get("class"), None);
        assert_eq!(t.get("eprint"), None);
        assert_eq!(t.get("publisher"), None);
    }

    #[test]
    fn eprint_alone_makes_an_arxiv_citation() {
        let t = process("{{Cite web | eprint=1203.0149}}");
        assert_eq!(t.name(), "Cite arxiv");
        assert_eq!(*t.kind(), Kind::Arxiv);
    }

    #[test]
    fn garbage_removed_and_spacing_kept() {
        let t = process(
            "{{Cite web | pages=10-11| Edition = 3rd ed. |journal=My Journal| issn=1234-4321 | publisher=Unwarranted |issue=0|accessdate=2013-01-01|quotes=no}}",
        );
        assert_eq!(
            t.parsed_text(),
            "{{Cite journal| pages=10–11| edition = 3rd |journal=My Journal| issn=1234-4321 }}"
        );
        assert_eq!(t.flags(), &[Flag::InvalidIssn("1234-4321".to_string())]);

        let t = process("{{Cite web | Journal=My Journal| issn=1234-4321 | publisher=Unwarranted }}");
        assert_eq!(t.parsed_text(), "{{Cite journal| journal=My Journal}}");
    }

    #[test]
    fn issn_policy_is_configurable() {
        let text = "{{Cite web | Journal=My Journal| issn=1234-4321 }}";
        let mut t = Template::parse(text).expect("should parse template");
        t.process(&Options { issn_policy: crate::types::IssnPolicy::Keep, ..options() });
        assert_eq!(t.get("issn").as_deref(), Some("1234-4321"));

        let mut t = Template::parse("{{cite journal|journal=J|issn=0097-3157}}").expect("should parse template");
        t.process(&Options { issn_policy: crate::types::IssnPolicy::DropWithJournal, ..options() });
        assert_eq!(t.get("issn"), None);
    }

    #[test]
    fn processing_twice_changes_nothing_more() {
        for text in [
            "{{Cite web | pages=10-11| Edition = 3rd ed. |journal=My Journal| issn=1234-4321 | publisher=Unwarranted |issue=0|accessdate=2013-01-01|quotes=no}}",
            "{{cite book |auths=Alfred A Albertstein, Bertie B Benchmark, Charlie C. Chapman et al. }}",
            "{{Cite journal|pp. 1-5}}",
            "{{cite web|Journal=J|Journal=J}}",
        ] {
            let once = process(text).parsed_text();
            let twice = process(&once).parsed_text();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn repeated_capitalised_names_settle_in_one_run() {
        let t = process("{{cite web|Journal=J|Journal=J}}");
        assert_eq!(t.parsed_text(), "{{cite journal|journal=J}}");

        let t = process("{{cite web|Title=A|Title=B}}");
        assert_eq!(t.parsed_text(), "{{cite web|Title=A|Title=B}}");
    }

    #[test]
    fn huge_ordinal_does_not_stop_processing() {
        let text = "{{cite book|title=T|last4294967295=X}}";
        let t = process(text);
        assert_eq!(t.parsed_text(), text);
    }

    #[test]
    fn broken_doi_marked() {
        let t = process(
            "{{cite journal|doi=10.3265/Nefrologia.pre2010.May.10269|title=Acute renal failure due to multiple stings by Africanized bees. Report on 43 cases}}",
        );
        assert_eq!(t.get("doi-broken-date"), None);

        let t = process(
            "{{cite journal|doi=10.3265/Nefrologia.NOTAREALDOI.broken|title=Acute renal failure due to multiple stings by Africanized bees. Report on 43 cases}}",
        );
        assert_eq!(t.get("doi-broken-date").as_deref(), Some("2024-03-01"));
        assert_eq!(t.get("doi").as_deref(), Some("10.3265/Nefrologia.NOTAREALDOI.broken"));
    }

    #[test]
    fn escapes_are_never_touched() {
        let t = process("{{cite book <!-- no --> | pages=3<nowiki>-</nowiki>6}}");
        assert_eq!(t.parsed_text(), "{{cite book <!-- no --> | pages=3<nowiki>-</nowiki>6}}");
        assert_eq!(t.wikiname(), "cite book");
        assert_eq!(t.get("pages").as_deref(), Some("3<nowiki>-</nowiki>6"));
    }

    #[test]
    fn sici_extraction() {
        let t = process("{{cite journal|url=http://fake.url/0097-3157(2002)152[0215:HPOVBM]2.0.CO;2}}");
        assert_eq!(t.get("issn").as_deref(), Some("0097-3157"));
        assert_eq!(t.get("year").as_deref(), Some("2002"));
        assert_eq!(t.get("volume").as_deref(), Some("152"));
        assert_eq!(t.get("pages").as_deref(), Some("215"));

        let t = process(
            "{{cite journal|date=2002|journal=SET|url=http:/1/fake.url/0097-3157(2002)152[0215:HPOVBM]2.0.CO;2}}",
        );
        assert_eq!(t.get("issn"), None);
        assert_eq!(t.get("date").as_deref(), Some("2002"));
        assert_eq!(t.get("year"), None);
        assert_eq!(t.get("volume").as_deref(), Some("152"));
        assert_eq!(t.get("pages").as_deref(), Some("215"));
    }

    #[test]
    fn misspelt_parameters() {
        let t = process(
            "{{Cite journal | ahtour=S.-X. HU, M.-Y. ZHU, F.-C. ZHAO, and M. STEINER|tutle=A crown group priapulid from the early Cambrian Guanshan Lagerstätte,|jrounal=Geol. Mag.|pp. 1–5|year= 2017.}}",
        );
        assert!(t.get("author").is_some());
        assert!(t.get("title").is_some());
        assert_eq!(t.get("journal").as_deref(), Some("Geol. Mag."));
        assert_eq!(t.get("pages").as_deref(), Some("1–5"));
        assert_eq!(t.get("year").as_deref(), Some("2017"));

        let mut t = process(
            "{{Cite journal | ahtour=S.-X. HU, M.-Y. ZHU, F.-C. ZHAO, and M. STEINER|tutel=A crown group priapulid from the early Cambrian Guanshan Lagerstätte,|jrounal=Geol. Mag.|pp. 1–5|year= 2017.}}",
        );
        assert!(t.get("author").is_some());
        assert!(t.get("tutel").is_some());
        assert!(t.get("title").is_none());
        assert!(t.get("journal").is_some());

        assert!(t.add_if_new("albumlink", "http://album.com"));
        assert_eq!(t.get("titlelink").as_deref(), Some("http://album.com"));

        let t = process("{{Cite journal|pp. 1-5}}");
        assert_eq!(t.get("pages").as_deref(), Some("1–5"));
    }

    #[test]
    fn google_books_link_canonicalised() {
        let t = process(
            "{{Cite web | http://books.google.co.uk/books/about/Wonderful_Life.html?id=SjpSkzjIzfsC&redir_esc=y}}",
        );
        assert_eq!(t.wikiname(), "cite book");
        assert_eq!(t.get("url").as_deref(), Some("https://books.google.com/?id=SjpSkzjIzfsC"));
    }

    #[test]
    fn lookup_fills_in_press_dates() {
        let pmid = record(
            Source::Lookup(IdKind::Pmid),
            &[("year", "1999"), ("journal", "Molecular and Cellular Biology")],
        );
        let lookup = MapLookup::new().with(IdKind::Pmid, "9858585", pmid);
        for text in [
            "{{Cite journal|pmid=9858585|date =in press}}",
            "{{cite journal|pmid=9858585|year=in press}}",
        ] {
            let t = process_with(text, &lookup);
            assert_eq!(t.get("date"), None, "{text}");
            assert_eq!(t.get("year").as_deref(), Some("1999"));
            assert_eq!(t.get("journal").as_deref(), Some("Molecular and Cellular Biology"));
        }
    }

    #[test]
    fn lookup_keeps_input_and_replaces_guesses() {
        let found = record(
            Source::Lookup(IdKind::Doi),
            &[("title", "Verified Title"), ("pages", "1–6"), ("volume", "3")],
        );
        let lookup = MapLookup::new().with(IdKind::Doi, "10.1000/182", found);
        let t = process_with("{{cite journal|doi=10.1000/182|title=Mine|pp. 1-5}}", &lookup);
        assert_eq!(t.get("title").as_deref(), Some("Mine"));
        assert_eq!(t.get("pages").as_deref(), Some("1–5"));
        assert_eq!(t.get("volume").as_deref(), Some("3"));
        assert_eq!(
            t.params().get_param("volume").map(|p| p.provenance),
            Some(Provenance::Verified)
        );

        let mut t = Template::parse("{{cite journal|doi=10.1000/182|title=Mine}}").expect("should parse template");
        assert!(t.add_if_new("pages", "1-5"));
        assert!(t.expand(&lookup));
        assert_eq!(t.get("pages").as_deref(), Some("1–6"));
        assert_eq!(
            t.params().get_param("pages").map(|p| p.provenance),
            Some(Provenance::Verified)
        );
    }

    #[test]
    fn long_author_lists_from_lookup_are_cut() {
        let mut found = record(Source::Lookup(IdKind::Doi), &[("title", "Charged-particle multiplicities")]);
        for n in 1..=40 {
            found.push_author(&format!("Surname{n}, Given"));
        }
        let lookup = MapLookup::new().with(IdKind::Doi, "10.1016/j.physletb.2010.03.064", found);
        let t = process_with("{{cite web | 10.1016/j.physletb.2010.03.064}}", &lookup);
        assert_eq!(t.get("displayauthors").as_deref(), Some("29"));
        assert_eq!(t.get("last30").as_deref(), Some("Surname30"));
        assert_eq!(t.get("last31"), None);
        assert_eq!(t.get("first31"), None);
    }

    #[test]
    fn short_author_lists_from_lookup_are_whole() {
        let mut found = record(Source::Lookup(IdKind::Doi), &[]);
        found.push_author("Shannon, Claude");
        found.push_author("Weaver, Warren");
        let lookup = MapLookup::new().with(IdKind::Doi, "10.1000/182", found);
        let t = process_with("{{cite journal|doi=10.1000/182}}", &lookup);
        assert_eq!(t.get("last2").as_deref(), Some("Weaver"));
        assert_eq!(t.get("displayauthors"), None);
    }

    #[test]
    fn collaboration_from_lookup_is_one_author() {
        let mut arxiv = record(Source::Lookup(IdKind::Arxiv), &[("class", "hep-ex")]);
        arxiv.push_author("The ATLAS Collaboration");
        let lookup = MapLookup::new().with(IdKind::Arxiv, "1003.3124", arxiv);
        let t = process_with("{{cite web | https://arxiv.org/PS_cache/arxiv/pdf/1003/1003.3124v2.pdf}}", &lookup);
        assert_eq!(t.first_author().as_deref(), Some("The ATLAS Collaboration"));
        assert_eq!(t.get("class").as_deref(), Some("hep-ex"));
        assert_eq!(t.wikiname(), "cite arxiv");
    }

    #[test]
    fn organisation_positional_is_single_author() {
        let t = process("{{cite journal | ATLAS Collaboration |title=T}}");
        assert_eq!(t.get("author").as_deref(), Some("ATLAS Collaboration"));
        assert_eq!(t.get("last1"), None);
    }

    #[test]
    fn iso_year_moves_to_date() {
        let t = process("{{cite book |author=Me |title=Title |year=2007-08-01 }}");
        assert_eq!(t.get("date").as_deref(), Some("2007-08-01"));
        assert_eq!(t.get("year"), None);
    }

    #[test]
    fn ris_block_imported() {
        let t = process(
            "{{Cite journal  | TY - JOUR\nAU - Shannon, Claude E.\nPY - 1948/07//\nTI - A Mathematical Theory of Communication\nT2 - Bell System Technical Journal\nSP - 379\nEP - 423\nVL - 27\nER -  }}",
        );
        assert_eq!(t.get("title").as_deref(), Some("A Mathematical Theory of Communication"));
        assert_eq!(t.get("date").as_deref(), Some("1948-07"));
        assert_eq!(t.get("journal").as_deref(), Some("Bell System Technical Journal"));
        assert_eq!(t.first_author().as_deref(), Some("Shannon, Claude E"));
        assert_eq!(t.get("pages").as_deref(), Some("379–423"));
        assert_eq!(t.get("volume").as_deref(), Some("27"));
    }

    #[test]
    fn endnote_blocks_imported() {
        let book = "{{Cite book |\n%0 Book\n%A Geoffrey Chaucer\n%D 1957\n%T The Works of Geoffrey Chaucer\n%E F.\n%I Houghton\n%C Boston\n%N 2nd\n      }}";
        let t = process(book);
        assert_eq!(t.first_author().as_deref(), Some("Chaucer, Geoffrey"));
        assert_eq!(t.get("title").as_deref(), Some("The Works of Geoffrey Chaucer"));
        assert_eq!(t.get("date").as_deref(), Some("1957"));
        assert_eq!(t.get("publisher").as_deref(), Some("Houghton"));
        assert_eq!(t.get("location").as_deref(), Some("Boston"));

        let article = "{{Cite journal |\n%0 Journal Article\n%A Herbert H. Clark\n%D 1982\n%T Hearers and Speech Acts\n%B Language\n%V 58\n%P 332-373\n      }}";
        let t = process(article);
        assert_eq!(t.first_author().as_deref(), Some("Clark, Herbert H"));
        assert_eq!(t.get("volume").as_deref(), Some("58"));
        assert_eq!(t.get("pages").as_deref(), Some("332–373"));

        let thesis = "{{Citation | \n%0 Thesis\n%A Cantucci, Elena\n%T Permian strata in South-East Asia\n%D 1990\n%I University of California, Berkeley\n%R 10.1038/ntheses.01928\n%9 Dissertation}}";
        let t = process(thesis);
        assert_eq!(t.first_author().as_deref(), Some("Cantucci, Elena"));
        assert_eq!(t.get("publisher").as_deref(), Some("University of California, Berkeley"));
        assert_eq!(t.get("doi").as_deref(), Some("10.1038/ntheses.01928"));
        assert_eq!(*t.kind(), Kind::Thesis);
        assert_eq!(t.name(), "Citation");
    }

    #[test]
    fn et_al_author_lists_split() {
        let t = process("{{cite book |auths=Alfred A Albertstein, Bertie B Benchmark, Charlie C. Chapman et al. }}");
        assert_eq!(t.first_author().as_deref(), Some("Albertstein, Alfred A"));
        assert_eq!(t.get("first3").as_deref(), Some("Charlie C"));
        assert_eq!(t.get("displayauthors").as_deref(), Some("etal"));
    }

    #[test]
    fn website_read_as_url() {
        let t = process("{{cite book |website=ttp://example.org }}");
        assert_eq!(t.get("url").as_deref(), Some("http://example.org"));
        let t = process("{{cite book |website=ABC XYZ}}");
        assert_eq!(t.get("url"), None);
        assert_eq!(t.get("website").as_deref(), Some("ABC XYZ"));
    }

    #[test]
    fn editing_keeps_layout() {
        let mut t = Template::parse("{{cite book |title=T |year=in press }}").expect("should parse template");
        assert!(!t.has("year"));
        assert!(t.add_if_new("year", "1999"));
        t.set("title", "New");
        assert!(t.forget("year"));
        assert!(!t.forget("year"));
        assert_eq!(t.parsed_text(), "{{cite book |title=New }}");
        assert!(t.changed());
    }

    #[test]
    fn labelled_text_must_be_fully_covered() {
        assert_eq!(
            labelled_fields("vol. 22 pp. 5-6"),
            Some(vec![
                ("volume".to_string(), "22".to_string()),
                ("pages".to_string(), "5-6".to_string())
            ])
        );
        assert_eq!(labelled_fields("Page Smith wrote this"), None);
        assert_eq!(labelled_fields("no idea"), None);
        assert_eq!(
            labelled_fields("volume 3 issue: 2"),
            Some(vec![
                ("volume".to_string(), "3".to_string()),
                ("issue".to_string(), "2".to_string())
            ])
        );
    }

    #[test]
    fn label_words_need_a_separator() {
        for text in ["Journal of Chemistry", "Author's note", "Title page missing", "Date unknown", "Title-page"] {
            assert_eq!(labelled_fields(text), None, "{text}");
        }
        let text = "{{cite web | Journal of Chemistry |url=http://a.org}}";
        let t = process(text);
        assert_eq!(t.parsed_text(), text);
        assert_eq!(t.kind(), &Kind::Web);
    }

    #[test]
    fn labelled_values_count_as_input() {
        let t = process("{{cite journal| title: Mine |doi=10.1000/182}}");
        assert_eq!(t.get("title").as_deref(), Some("Mine"));
        assert_eq!(
            t.params().get_param("title").map(|p| p.provenance),
            Some(Provenance::Renamed)
        );
    }
}
