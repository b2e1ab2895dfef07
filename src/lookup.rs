use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::normalize::pages::format_pages;
use crate::types::{IdKind, Kind, LookupOutcome, PartialRecord, Source};

/// An external bibliographic database queried by identifier.
pub trait Lookup {
    fn lookup(&self, kind: IdKind, id: &str) -> LookupOutcome;
}

/// Offline processing: every query is skipped.
pub struct NoLookup;

impl Lookup for NoLookup {
    fn lookup(&self, _kind: IdKind, _id: &str) -> LookupOutcome {
        LookupOutcome::Skipped
    }
}

/// Fixed answers keyed by identifier; anything else is not found.
#[derive(Default)]
pub struct MapLookup {
    records: HashMap<(IdKind, String), PartialRecord>,
}

impl MapLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: IdKind, id: &str, record: PartialRecord) -> Self {
        self.records.insert((kind, id.to_string()), record);
        self
    }
}

impl Lookup for MapLookup {
    fn lookup(&self, kind: IdKind, id: &str) -> LookupOutcome {
        match self.records.get(&(kind, id.to_string())) {
            Some(record) => LookupOutcome::Found(record.clone()),
            None => LookupOutcome::NotFound,
        }
    }
}

/// SQLite store of lookup responses. A NULL body records a negative answer.
pub struct LookupCache {
    conn: Connection,
}

impl LookupCache {
    /// Open the cache in `dir`, or in the user cache directory.
    pub fn open(dir: Option<PathBuf>) -> Result<Self> {
        let cache_dir = match dir {
            Some(dir) => dir,
            None => dirs::cache_dir()
                .context("Could not determine cache directory")?
                .join("citetidy"),
        };
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
        let conn = Connection::open(cache_dir.join("lookup_cache.db"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS lookup_cache (
                key TEXT PRIMARY KEY,
                body TEXT,
                created_at INTEGER NOT NULL
            )",
        )?;
        Ok(Self { conn })
    }

    /// None = not cached, Some(None) = negative hit, Some(Some(body)) = cached response.
    pub fn get(&self, key: &str) -> Result<Option<Option<String>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM lookup_cache WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub fn put(&self, key: &str, body: Option<&str>) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.conn.execute(
            "INSERT OR REPLACE INTO lookup_cache (key, body, created_at) VALUES (?1, ?2, ?3)",
            params![key, body, now],
        )?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct WorkResponse {
    message: Work,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Work {
    title: Vec<String>,
    #[serde(rename = "container-title")]
    container_title: Vec<String>,
    volume: Option<String>,
    issue: Option<String>,
    page: Option<String>,
    #[serde(rename = "ISSN")]
    issn: Vec<String>,
    #[serde(rename = "ISBN")]
    isbn: Vec<String>,
    author: Vec<Contributor>,
    editor: Vec<Contributor>,
    issued: Option<Issued>,
    publisher: Option<String>,
    #[serde(rename = "type")]
    work_type: Option<String>,
}

#[derive(Deserialize)]
struct Contributor {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}

impl Contributor {
    /// "Family, Given", or the name as given for organisations.
    fn display(&self) -> Option<String> {
        match (&self.family, &self.given, &self.name) {
            (Some(family), Some(given), _) => Some(format!("{family}, {given}")),
            (Some(family), None, _) => Some(family.clone()),
            (None, _, Some(name)) => Some(name.clone()),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct Issued {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i64>>>,
}

impl Issued {
    /// "2010-03" from [[2010, 3]]
    fn iso(&self) -> Option<String> {
        let parts = self.date_parts.first()?;
        let mut iter = parts.iter().map_while(|p| *p);
        let mut date = iter.next()?.to_string();
        for part in iter.take(2) {
            date.push_str(&format!("-{part:02}"));
        }
        Some(date)
    }
}

enum Response {
    Body(String),
    NotFound,
    Transient,
}

/// DOI metadata from the CrossRef REST API.
pub struct CrossrefLookup {
    cache: Option<LookupCache>,
}

impl CrossrefLookup {
    pub fn new(cache: Option<LookupCache>) -> Self {
        Self { cache }
    }
}

impl Lookup for CrossrefLookup {
    fn lookup(&self, kind: IdKind, id: &str) -> LookupOutcome {
        if kind != IdKind::Doi {
            return LookupOutcome::Skipped;
        }
        let key = format!("doi:{}", id.to_lowercase());
        if let Some(cache) = &self.cache
            && let Ok(Some(cached)) = cache.get(&key)
        {
            debug!(doi = id, "lookup cache hit");
            return match cached.as_deref().and_then(record_from_work) {
                Some(record) => LookupOutcome::Found(record),
                None => LookupOutcome::NotFound,
            };
        }
        let outcome = match query_crossref(id) {
            Response::Body(body) => match record_from_work(&body) {
                Some(record) => {
                    self.remember(&key, Some(&body));
                    LookupOutcome::Found(record)
                }
                None => {
                    self.remember(&key, None);
                    LookupOutcome::NotFound
                }
            },
            Response::NotFound => {
                self.remember(&key, None);
                LookupOutcome::NotFound
            }
            Response::Transient => LookupOutcome::Skipped,
        };
        debug!(doi = id, found = matches!(outcome, LookupOutcome::Found(_)), "crossref lookup");
        outcome
    }
}

impl CrossrefLookup {
    fn remember(&self, key: &str, body: Option<&str>) {
        if let Some(cache) = &self.cache
            && let Err(err) = cache.put(key, body)
        {
            warn!(error = %err, "failed to write lookup cache");
        }
    }
}

fn query_crossref(doi: &str) -> Response {
    let url = format!(
        "https://api.crossref.org/works/{}",
        doi.replace(' ', "%20").replace('#', "%23").replace('?', "%3F")
    );
    let resp = match ureq::get(&url)
        .header("User-Agent", concat!("citetidy/", env!("CARGO_PKG_VERSION")))
        .call()
    {
        Ok(resp) => resp,
        Err(ureq::Error::StatusCode(404)) => return Response::NotFound,
        Err(_) => return Response::Transient,
    };
    if resp.status() == 429 {
        return Response::Transient;
    }
    if resp.status() != 200 {
        return Response::NotFound;
    }
    match resp.into_body().read_to_string() {
        Ok(body) => Response::Body(body),
        Err(_) => Response::Transient,
    }
}

fn kind_for(work_type: &str) -> Option<Kind> {
    Some(match work_type {
        "journal-article" => Kind::Journal,
        "book" | "monograph" | "edited-book" | "reference-book" | "book-chapter" => Kind::Book,
        "dissertation" => Kind::Thesis,
        _ => return None,
    })
}

/// Map a CrossRef work message onto citation fields.
fn record_from_work(body: &str) -> Option<PartialRecord> {
    let work = serde_json::from_str::<WorkResponse>(body).ok()?.message;
    let mut record = PartialRecord::new(Source::Lookup(IdKind::Doi));
    let work_type = work.work_type.as_deref().unwrap_or_default();
    record.kind_hint = kind_for(work_type);

    let title = work.title.first().map(String::as_str).unwrap_or_default();
    let container = work.container_title.first().map(String::as_str).unwrap_or_default();
    match work_type {
        "book-chapter" => {
            record.insert("chapter", title);
            record.insert("title", container);
        }
        "journal-article" => {
            record.insert("title", title);
            record.insert("journal", container);
        }
        _ => record.insert("title", title),
    }
    for author in work.author.iter().filter_map(Contributor::display) {
        record.push_author(&author);
    }
    for editor in work.editor.iter().filter_map(Contributor::display) {
        record.push_editor(&editor);
    }
    if let Some(date) = work.issued.as_ref().and_then(Issued::iso) {
        record.insert("date", &date);
    }
    record.insert("volume", work.volume.as_deref().unwrap_or_default());
    record.insert("issue", work.issue.as_deref().unwrap_or_default());
    if let Some(page) = &work.page {
        record.insert("pages", &format_pages(page));
    }
    if let Some(issn) = work.issn.first() {
        record.insert("issn", issn);
    }
    if let Some(isbn) = work.isbn.first() {
        record.insert("isbn", isbn);
    }
    if work_type != "journal-article" {
        record.insert("publisher", work.publisher.as_deref().unwrap_or_default());
    }
    (!record.is_empty()).then_some(record)
}
