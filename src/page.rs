//! A whole document: literal text with citation templates in between.

use serde::Serialize;
use tracing::info;

use crate::lookup::{Lookup, NoLookup};
use crate::template::Template;
use crate::tokenizer::{self, Span};
use crate::types::{Flag, Kind, Options};

#[derive(Debug, Clone)]
enum Segment {
    /// Reproduced verbatim, including non-citation templates.
    Text(String),
    Citation(Box<Template>),
}

/// What happened to one citation.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateReport {
    pub original: String,
    pub expanded: String,
    pub kind: Kind,
    pub flags: Vec<Flag>,
    pub changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    segments: Vec<Segment>,
}

impl Page {
    pub fn parse_text(text: &str) -> Page {
        let segments = tokenizer::tokenize(text)
            .into_iter()
            .map(|span| match span {
                Span::Literal(text) => Segment::Text(text),
                Span::Template(text) => match Template::parse(&text) {
                    Some(template) if template.is_citation() => Segment::Citation(Box::new(template)),
                    _ => Segment::Text(text),
                },
            })
            .collect();
        Page { segments }
    }

    pub fn expand_text(&mut self, options: &Options) {
        self.expand_with(&NoLookup, options);
    }

    /// Process every citation in place. Templates are independent of each other.
    pub fn expand_with(&mut self, lookup: &dyn Lookup, options: &Options) {
        for segment in &mut self.segments {
            if let Segment::Citation(template) = segment {
                template.process_with(lookup, options);
            }
        }
        let changed = self.templates().filter(|t| t.changed()).count();
        info!(templates = self.templates().count(), changed, "page expanded");
    }

    pub fn parsed_text(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Citation(template) => out.push_str(&template.parsed_text()),
            }
        }
        out
    }

    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Citation(template) => Some(template.as_ref()),
            Segment::Text(_) => None,
        })
    }

    pub fn reports(&self) -> Vec<TemplateReport> {
        self.templates()
            .map(|t| TemplateReport {
                original: t.original().to_string(),
                expanded: t.parsed_text(),
                kind: t.kind().clone(),
                flags: t.flags().to_vec(),
                changed: t.changed(),
            })
            .collect()
    }
}
