//! Parse, normalize and re-serialize citation templates embedded in
//! wiki-style documents.

pub mod classify;
pub mod import;
pub mod kb;
pub mod lookup;
pub mod normalize;
pub mod page;
pub mod params;
pub mod template;
pub mod tidy;
pub mod tokenizer;
pub mod types;

pub use lookup::{CrossrefLookup, Lookup, LookupCache, MapLookup, NoLookup};
pub use page::{Page, TemplateReport};
pub use template::Template;
pub use types::{Flag, IdKind, IssnPolicy, Kind, LookupOutcome, Options, PartialRecord};
