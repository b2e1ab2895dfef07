//! Field normalizers and the bounded iterate-until-stable driver.
//!
//! Every rule takes the store and a context and reports whether it changed
//! anything. Rules never call each other; the driver reruns the whole list
//! (together with upgrade-only reclassification) until a pass changes nothing.

pub mod dates;
pub mod fields;
pub mod identifiers;
pub mod names;
pub mod pages;

use tracing::{debug, warn};

use crate::classify;
use crate::params::ParamStore;
use crate::types::{Flag, Kind, Options};

/// What a rule may read besides the store, and where it reports problems.
pub struct Context<'a> {
    pub kind: &'a Kind,
    pub options: &'a Options,
    flags: &'a mut Vec<Flag>,
}

impl<'a> Context<'a> {
    pub fn new(kind: &'a Kind, options: &'a Options, flags: &'a mut Vec<Flag>) -> Self {
        Context { kind, options, flags }
    }

    /// Record a flag once.
    pub fn flag(&mut self, flag: Flag) {
        if !self.flags.contains(&flag) {
            debug!(flag = ?flag, "flagged");
            self.flags.push(flag);
        }
    }
}

type Rule = fn(&mut ParamStore, &mut Context) -> bool;

/// Ordered rule list. Name-level corrections come first so later rules see
/// canonical names.
const RULES: &[(&str, Rule)] = &[
    ("names", fields::correct_names),
    ("website", fields::website_to_url),
    ("edition", fields::edition),
    ("author-lists", names::split_author_lists),
    ("dates", dates::normalize),
    ("pages", pages::normalize),
    ("url-identifiers", identifiers::from_url),
    ("sici", identifiers::sici),
    ("doi", identifiers::doi),
    ("isbn", identifiers::isbn),
    ("issn", identifiers::issn),
];

/// Run every rule once. Returns whether any rule changed the store.
pub fn run_pass(store: &mut ParamStore, ctx: &mut Context) -> bool {
    let mut changed = false;
    for (name, rule) in RULES {
        if rule(store, ctx) {
            debug!(rule = name, "rule applied");
            changed = true;
        }
    }
    changed
}

/// Alternate reclassification and rule passes until nothing changes or the
/// pass cap is hit. Returns the number of passes run.
pub fn run_to_fixpoint(
    store: &mut ParamStore,
    kind: &mut Kind,
    options: &Options,
    flags: &mut Vec<Flag>,
) -> usize {
    for pass in 1..=options.max_passes {
        let mut changed = classify::reclassify(kind, store);
        let mut ctx = Context::new(kind, options, flags);
        changed |= run_pass(store, &mut ctx);
        if !changed {
            return pass;
        }
    }
    warn!(max_passes = options.max_passes, "normalization did not settle");
    if !flags.contains(&Flag::FixpointCap) {
        flags.push(Flag::FixpointCap);
    }
    options.max_passes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameter;

    fn store(parts: &[&str]) -> ParamStore {
        ParamStore::from_params(parts.iter().map(|p| Parameter::parse(p)).collect())
    }

    #[test]
    fn settles_and_second_run_is_a_no_op() {
        let options = Options::default();
        let mut flags = Vec::new();
        let mut kind = Kind::Web;
        let mut s = store(&["Journal=J", "pages=pp. 1-5", "year=2007-08-01"]);
        let passes = run_to_fixpoint(&mut s, &mut kind, &options, &mut flags);
        assert!(passes >= 2);
        assert_eq!(kind, Kind::Journal);
        assert_eq!(s.get("pages"), Some("1–5"));
        assert_eq!(s.get("date"), Some("2007-08-01"));

        let before = s.clone();
        assert_eq!(run_to_fixpoint(&mut s, &mut kind, &options, &mut flags), 1);
        assert_eq!(s, before);
        assert!(flags.is_empty());
    }

    #[test]
    fn cap_is_reported() {
        let options = Options { max_passes: 1, ..Options::default() };
        let mut flags = Vec::new();
        let mut kind = Kind::Book;
        let mut s = store(&["pages=1-5"]);
        run_to_fixpoint(&mut s, &mut kind, &options, &mut flags);
        assert_eq!(flags, vec![Flag::FixpointCap]);
    }
}
