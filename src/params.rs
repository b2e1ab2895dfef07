use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::kb;
use crate::tokenizer;
use crate::types::Provenance;

/// Text before `=` that can be a parameter name. Anything else (a URL with a
/// query string, a sentence) makes the whole part positional.
static PARAM_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[\p{L}\p{N}][\p{L}\p{N} _\-]*\s*$").unwrap());

/// One template parameter with the exact whitespace it was written with.
/// Serializes as `pre + name + eq + value + post`.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub pre: String,
    /// Name as written (trimmed); empty for positional parameters.
    pub name: String,
    /// Whitespace around and including `=`; empty for positional parameters.
    pub eq: String,
    pub value: String,
    pub post: String,
    pub provenance: Provenance,
}

/// Whitespace profile used for parameters created during processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    pub pre: String,
    pub eq: String,
    pub post: String,
}

impl Default for Format {
    fn default() -> Self {
        Format {
            pre: String::new(),
            eq: "=".to_string(),
            post: String::new(),
        }
    }
}

fn split_leading_ws(s: &str) -> (&str, &str) {
    let rest = s.trim_start();
    (&s[..s.len() - rest.len()], rest)
}

fn split_trailing_ws(s: &str) -> (&str, &str) {
    let body = s.trim_end();
    (body, &s[body.len()..])
}

impl Parameter {
    /// Parse one `|`-separated part of a template (escapes already masked).
    pub fn parse(text: &str) -> Parameter {
        if let Some(eq_pos) = tokenizer::find_top_level(text, '=')
            && PARAM_NAME_RE.is_match(&text[..eq_pos])
        {
            let (pre, name_part) = split_leading_ws(&text[..eq_pos]);
            let (name, before_eq) = split_trailing_ws(name_part);
            let (after_eq, value_part) = split_leading_ws(&text[eq_pos + 1..]);
            let (value, post) = split_trailing_ws(value_part);
            return Parameter {
                pre: pre.to_string(),
                name: name.to_string(),
                eq: format!("{before_eq}={after_eq}"),
                value: value.to_string(),
                post: post.to_string(),
                provenance: Provenance::Original,
            };
        }
        let (pre, rest) = split_leading_ws(text);
        let (value, post) = split_trailing_ws(rest);
        Parameter {
            pre: pre.to_string(),
            name: String::new(),
            eq: String::new(),
            value: value.to_string(),
            post: post.to_string(),
            provenance: Provenance::Original,
        }
    }

    pub fn named(name: &str, value: &str, format: &Format, provenance: Provenance) -> Parameter {
        Parameter {
            pre: format.pre.clone(),
            name: name.to_string(),
            eq: format.eq.clone(),
            value: value.to_string(),
            post: format.post.clone(),
            provenance,
        }
    }

    pub fn is_positional(&self) -> bool {
        self.eq.is_empty()
    }

    /// Lowercased name used for matching.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn write_to(&self, out: &mut String) {
        out.push_str(&self.pre);
        out.push_str(&self.name);
        out.push_str(&self.eq);
        out.push_str(&self.value);
        out.push_str(&self.post);
    }

    /// Give this slot a new name and value, keeping its surrounding
    /// whitespace. A positional parameter takes `=` from the format.
    pub fn make_named(&mut self, name: &str, value: &str, format: &Format, provenance: Provenance) {
        self.name = name.to_string();
        if self.eq.is_empty() {
            self.eq = format.eq.clone();
        }
        self.value = value.to_string();
        self.provenance = provenance;
    }
}

/// Whether a value counts as absent for `name`. A literal "in press" is no
/// date at all.
pub fn is_blank(name: &str, value: &str) -> bool {
    let value = tokenizer::strip_placeholders(value);
    let value = value.trim();
    value.is_empty()
        || (matches!(name, "date" | "year") && value.eq_ignore_ascii_case("in press"))
}

/// Ordered, case-insensitive, alias-aware parameter container.
///
/// Lookups resolve names through the misspelling table; writes never create
/// a second slot for a name that already resolves to an existing one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamStore {
    params: Vec<Parameter>,
}

impl ParamStore {
    pub fn from_params(params: Vec<Parameter>) -> Self {
        ParamStore { params }
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn at(&self, idx: usize) -> &Parameter {
        &self.params[idx]
    }

    pub fn at_mut(&mut self, idx: usize) -> &mut Parameter {
        &mut self.params[idx]
    }

    /// Index of the parameter answering to `name`: an exact (case-insensitive)
    /// match first, then any parameter whose name resolves to the same
    /// canonical name, in either direction through the alias table.
    pub fn position(&self, name: &str) -> Option<usize> {
        if let Some(i) = self.exact_position(name) {
            return Some(i);
        }
        let canonical = kb::canonical_name(name);
        self.params
            .iter()
            .position(|p| !p.is_positional() && kb::canonical_name(&p.key()) == canonical)
    }

    /// Index of the parameter written under exactly `name`, ignoring case.
    pub fn exact_position(&self, name: &str) -> Option<usize> {
        let key = name.trim().to_lowercase();
        self.params.iter().position(|p| !p.is_positional() && p.key() == key)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.params[i].value.as_str())
    }

    pub fn get_param(&self, name: &str) -> Option<&Parameter> {
        self.position(name).map(|i| &self.params[i])
    }

    /// Present with a non-blank value.
    pub fn has(&self, name: &str) -> bool {
        self.position(name)
            .is_some_and(|i| !is_blank(&kb::canonical_name(name), &self.params[i].value))
    }

    /// Set a value, overwriting whatever is there; appends when absent.
    pub fn set(&mut self, name: &str, value: &str, provenance: Provenance) {
        match self.position(name) {
            Some(i) => {
                let param = &mut self.params[i];
                if param.value != value {
                    param.value = value.to_string();
                    param.provenance = provenance;
                }
            }
            None => {
                let canonical = kb::canonical_name(name);
                let param = Parameter::named(&canonical, value, &self.format_profile(), provenance);
                self.append(param);
            }
        }
    }

    /// Reformat a value in place; where it came from does not change.
    pub fn rewrite(&mut self, name: &str, value: &str) -> bool {
        let Some(i) = self.position(name) else {
            return false;
        };
        let param = &mut self.params[i];
        if param.value == value {
            return false;
        }
        param.value = value.to_string();
        true
    }

    /// Add `name=value` unless a non-blank value is already present under the
    /// name or its alias target. A blank slot is filled in place.
    pub fn add_if_new(&mut self, name: &str, value: &str, provenance: Provenance) -> bool {
        let canonical = kb::canonical_name(name);
        if is_blank(&canonical, value) {
            return false;
        }
        match self.position(&canonical) {
            Some(i) if !is_blank(&canonical, &self.params[i].value) => false,
            Some(i) => {
                let param = &mut self.params[i];
                param.value = value.to_string();
                param.provenance = provenance;
                true
            }
            None => {
                let param = Parameter::named(&canonical, value, &self.format_profile(), provenance);
                self.append(param);
                true
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Parameter> {
        let i = self.position(name)?;
        Some(self.params.remove(i))
    }

    pub fn remove_at(&mut self, idx: usize) -> Parameter {
        self.params.remove(idx)
    }

    /// Rename in place, keeping formatting. Fails when `new` is already taken.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        let Some(i) = self.position(old) else {
            return false;
        };
        let target = kb::canonical_name(new);
        let taken = self.params.iter().enumerate().any(|(j, p)| {
            j != i && !p.is_positional() && kb::canonical_name(&p.key()) == target
        });
        if taken {
            return false;
        }
        let param = &mut self.params[i];
        param.name = new.to_string();
        if param.provenance == Provenance::Original {
            param.provenance = Provenance::Renamed;
        }
        true
    }

    /// The dominant whitespace style of the named parameters.
    pub fn format_profile(&self) -> Format {
        let named: Vec<&Parameter> = self.params.iter().filter(|p| !p.is_positional()).collect();
        if named.is_empty() {
            return Format::default();
        }
        // The last parameter's trailing whitespace belongs to the closing braces.
        let body = if named.len() > 1 { &named[..named.len() - 1] } else { &named[..] };
        Format {
            pre: most_common(named.iter().map(|p| p.pre.as_str())),
            eq: most_common(named.iter().map(|p| p.eq.as_str())),
            post: most_common(body.iter().map(|p| p.post.as_str())),
        }
    }

    pub fn append(&mut self, param: Parameter) {
        let idx = self.params.len();
        self.insert(idx, param);
    }

    /// Insert at `idx`. A parameter inserted at the end takes over the previous
    /// last parameter's trailing whitespace so the closing layout is unchanged.
    pub fn insert(&mut self, idx: usize, mut param: Parameter) {
        if idx == self.params.len() && idx > 0 {
            let post = self.format_profile().post;
            let last = &mut self.params[idx - 1];
            if last.post != post {
                param.post = std::mem::replace(&mut last.post, post);
            }
        }
        self.params.insert(idx, param);
    }

    /// Replace the parameter at `idx` with named parameters: the first takes
    /// over its slot, the rest follow it.
    pub fn replace_with(&mut self, idx: usize, fields: &[(String, String)], provenance: Provenance) {
        let Some((first, rest)) = fields.split_first() else {
            return;
        };
        let format = self.format_profile();
        self.params[idx].make_named(&first.0, &first.1, &format, provenance);
        for (offset, (name, value)) in rest.iter().enumerate() {
            let param = Parameter::named(name, value, &format, provenance);
            self.insert(idx + 1 + offset, param);
        }
    }

    /// Members of an ordinal family as (ordinal, index), sorted by ordinal.
    /// The bare role name counts as ordinal 1.
    pub fn family(&self, role: &str) -> Vec<(u32, usize)> {
        let mut members: Vec<(u32, usize)> = self
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_positional())
            .filter_map(|(i, p)| {
                let key = p.key();
                if key == role {
                    return Some((1, i));
                }
                match kb::split_ordinal(&key) {
                    (base, Some(n)) if base == role => Some((n, i)),
                    _ => None,
                }
            })
            .collect();
        members.sort();
        members
    }

    pub fn get_nth(&self, role: &str, n: u32) -> Option<&str> {
        self.family(role)
            .into_iter()
            .find(|(ordinal, _)| *ordinal == n)
            .map(|(_, i)| self.params[i].value.as_str())
    }

    /// Next unused ordinal across a set of roles sharing a numbering.
    pub fn next_ordinal(&self, roles: &[&str]) -> u32 {
        roles
            .iter()
            .flat_map(|role| self.family(role))
            .map(|(n, _)| n)
            .max()
            .map_or(1, |max| max.saturating_add(1))
    }

    /// Append a value under the next unused ordinal of `role`.
    pub fn append_to_family(&mut self, role: &str, value: &str, provenance: Provenance) -> u32 {
        let n = self.next_ordinal(&[role]);
        let param = Parameter::named(&format!("{role}{n}"), value, &self.format_profile(), provenance);
        self.append(param);
        n
    }

    /// Remove ordinal `n` from every role listed and shift higher ordinals
    /// down by one, so numbering stays contiguous and in order.
    pub fn remove_from_family(&mut self, roles: &[&str], n: u32) {
        self.params.retain(|p| {
            if p.is_positional() {
                return true;
            }
            let key = p.key();
            let (base, ordinal) = kb::split_ordinal(&key);
            !(roles.contains(&base) && ordinal.unwrap_or(1) == n)
        });
        for param in self.params.iter_mut().filter(|p| !p.is_positional()) {
            let key = param.key();
            if let (base, Some(ordinal)) = kb::split_ordinal(&key)
                && roles.contains(&base)
                && ordinal > n
            {
                param.name = format!("{base}{}", ordinal - 1);
                if param.provenance == Provenance::Original {
                    param.provenance = Provenance::Renamed;
                }
            }
        }
    }
}

fn most_common<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (order, value) in values.enumerate() {
        counts.entry(value).or_insert((0, order)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.0.cmp(&b.1.0).then(b.1.1.cmp(&a.1.1)))
        .map(|(value, _)| value.to_string())
        .unwrap_or_default()
}
