// Row selectors - wildcard matching on row fields with include/exclude scoping
use serde::Deserialize;
use std::collections::BTreeMap;

use super::row::{Row, RowField};
use super::stream::normalize;

/// A single match string. A leading and/or trailing `*` turns it into a
/// suffix, prefix or substring match. Both sides are normalised like stream
/// names, so case and whitespace runs versus `-` do not matter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Pattern {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl TryFrom<String> for Pattern {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let starts = raw.starts_with('*');
        let ends = raw.len() > 1 && raw.ends_with('*');
        let inner = raw.trim_start_matches('*').trim_end_matches('*');
        if inner.contains('*') {
            return Err(format!("invalid match string: {}", raw));
        }
        let inner = normalize(inner);
        Ok(match (starts, ends) {
            (true, true) => Pattern::Contains(inner),
            (true, false) => Pattern::Suffix(inner),
            (false, true) => Pattern::Prefix(inner),
            (false, false) => Pattern::Exact(inner),
        })
    }
}

impl Pattern {
    pub fn matches(&self, text: &str) -> bool {
        let text = normalize(text);
        match self {
            Pattern::Exact(m) => text == *m,
            Pattern::Prefix(m) => text.starts_with(m.as_str()),
            Pattern::Suffix(m) => text.ends_with(m.as_str()),
            Pattern::Contains(m) => text.contains(m.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PatternSet {
    One(Pattern),
    Many(Vec<Pattern>),
}

impl PatternSet {
    fn matches(&self, text: &str) -> bool {
        match self {
            PatternSet::One(p) => p.matches(text),
            PatternSet::Many(ps) => ps.iter().any(|p| p.matches(text)),
        }
    }
}

/// Field-wise conjunction of pattern sets. An empty matcher accepts every row.
pub type FieldMatch = BTreeMap<RowField, PatternSet>;

fn field_match(matcher: &FieldMatch, row: &Row) -> bool {
    matcher
        .iter()
        .all(|(field, patterns)| patterns.matches(&row.field_text(*field)))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ScopedSelector {
    #[serde(default)]
    include: Option<FieldMatch>,
    #[serde(default)]
    exclude: Option<FieldMatch>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSelector {
    Scoped(ScopedSelector),
    Plain(FieldMatch),
}

/// Picks rows out of a run's row-set. Written either as a plain field map
/// (`{ node = "bldg*" }`) or as `{ include = {..}, exclude = {..} }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawSelector")]
pub struct Selector {
    include: FieldMatch,
    exclude: Option<FieldMatch>,
}

impl TryFrom<RawSelector> for Selector {
    type Error = String;

    fn try_from(raw: RawSelector) -> Result<Self, Self::Error> {
        match raw {
            RawSelector::Scoped(ScopedSelector {
                include: None,
                exclude: None,
            }) => Err("selector must define `include` and/or `exclude`".to_string()),
            RawSelector::Scoped(scoped) => Ok(Self {
                include: scoped.include.unwrap_or_default(),
                exclude: scoped.exclude,
            }),
            RawSelector::Plain(map) if map.is_empty() => {
                Err("selector must match on at least one field".to_string())
            }
            RawSelector::Plain(map) => Ok(Self {
                include: map,
                exclude: None,
            }),
        }
    }
}

impl Selector {
    pub fn matches(&self, row: &Row) -> bool {
        field_match(&self.include, row)
            && !self
                .exclude
                .as_ref()
                .map(|ex| field_match(ex, row))
                .unwrap_or(false)
    }

    /// Rows accepted by this selector, in input order.
    pub fn select<'a>(&self, rows: &'a [Row]) -> Vec<&'a Row> {
        rows.iter().filter(|r| self.matches(r)).collect()
    }
}
