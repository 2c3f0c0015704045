use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The label used when a raw category key cannot be resolved.
pub const DEFAULT_SENTINEL: &str = "inne";

/// The outcome of resolving a raw category key.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Resolved<'a> {
    /// The key was found in the mapping table or already was a known label.
    Known(&'a str),
    /// The key was not recognized and the sentinel category was used.
    Fallback(&'a str),
}

impl<'a> Resolved<'a> {
    pub fn label(&self) -> &'a str {
        match self {
            Resolved::Known(s) | Resolved::Fallback(s) => s,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolved::Fallback(_))
    }
}

/// An immutable lookup from raw category keys (as stored in the snapshot's `category_fk` column)
/// to the human-readable labels written to the export.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CategoryMap {
    mapping: BTreeMap<String, String>,
    /// Labels that are accepted as-is when they show up in place of a key, stored lowercase.
    known: Vec<String>,
    sentinel: String,
}

impl Default for CategoryMap {
    fn default() -> Self {
        Self::new(BTreeMap::new(), Vec::<String>::new(), DEFAULT_SENTINEL)
    }
}

impl CategoryMap {
    pub fn new<S>(
        mapping: BTreeMap<String, String>,
        known: impl IntoIterator<Item = S>,
        sentinel: impl Into<String>,
    ) -> Self
    where
        S: AsRef<str>,
    {
        let mut known: Vec<String> = known
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .chain(mapping.values().map(|v| v.trim().to_lowercase()))
            .filter(|s| !s.is_empty())
            .collect();
        known.sort();
        known.dedup();
        Self {
            mapping,
            known,
            sentinel: sentinel.into(),
        }
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Resolves `key` to a label. Exact key matches win, then a case-insensitive match against the
    /// known labels, then the sentinel.
    pub fn resolve(&self, key: Option<&str>) -> Resolved<'_> {
        let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
            return Resolved::Fallback(&self.sentinel);
        };
        if let Some(label) = self.mapping.get(key) {
            return Resolved::Known(label);
        }
        let lower = key.to_lowercase();
        match self.known.binary_search(&lower) {
            Ok(ix) => Resolved::Known(&self.known[ix]),
            Err(_) => Resolved::Fallback(&self.sentinel),
        }
    }
}
