//! Ordered secondary index.

use crate::index::key::{extract_keys, IndexValue};
use crate::schema::IndexDef;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Maps index keys to the primary keys of the records holding them.
///
/// Supports equality lookups and range scans; results come back in index
/// order, ties broken by primary key.
#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    def: IndexDef,
    entries: BTreeMap<IndexValue, BTreeSet<String>>,
}

impl SecondaryIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new(def: IndexDef) -> Self {
        Self {
            def,
            entries: BTreeMap::new(),
        }
    }

    /// The index definition.
    #[must_use]
    pub fn def(&self) -> &IndexDef {
        &self.def
    }

    /// Adds the entries of `record`, stored under primary key `pk`.
    pub fn insert(&mut self, pk: &str, record: &Value) {
        for key in extract_keys(&self.def, record) {
            self.entries.entry(key).or_default().insert(pk.to_string());
        }
    }

    /// Removes the entries of `record`, stored under primary key `pk`.
    pub fn remove(&mut self, pk: &str, record: &Value) {
        for key in extract_keys(&self.def, record) {
            if let Some(pks) = self.entries.get_mut(&key) {
                pks.remove(pk);
                if pks.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }

    /// Primary keys of records holding exactly `key`.
    #[must_use]
    pub fn lookup(&self, key: &IndexValue) -> Vec<String> {
        self.entries
            .get(key)
            .map(|pks| pks.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// `(key, primary key)` pairs within the bounds, in index order.
    ///
    /// Empty or inverted bounds yield nothing.
    #[must_use]
    pub fn range(&self, lower: Bound<&IndexValue>, upper: Bound<&IndexValue>) -> Vec<(IndexValue, String)> {
        if !bounds_are_valid(lower, upper) {
            return Vec::new();
        }
        self.entries
            .range::<IndexValue, _>((lower, upper))
            .flat_map(|(key, pks)| pks.iter().map(move |pk| (key.clone(), pk.clone())))
            .collect()
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }
}

/// Whether `BTreeMap::range` accepts the bounds and they can match anything.
pub(crate) fn bounds_are_valid(lower: Bound<&IndexValue>, upper: Bound<&IndexValue>) -> bool {
    match (lower, upper) {
        (Bound::Included(lo), Bound::Included(hi)) => lo <= hi,
        (Bound::Included(lo) | Bound::Excluded(lo), Bound::Excluded(hi))
        | (Bound::Excluded(lo), Bound::Included(hi)) => lo < hi,
        _ => true,
    }
}

/// Whether `key` falls within the bounds.
pub(crate) fn within(key: &IndexValue, lower: Bound<&IndexValue>, upper: Bound<&IndexValue>) -> bool {
    let above = match lower {
        Bound::Included(lo) => key >= lo,
        Bound::Excluded(lo) => key > lo,
        Bound::Unbounded => true,
    };
    let below = match upper {
        Bound::Included(hi) => key <= hi,
        Bound::Excluded(hi) => key < hi,
        Bound::Unbounded => true,
    };
    above && below
}
