//! Committed in-memory state of a store.

use crate::error::{CoreError, CoreResult};
use crate::index::SecondaryIndex;
use crate::schema::IndexDef;
use crate::wal::LogOp;
use serde_json::Value;
use std::collections::BTreeMap;

/// Records and indexes of one collection.
#[derive(Debug, Clone)]
pub(crate) struct CollectionData {
    pub key_field: String,
    pub records: BTreeMap<String, Value>,
    pub indexes: BTreeMap<String, SecondaryIndex>,
}

impl CollectionData {
    fn new(key_field: String) -> Self {
        Self {
            key_field,
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    fn put(&mut self, key: &str, value: Value) {
        if let Some(old) = self.records.get(key) {
            for index in self.indexes.values_mut() {
                index.remove(key, old);
            }
        }
        for index in self.indexes.values_mut() {
            index.insert(key, &value);
        }
        self.records.insert(key.to_string(), value);
    }

    fn delete(&mut self, key: &str) {
        if let Some(old) = self.records.remove(key) {
            for index in self.indexes.values_mut() {
                index.remove(key, &old);
            }
        }
    }

    fn create_index(&mut self, def: &IndexDef) {
        if self.indexes.contains_key(&def.name) {
            return;
        }
        let mut index = SecondaryIndex::new(def.clone());
        for (key, value) in &self.records {
            index.insert(key, value);
        }
        self.indexes.insert(def.name.clone(), index);
    }
}

/// Everything committed so far.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    /// Schema version; zero for a store that was never initialised.
    pub version: u32,
    pub collections: BTreeMap<String, CollectionData>,
}

impl StoreState {
    pub fn collection(&self, name: &str) -> Option<&CollectionData> {
        self.collections.get(name)
    }

    /// Applies committed operations in order.
    ///
    /// Operations are validated before they are logged, so a failure here
    /// means the log itself is inconsistent.
    pub fn apply(&mut self, ops: &[LogOp]) -> CoreResult<()> {
        for op in ops {
            match op {
                LogOp::CreateCollection {
                    collection,
                    key_field,
                } => {
                    self.collections
                        .entry(collection.clone())
                        .or_insert_with(|| CollectionData::new(key_field.clone()));
                }
                LogOp::CreateIndex { collection, index } => {
                    self.collection_mut(collection)?.create_index(index);
                }
                LogOp::Put {
                    collection,
                    key,
                    value,
                } => self.collection_mut(collection)?.put(key, value.clone()),
                LogOp::Delete { collection, key } => self.collection_mut(collection)?.delete(key),
                LogOp::SetVersion { version } => self.version = *version,
            }
        }
        Ok(())
    }

    fn collection_mut(&mut self, name: &str) -> CoreResult<&mut CollectionData> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| CoreError::corruption(format!("operation on unknown collection {name}")))
    }
}
