//! Read and read-write transactions.

use crate::error::{CoreError, CoreResult};
use crate::index::{bounds_are_valid, extract_keys, within, IndexValue};
use crate::schema::{Collection, IndexDef};
use crate::store::cursor::Cursor;
use crate::store::state::StoreState;
use crate::wal::LogOp;
use parking_lot::RwLockReadGuard;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;

/// Whether a transaction may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnMode {
    /// Reads only.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

/// A transaction over the store.
///
/// Reads see the state committed when the transaction began plus the
/// transaction's own writes. Writes are buffered and reach the commit log
/// and the shared state only when the transaction commits; dropping a
/// transaction discards them.
pub struct Transaction<'s> {
    snapshot: RwLockReadGuard<'s, StoreState>,
    mode: TxnMode,
    /// Pending record writes per collection; `None` marks a delete.
    overlay: HashMap<String, BTreeMap<String, Option<Value>>>,
    pending_collections: BTreeMap<String, String>,
    pending_indexes: BTreeMap<String, Vec<IndexDef>>,
    pending_version: Option<u32>,
    ops: Vec<LogOp>,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(snapshot: RwLockReadGuard<'s, StoreState>, mode: TxnMode) -> Self {
        Self {
            snapshot,
            mode,
            overlay: HashMap::new(),
            pending_collections: BTreeMap::new(),
            pending_indexes: BTreeMap::new(),
            pending_version: None,
            ops: Vec::new(),
        }
    }

    /// Consumes the transaction, releasing its snapshot.
    pub(crate) fn into_ops(self) -> Vec<LogOp> {
        self.ops
    }

    /// The transaction mode.
    #[must_use]
    pub fn mode(&self) -> TxnMode {
        self.mode
    }

    /// Schema version as seen by this transaction.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.pending_version.unwrap_or(self.snapshot.version)
    }

    /// Whether the collection exists.
    #[must_use]
    pub fn has_collection(&self, collection: Collection) -> bool {
        let name = collection.name();
        self.snapshot.collection(name).is_some() || self.pending_collections.contains_key(name)
    }

    /// Whether the collection has the named index.
    #[must_use]
    pub fn has_index(&self, collection: Collection, index: &str) -> bool {
        self.index_def(collection, index).is_some()
    }

    /// Names of the indexes on a collection.
    #[must_use]
    pub fn index_names(&self, collection: Collection) -> Vec<String> {
        let name = collection.name();
        let mut names: Vec<String> = self
            .snapshot
            .collection(name)
            .map(|d| d.indexes.keys().cloned().collect())
            .unwrap_or_default();
        if let Some(pending) = self.pending_indexes.get(name) {
            names.extend(pending.iter().map(|d| d.name.clone()));
        }
        names.sort();
        names
    }

    fn index_def(&self, collection: Collection, index: &str) -> Option<IndexDef> {
        let name = collection.name();
        self.snapshot
            .collection(name)
            .and_then(|d| d.indexes.get(index))
            .map(|i| i.def().clone())
            .or_else(|| {
                self.pending_indexes
                    .get(name)
                    .and_then(|defs| defs.iter().find(|d| d.name == index).cloned())
            })
    }

    fn ensure_writable(&self) -> CoreResult<()> {
        match self.mode {
            TxnMode::ReadWrite => Ok(()),
            TxnMode::ReadOnly => Err(CoreError::invalid_operation(
                "write attempted in a read-only transaction",
            )),
        }
    }

    fn ensure_collection(&self, collection: Collection) -> CoreResult<()> {
        if self.has_collection(collection) {
            Ok(())
        } else {
            Err(CoreError::schema(format!("collection {collection} does not exist")))
        }
    }

    /// Creates a collection unless it already exists. Returns whether it was
    /// created.
    pub fn create_collection(&mut self, collection: Collection) -> CoreResult<bool> {
        self.ensure_writable()?;
        if self.has_collection(collection) {
            return Ok(false);
        }
        let name = collection.name().to_string();
        let key_field = collection.key_field().to_string();
        self.pending_collections.insert(name.clone(), key_field.clone());
        self.ops.push(LogOp::CreateCollection {
            collection: name,
            key_field,
        });
        Ok(true)
    }

    /// Creates an index unless one with the same name exists. Returns
    /// whether it was created.
    pub fn create_index(&mut self, collection: Collection, def: &IndexDef) -> CoreResult<bool> {
        self.ensure_writable()?;
        self.ensure_collection(collection)?;
        if self.has_index(collection, &def.name) {
            return Ok(false);
        }
        let name = collection.name().to_string();
        self.pending_indexes
            .entry(name.clone())
            .or_default()
            .push(def.clone());
        self.ops.push(LogOp::CreateIndex {
            collection: name,
            index: def.clone(),
        });
        Ok(true)
    }

    /// Records a new schema version.
    pub fn set_version(&mut self, version: u32) -> CoreResult<()> {
        self.ensure_writable()?;
        self.pending_version = Some(version);
        self.ops.push(LogOp::SetVersion { version });
        Ok(())
    }

    /// Reads a record by primary key.
    pub fn get(&self, collection: Collection, key: &str) -> CoreResult<Option<Value>> {
        self.ensure_collection(collection)?;
        let name = collection.name();
        if let Some(pending) = self.overlay.get(name).and_then(|o| o.get(key)) {
            return Ok(pending.clone());
        }
        Ok(self
            .snapshot
            .collection(name)
            .and_then(|d| d.records.get(key))
            .cloned())
    }

    /// Whether a record with the key exists.
    pub fn contains(&self, collection: Collection, key: &str) -> CoreResult<bool> {
        Ok(self.get(collection, key)?.is_some())
    }

    fn record_key(collection: Collection, value: &Value) -> CoreResult<String> {
        let field = collection.key_field();
        match value.get(field) {
            Some(Value::String(key)) if !key.is_empty() => Ok(key.clone()),
            _ => Err(CoreError::malformed(format!(
                "{collection} record has no {field}"
            ))),
        }
    }

    /// Inserts or replaces a record. Returns its primary key.
    pub fn put(&mut self, collection: Collection, value: Value) -> CoreResult<String> {
        self.ensure_writable()?;
        self.ensure_collection(collection)?;
        if !value.is_object() {
            return Err(CoreError::malformed(format!("{collection} record is not an object")));
        }
        let key = Self::record_key(collection, &value)?;
        let name = collection.name().to_string();
        self.overlay
            .entry(name.clone())
            .or_default()
            .insert(key.clone(), Some(value.clone()));
        self.ops.push(LogOp::Put {
            collection: name,
            key: key.clone(),
            value,
        });
        Ok(key)
    }

    /// Inserts a record, failing with `DuplicateKey` if the key is taken.
    pub fn add(&mut self, collection: Collection, value: Value) -> CoreResult<String> {
        let key = Self::record_key(collection, &value)?;
        if self.contains(collection, &key)? {
            return Err(CoreError::duplicate_key(collection.name(), key));
        }
        self.put(collection, value)
    }

    /// Deletes a record. Returns whether it existed.
    pub fn delete(&mut self, collection: Collection, key: &str) -> CoreResult<bool> {
        self.ensure_writable()?;
        if !self.contains(collection, key)? {
            return Ok(false);
        }
        let name = collection.name().to_string();
        self.overlay
            .entry(name.clone())
            .or_default()
            .insert(key.to_string(), None);
        self.ops.push(LogOp::Delete {
            collection: name,
            key: key.to_string(),
        });
        Ok(true)
    }

    /// Up to `limit` records with keys after `after`, in key order.
    pub fn scan_page(
        &self,
        collection: Collection,
        after: Option<&str>,
        limit: usize,
    ) -> CoreResult<Vec<(String, Value)>> {
        self.ensure_collection(collection)?;
        let name = collection.name();
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        let empty_records = BTreeMap::new();
        let empty_overlay = BTreeMap::new();
        let records = self
            .snapshot
            .collection(name)
            .map_or(&empty_records, |d| &d.records);
        let overlay = self.overlay.get(name).unwrap_or(&empty_overlay);

        let mut committed = records
            .range::<str, _>((lower, Bound::Unbounded))
            .peekable();
        let mut pending = overlay
            .range::<str, _>((lower, Bound::Unbounded))
            .peekable();
        let mut page = Vec::new();

        while page.len() < limit {
            let take_pending = match (committed.peek(), pending.peek()) {
                (None, None) => break,
                (Some(_), None) => false,
                (None, Some(_)) => true,
                (Some((ck, _)), Some((pk, _))) => pk <= ck,
            };
            if take_pending {
                let Some((key, value)) = pending.next() else {
                    break;
                };
                if committed.peek().is_some_and(|(ck, _)| *ck == key) {
                    committed.next();
                }
                if let Some(value) = value {
                    page.push((key.clone(), value.clone()));
                }
            } else if let Some((key, value)) = committed.next() {
                page.push((key.clone(), value.clone()));
            }
        }
        Ok(page)
    }

    /// Every record of a collection, in key order.
    pub fn get_all(&self, collection: Collection) -> CoreResult<Vec<Value>> {
        Ok(self
            .scan_page(collection, None, usize::MAX)?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    /// Number of records in a collection.
    pub fn count(&self, collection: Collection) -> CoreResult<usize> {
        self.ensure_collection(collection)?;
        let name = collection.name();
        if !self.overlay.contains_key(name) {
            return Ok(self.snapshot.collection(name).map_or(0, |d| d.records.len()));
        }
        Ok(self.scan_page(collection, None, usize::MAX)?.len())
    }

    /// A lazy, paged scan over a collection.
    #[must_use]
    pub fn cursor(&self, collection: Collection, page_size: usize) -> Cursor<'_, 's> {
        Cursor::new(self, collection, page_size)
    }

    /// Records whose index key equals `key`.
    pub fn index_lookup(
        &self,
        collection: Collection,
        index: &str,
        key: &IndexValue,
    ) -> CoreResult<Vec<Value>> {
        self.index_range(collection, index, Bound::Included(key), Bound::Included(key))
    }

    /// Records with an index key within the bounds, in index order.
    ///
    /// A record matching through several keys of a multi-valued index is
    /// returned once, at its first matching key.
    pub fn index_range(
        &self,
        collection: Collection,
        index: &str,
        lower: Bound<&IndexValue>,
        upper: Bound<&IndexValue>,
    ) -> CoreResult<Vec<Value>> {
        self.ensure_collection(collection)?;
        let def = self.index_def(collection, index).ok_or_else(|| {
            CoreError::invalid_operation(format!("no index {index} on {collection}"))
        })?;
        if !bounds_are_valid(lower, upper) {
            return Ok(Vec::new());
        }

        let name = collection.name();
        let overlay = self.overlay.get(name);
        let committed = self.snapshot.collection(name);
        let mut hits: Vec<(IndexValue, String, Value)> = Vec::new();

        match committed.and_then(|d| d.indexes.get(index).map(|i| (d, i))) {
            Some((data, secondary)) => {
                for (key, pk) in secondary.range(lower, upper) {
                    if overlay.is_some_and(|o| o.contains_key(&pk)) {
                        continue;
                    }
                    if let Some(value) = data.records.get(&pk) {
                        hits.push((key, pk, value.clone()));
                    }
                }
                for (pk, value) in overlay.into_iter().flatten() {
                    let Some(value) = value else { continue };
                    for key in extract_keys(&def, value) {
                        if within(&key, lower, upper) {
                            hits.push((key, pk.clone(), value.clone()));
                        }
                    }
                }
            }
            None => {
                for (pk, value) in self.scan_page(collection, None, usize::MAX)? {
                    for key in extract_keys(&def, &value) {
                        if within(&key, lower, upper) {
                            hits.push((key, pk.clone(), value.clone()));
                        }
                    }
                }
            }
        }

        hits.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        let mut seen = HashSet::new();
        Ok(hits
            .into_iter()
            .filter(|(_, pk, _)| seen.insert(pk.clone()))
            .map(|(_, _, value)| value)
            .collect())
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("mode", &self.mode)
            .field("pending_ops", &self.ops.len())
            .finish_non_exhaustive()
    }
}
