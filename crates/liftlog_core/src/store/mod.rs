//! The versioned key-value store.
//!
//! A [`Store`] is one open connection: collections held in memory, a commit
//! log on a [`StorageBackend`], and serialized read-write transactions.
//! [`StoreManager`] owns the connection lifecycle on top of it.

mod cursor;
mod dir;
mod manager;
mod state;
mod transaction;

pub use cursor::Cursor;
pub use dir::StoreDir;
pub use manager::{StoreLocation, StoreManager, StoreStatus};
pub use transaction::{Transaction, TxnMode};

use crate::clock::MonotonicClock;
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::migration::{MigrationManager, UpgradeReport};
use crate::schema::Collection;
use crate::wal::{CommitLog, CommitRecord, LogOp};
use liftlog_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::{Mutex, RwLock};
use state::StoreState;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Record and index counts for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Number of records.
    pub records: usize,
    /// Index names, sorted.
    pub indexes: Vec<String>,
}

/// A snapshot of store statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Schema version.
    pub version: u32,
    /// Per-collection counts.
    pub collections: Vec<CollectionStats>,
    /// Commit log size in bytes.
    pub log_bytes: u64,
}

/// An open store connection.
///
/// # Example
///
/// ```rust
/// use liftlog_core::{Collection, Store, StoreConfig};
/// use liftlog_storage::InMemoryBackend;
/// use serde_json::json;
///
/// let store = Store::open_in_memory(InMemoryBackend::new(), StoreConfig::default()).unwrap();
/// store
///     .write(|txn| txn.put(Collection::Settings, json!({"key": "units", "value": "kg"})))
///     .unwrap();
/// let value = store.read(|txn| txn.get(Collection::Settings, "units")).unwrap();
/// assert_eq!(value.unwrap()["value"], "kg");
/// ```
pub struct Store {
    state: RwLock<StoreState>,
    log: Mutex<CommitLog>,
    write_lock: Mutex<()>,
    next_txid: AtomicU64,
    closed: AtomicBool,
    lost: AtomicBool,
    config: StoreConfig,
    clock: MonotonicClock,
    dir: Mutex<Option<StoreDir>>,
    upgrade: UpgradeReport,
}

impl Store {
    /// Opens the store in a directory, waiting up to
    /// `config.blocked_timeout` for another connection to release it.
    ///
    /// # Errors
    ///
    /// Fails with `Blocked` if the store stays locked, `Corruption` if the
    /// log is damaged and `Schema` if creating or upgrading the schema fails.
    pub fn open(path: &Path, config: StoreConfig) -> CoreResult<Self> {
        let dir = StoreDir::open_waiting(path, config.create_if_missing, config.blocked_timeout)?;
        let backend = FileBackend::open(&dir.log_path())?;
        Self::open_parts(Box::new(backend), Some(dir), config)
    }

    /// Opens a store over an in-memory backend.
    ///
    /// Hand the same backend (or a [`reconnect`](InMemoryBackend::reconnect)
    /// of it) to a later open to see the same data.
    pub fn open_in_memory(backend: InMemoryBackend, config: StoreConfig) -> CoreResult<Self> {
        Self::open_parts(Box::new(backend), None, config)
    }

    /// Opens a store over any backend.
    pub fn open_with_backend(backend: Box<dyn StorageBackend>, config: StoreConfig) -> CoreResult<Self> {
        Self::open_parts(backend, None, config)
    }

    fn open_parts(
        backend: Box<dyn StorageBackend>,
        dir: Option<StoreDir>,
        config: StoreConfig,
    ) -> CoreResult<Self> {
        let mut log = CommitLog::new(backend, config.sync_on_commit);
        let (state, last_txid) = recover(&mut log)?;
        let stored_version = state.version;

        let mut store = Self {
            state: RwLock::new(state),
            log: Mutex::new(log),
            write_lock: Mutex::new(()),
            next_txid: AtomicU64::new(last_txid + 1),
            closed: AtomicBool::new(false),
            lost: AtomicBool::new(false),
            clock: MonotonicClock::new(),
            dir: Mutex::new(dir),
            upgrade: UpgradeReport::default(),
            config,
        };

        let report = MigrationManager::builtin()?.upgrade(&store, store.config.schema_version)?;
        info!(
            from = stored_version,
            to = report.to_version,
            created = report.created,
            migrations = report.applied.len(),
            "store opened"
        );
        store.upgrade = report;
        Ok(store)
    }

    /// The configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// What happened to the schema while opening.
    #[must_use]
    pub fn upgrade_report(&self) -> &UpgradeReport {
        &self.upgrade
    }

    /// Next creation timestamp, strictly increasing per store.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Committed schema version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.state.read().version
    }

    /// Whether this connection can still be used.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.lost.load(Ordering::SeqCst)
    }

    /// Whether the connection was terminated underneath the store.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> CoreResult<()> {
        if self.lost.load(Ordering::SeqCst) {
            return Err(CoreError::ConnectionLost);
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(CoreError::StoreClosed);
        }
        if let Err(e) = self.log.lock().size() {
            return Err(self.classify(e));
        }
        Ok(())
    }

    fn classify(&self, error: CoreError) -> CoreError {
        if error.is_connection_lost() {
            if !self.lost.swap(true, Ordering::SeqCst) {
                warn!("store connection terminated");
            }
            CoreError::ConnectionLost
        } else {
            error
        }
    }

    /// Runs a read-only transaction.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or `ConnectionLost`/`StoreClosed` when
    /// the connection is gone.
    pub fn read<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> CoreResult<T>,
    {
        self.ensure_live()?;
        let txn = Transaction::new(self.state.read(), TxnMode::ReadOnly);
        f(&txn)
    }

    /// Runs a read-write transaction: commits if the closure returns `Ok`,
    /// discards every write if it returns `Err`.
    ///
    /// Read-write transactions are serialized.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, `TransactionFailure` if the commit could
    /// not be written, or `ConnectionLost` when the connection is gone.
    pub fn write<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> CoreResult<T>,
    {
        self.ensure_live()?;
        let _writer = self.write_lock.lock();
        let mut txn = Transaction::new(self.state.read(), TxnMode::ReadWrite);
        let out = f(&mut txn)?;
        let ops = txn.into_ops();
        if !ops.is_empty() {
            self.commit(ops)?;
        }
        Ok(out)
    }

    fn commit(&self, ops: Vec<LogOp>) -> CoreResult<()> {
        let record = CommitRecord {
            txid: self.next_txid.fetch_add(1, Ordering::SeqCst),
            ops,
        };

        {
            let mut log = self.log.lock();
            let start = log.size().map_err(|e| self.classify(e))?;
            if let Err(e) = log.append(&record) {
                if e.is_connection_lost() {
                    return Err(self.classify(e));
                }
                // Cut off whatever part of the frame made it out.
                if let Err(cut) = log.truncate(start) {
                    warn!(error = %cut, "could not cut failed commit from log");
                }
                return Err(CoreError::transaction_failure(e.to_string()));
            }
        }

        debug!(txid = record.txid, ops = record.ops.len(), "committed");
        self.state.write().apply(&record.ops)
    }

    /// Collection and log statistics.
    pub fn stats(&self) -> CoreResult<StoreStats> {
        let log_bytes = self.log.lock().size().map_err(|e| self.classify(e))?;
        self.read(|txn| {
            let collections = Collection::ALL
                .into_iter()
                .filter(|c| txn.has_collection(*c))
                .map(|c| {
                    Ok(CollectionStats {
                        name: c.name().to_string(),
                        records: txn.count(c)?,
                        indexes: txn.index_names(c),
                    })
                })
                .collect::<CoreResult<Vec<_>>>()?;
            Ok(StoreStats {
                version: txn.version(),
                collections,
                log_bytes,
            })
        })
    }

    /// Closes the connection and releases the directory lock.
    ///
    /// Later calls fail with `StoreClosed`.
    pub fn close(&self) -> CoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _writer = self.write_lock.lock();
        let synced = if self.lost.load(Ordering::SeqCst) {
            Ok(())
        } else {
            self.log.lock().sync()
        };
        self.dir.lock().take();
        info!("store closed");
        synced
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("version", &self.version())
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// Replays the log into a fresh state, cutting off a torn tail.
fn recover(log: &mut CommitLog) -> CoreResult<(StoreState, u64)> {
    let mut state = StoreState::default();
    let mut last_txid = 0;
    let mut frames = 0usize;

    let (torn, valid_end) = {
        let mut iter = log.iter()?;
        for item in iter.by_ref() {
            let (_, record) = item?;
            state.apply(&record.ops)?;
            last_txid = last_txid.max(record.txid);
            frames += 1;
        }
        (iter.has_torn_tail(), iter.valid_end())
    };

    if torn {
        warn!(offset = valid_end, "discarding torn commit frame at end of log");
        log.truncate(valid_end)?;
    }
    debug!(frames, version = state.version, "commit log replayed");
    Ok((state, last_txid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexValue;
    use crate::schema::CURRENT_SCHEMA_VERSION;
    use serde_json::json;
    use std::ops::Bound;
    use tempfile::tempdir;

    fn memory_store() -> (Store, InMemoryBackend) {
        let backend = InMemoryBackend::new();
        let store = Store::open_in_memory(backend.clone(), StoreConfig::default()).unwrap();
        (store, backend)
    }

    fn set(id: &str, session: &str, ts: i64) -> serde_json::Value {
        json!({"id": id, "sessionId": session, "exerciseId": "E1", "exerciseIds": ["E1"],
               "weight": 100.0, "reps": 5.0, "timestamp": ts})
    }

    #[test]
    fn fresh_store_is_created_at_current_version() {
        let (store, _) = memory_store();
        assert_eq!(store.version(), CURRENT_SCHEMA_VERSION);
        assert!(store.upgrade_report().created);
        let stats = store.stats().unwrap();
        assert_eq!(stats.collections.len(), 5);
        let sets = stats.collections.iter().find(|c| c.name == "loggedSets").unwrap();
        assert!(sets.indexes.contains(&"exerciseId+timestamp".to_string()));
        assert!(sets.indexes.contains(&"exerciseIds".to_string()));
    }

    #[test]
    fn writes_survive_reopen() {
        let (store, backend) = memory_store();
        store
            .write(|txn| txn.put(Collection::LoggedSets, set("L1", "S1", 10)))
            .unwrap();
        drop(store);

        let store = Store::open_in_memory(backend.reconnect(), StoreConfig::default()).unwrap();
        assert!(!store.upgrade_report().created);
        let got = store.read(|txn| txn.get(Collection::LoggedSets, "L1")).unwrap();
        assert_eq!(got.unwrap()["sessionId"], "S1");
    }

    #[test]
    fn failed_closure_discards_writes() {
        let (store, _) = memory_store();
        let result: CoreResult<()> = store.write(|txn| {
            txn.put(Collection::LoggedSets, set("L1", "S1", 10))?;
            Err(CoreError::not_found("sessions", "S9"))
        });
        assert!(result.is_err());
        assert_eq!(store.read(|txn| txn.count(Collection::LoggedSets)).unwrap(), 0);
    }

    #[test]
    fn add_rejects_existing_key() {
        let (store, _) = memory_store();
        store
            .write(|txn| txn.add(Collection::LoggedSets, set("L1", "S1", 10)))
            .unwrap();
        let err = store
            .write(|txn| txn.add(Collection::LoggedSets, set("L1", "S2", 20)))
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { .. }));
    }

    #[test]
    fn transaction_sees_its_own_writes_in_scans_and_indexes() {
        let (store, _) = memory_store();
        store
            .write(|txn| {
                txn.put(Collection::LoggedSets, set("L1", "S1", 10))?;
                txn.put(Collection::LoggedSets, set("L2", "S1", 20))
            })
            .unwrap();

        store
            .write(|txn| {
                txn.delete(Collection::LoggedSets, "L1")?;
                txn.put(Collection::LoggedSets, set("L3", "S1", 5))?;
                txn.put(Collection::LoggedSets, set("L2", "S2", 20))?;

                let keys: Vec<String> = txn
                    .scan_page(Collection::LoggedSets, None, 10)?
                    .into_iter()
                    .map(|(k, _)| k)
                    .collect();
                assert_eq!(keys, vec!["L2", "L3"]);

                let in_s1 = txn.index_lookup(Collection::LoggedSets, "sessionId", &IndexValue::from("S1"))?;
                assert_eq!(in_s1.len(), 1);
                assert_eq!(in_s1[0]["id"], "L3");

                let lo = IndexValue::from(0_i64);
                let hi = IndexValue::from(20_i64);
                let by_time = txn.index_range(
                    Collection::LoggedSets,
                    "timestamp",
                    Bound::Included(&lo),
                    Bound::Included(&hi),
                )?;
                let ids: Vec<_> = by_time.iter().map(|v| v["id"].clone()).collect();
                assert_eq!(ids, vec![json!("L3"), json!("L2")]);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn cursor_pages_through_collection() {
        let (store, _) = memory_store();
        store
            .write(|txn| {
                for i in 0..7 {
                    txn.put(Collection::LoggedSets, set(&format!("L{i}"), "S1", i))?;
                }
                Ok(())
            })
            .unwrap();
        let keys = store
            .read(|txn| {
                txn.cursor(Collection::LoggedSets, 3)
                    .map(|r| r.map(|(k, _)| k))
                    .collect::<CoreResult<Vec<_>>>()
            })
            .unwrap();
        assert_eq!(keys.len(), 7);
        assert_eq!(keys[0], "L0");
        assert_eq!(keys[6], "L6");
    }

    #[test]
    fn empty_write_appends_nothing() {
        let (store, backend) = memory_store();
        let before = backend.data().len();
        let mode = store.write(|txn| Ok(txn.mode())).unwrap();
        assert_eq!(mode, TxnMode::ReadWrite);
        assert_eq!(backend.data().len(), before);
        assert_eq!(store.read(|txn| Ok(txn.mode())).unwrap(), TxnMode::ReadOnly);
    }

    #[test]
    fn terminated_backend_reports_lost_connection() {
        let (store, backend) = memory_store();
        backend.terminate();
        let err = store.read(|txn| txn.count(Collection::Sessions)).unwrap_err();
        assert!(matches!(err, CoreError::ConnectionLost));
        assert!(store.is_lost());
    }

    #[test]
    fn closed_store_rejects_transactions() {
        let (store, _) = memory_store();
        store.close().unwrap();
        let err = store.read(|txn| txn.count(Collection::Sessions)).unwrap_err();
        assert!(matches!(err, CoreError::StoreClosed));
    }

    #[test]
    fn torn_tail_is_cut_on_open() {
        let (store, backend) = memory_store();
        store
            .write(|txn| txn.put(Collection::LoggedSets, set("L1", "S1", 10)))
            .unwrap();
        drop(store);

        let mut bytes = backend.data();
        bytes.extend_from_slice(b"LLOG\x01\x00\xff\x00\x00\x00partial");
        let damaged = InMemoryBackend::with_data(bytes);
        let store = Store::open_in_memory(damaged.clone(), StoreConfig::default()).unwrap();
        assert_eq!(store.read(|txn| txn.count(Collection::LoggedSets)).unwrap(), 1);
        assert_eq!(damaged.data().len(), backend.data().len());
    }

    #[test]
    fn directory_store_round_trip_and_lock() {
        let temp = tempdir().unwrap();
        let config = StoreConfig::default().blocked_timeout(std::time::Duration::from_millis(50));
        {
            let store = Store::open(temp.path(), config.clone()).unwrap();
            store
                .write(|txn| txn.put(Collection::Settings, json!({"key": "k", "value": 1})))
                .unwrap();
            let blocked = Store::open(temp.path(), config.clone());
            assert!(matches!(blocked, Err(CoreError::Blocked)));
        }
        let store = Store::open(temp.path(), config).unwrap();
        assert!(store.read(|txn| txn.contains(Collection::Settings, "k")).unwrap());
    }
}
