//! Import history, the last-import marker and undo.

use super::import::ImportSummary;
use crate::access::Repository;
use crate::error::{CoreError, CoreResult};
use crate::model::{
    LoggedSet, Record, Session, SettingEntry, SETTING_IMPORT_HISTORY, SETTING_LAST_EXPORT,
    SETTING_LAST_IMPORT,
};
use crate::store::{Store, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Summaries kept in the import history.
pub const IMPORT_HISTORY_LIMIT: usize = 20;

/// The most recent import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LastImport {
    /// A CSV or JSON row import, which can be undone.
    Rows(ImportSummary),
    /// A full backup import, which cannot.
    FullBackup {
        /// Epoch ms the backup was imported.
        #[serde(rename = "importedAt")]
        imported_at: i64,
    },
}

/// Records removed by an undo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UndoReport {
    /// Sessions deleted.
    pub sessions: usize,
    /// Logged sets deleted.
    pub logged_sets: usize,
}

fn setting_value(
    settings: &Repository<'_, SettingEntry>,
    txn: &Transaction<'_>,
    key: &str,
) -> CoreResult<Option<Value>> {
    Ok(settings.get_in_txn(txn, key)?.map(|entry| entry.value))
}

fn put_setting(
    settings: &Repository<'_, SettingEntry>,
    txn: &mut Transaction<'_>,
    key: &str,
    value: Value,
    now: i64,
) -> CoreResult<()> {
    settings.put_in_txn(txn, SettingEntry::new(key, value, now))?;
    Ok(())
}

fn read_history(settings: &Repository<'_, SettingEntry>, txn: &Transaction<'_>) -> CoreResult<Vec<ImportSummary>> {
    match setting_value(settings, txn, SETTING_IMPORT_HISTORY)? {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => Ok(serde_json::from_value(value).unwrap_or_else(|e| {
            warn!(error = %e, "discarding unreadable import history");
            Vec::new()
        })),
    }
}

fn read_last_import(settings: &Repository<'_, SettingEntry>, txn: &Transaction<'_>) -> CoreResult<Option<LastImport>> {
    match setting_value(settings, txn, SETTING_LAST_IMPORT)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| CoreError::malformed(format!("unreadable {SETTING_LAST_IMPORT} setting: {e}"))),
    }
}

/// Stores `now` as the last export time.
pub(crate) fn mark_exported(
    settings: &Repository<'_, SettingEntry>,
    txn: &mut Transaction<'_>,
    now: i64,
) -> CoreResult<()> {
    put_setting(settings, txn, SETTING_LAST_EXPORT, Value::from(now), now)
}

/// Replaces the last-import marker.
pub(crate) fn set_last_import(
    settings: &Repository<'_, SettingEntry>,
    txn: &mut Transaction<'_>,
    last: &LastImport,
    now: i64,
) -> CoreResult<()> {
    put_setting(settings, txn, SETTING_LAST_IMPORT, serde_json::to_value(last)?, now)
}

/// Prepends `summary` to the history and makes it the last import.
pub(crate) fn record_import(
    settings: &Repository<'_, SettingEntry>,
    txn: &mut Transaction<'_>,
    summary: &ImportSummary,
    now: i64,
) -> CoreResult<()> {
    let mut history = read_history(settings, txn)?;
    history.insert(0, summary.clone());
    history.truncate(IMPORT_HISTORY_LIMIT);
    put_setting(settings, txn, SETTING_IMPORT_HISTORY, serde_json::to_value(&history)?, now)?;
    set_last_import(settings, txn, &LastImport::Rows(summary.clone()), now)
}

/// Summaries of recent row imports, newest first.
pub fn import_history(store: &Store) -> CoreResult<Vec<ImportSummary>> {
    let settings = Repository::<SettingEntry>::new(store);
    store.read(|txn| read_history(&settings, txn))
}

/// The most recent import, if any.
pub fn last_import(store: &Store) -> CoreResult<Option<LastImport>> {
    let settings = Repository::<SettingEntry>::new(store);
    store.read(|txn| read_last_import(&settings, txn))
}

/// Epoch ms of the most recent export, if any.
pub fn last_export_at(store: &Store) -> CoreResult<Option<i64>> {
    let settings = Repository::<SettingEntry>::new(store);
    store.read(|txn| Ok(setting_value(&settings, txn, SETTING_LAST_EXPORT)?.and_then(|v| v.as_i64())))
}

/// Deletes exactly the sessions and sets an import created, in one
/// transaction.
///
/// Nothing else is touched: sets the import did not create stay even if
/// their session goes. The last-import marker and the history entry for
/// this import are cleared.
pub fn undo_import(store: &Store, summary: &ImportSummary) -> CoreResult<UndoReport> {
    let settings = Repository::<SettingEntry>::new(store);
    let now = store.now();
    let report = store.write(|txn| {
        let mut report = UndoReport::default();
        for id in &summary.logged_set_ids {
            if txn.delete(LoggedSet::COLLECTION, id)? {
                report.logged_sets += 1;
            }
        }
        for id in &summary.session_ids {
            if txn.delete(Session::COLLECTION, id)? {
                report.sessions += 1;
            }
        }

        if let Some(LastImport::Rows(last)) = read_last_import(&settings, txn)? {
            if last.import_id == summary.import_id {
                txn.delete(SettingEntry::COLLECTION, SETTING_LAST_IMPORT)?;
            }
        }
        let mut history = read_history(&settings, txn)?;
        let before = history.len();
        history.retain(|entry| entry.import_id != summary.import_id);
        if history.len() != before {
            put_setting(&settings, txn, SETTING_IMPORT_HISTORY, serde_json::to_value(&history)?, now)?;
        }
        Ok(report)
    })?;

    info!(
        import = %summary.import_id,
        sessions = report.sessions,
        logged_sets = report.logged_sets,
        "import undone"
    );
    Ok(report)
}

/// Undoes the most recent row import.
///
/// # Errors
///
/// `UndoUnavailable` when there is no recorded import or the last one was a
/// full backup.
pub fn undo_last_import(store: &Store) -> CoreResult<UndoReport> {
    match last_import(store)? {
        None => Err(CoreError::undo_unavailable("no import has been recorded")),
        Some(LastImport::FullBackup { .. }) => {
            Err(CoreError::undo_unavailable("a full backup import cannot be undone"))
        }
        Some(LastImport::Rows(summary)) => undo_import(store, &summary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use liftlog_storage::InMemoryBackend;

    fn store() -> Store {
        Store::open_in_memory(InMemoryBackend::new(), StoreConfig::default()).unwrap()
    }

    fn summary(id: &str, sessions: &[&str], sets: &[&str]) -> ImportSummary {
        ImportSummary {
            import_id: id.to_string(),
            session_ids: sessions.iter().map(|s| s.to_string()).collect(),
            logged_set_ids: sets.iter().map(|s| s.to_string()).collect(),
            row_count: sets.len(),
            filename: None,
            imported_at: 1,
            strategy: Default::default(),
            invalid_rows: Vec::new(),
            duplicates: Default::default(),
        }
    }

    fn record(store: &Store, summary: &ImportSummary) {
        let settings = Repository::<SettingEntry>::new(store);
        store.write(|txn| record_import(&settings, txn, summary, 1)).unwrap();
    }

    #[test]
    fn history_is_newest_first_and_bounded() {
        let store = store();
        for i in 0..(IMPORT_HISTORY_LIMIT + 3) {
            record(&store, &summary(&format!("import-{i}"), &[], &[]));
        }
        let history = import_history(&store).unwrap();
        assert_eq!(history.len(), IMPORT_HISTORY_LIMIT);
        assert_eq!(history[0].import_id, format!("import-{}", IMPORT_HISTORY_LIMIT + 2));
        assert!(matches!(last_import(&store).unwrap(), Some(LastImport::Rows(s)) if s.import_id == history[0].import_id));
    }

    #[test]
    fn undo_removes_only_listed_records() {
        let store = store();
        let sessions = Repository::<Session>::new(&store);
        let sets = Repository::<LoggedSet>::new(&store);
        sessions.create(Session::new("S1", 10)).unwrap();
        sets.create(LoggedSet::new("L1", "S1", "E1", 50.0, 5.0, 10)).unwrap();
        sets.create(LoggedSet::new("L2", "S1", "E1", 50.0, 5.0, 11)).unwrap();

        let imported = summary("import-1", &["S1"], &["L1"]);
        record(&store, &imported);
        let report = undo_last_import(&store).unwrap();
        assert_eq!(report, UndoReport { sessions: 1, logged_sets: 1 });
        assert!(sessions.get("S1").unwrap().is_none());
        assert!(sets.get("L2").unwrap().is_some());
        assert!(last_import(&store).unwrap().is_none());
        assert!(import_history(&store).unwrap().is_empty());

        let err = undo_last_import(&store).unwrap_err();
        assert!(matches!(err, CoreError::UndoUnavailable { .. }));
    }

    #[test]
    fn full_backup_cannot_be_undone() {
        let store = store();
        let settings = Repository::<SettingEntry>::new(&store);
        store
            .write(|txn| set_last_import(&settings, txn, &LastImport::FullBackup { imported_at: 5 }, 5))
            .unwrap();
        let err = undo_last_import(&store).unwrap_err();
        assert_eq!(err.to_string(), "undo unavailable: a full backup import cannot be undone");
    }

    #[test]
    fn last_import_marker_is_tagged() {
        let value = serde_json::to_value(LastImport::FullBackup { imported_at: 7 }).unwrap();
        assert_eq!(value, serde_json::json!({"kind": "fullBackup", "importedAt": 7}));
    }

    #[test]
    fn export_time_is_recorded() {
        let store = store();
        assert_eq!(last_export_at(&store).unwrap(), None);
        let settings = Repository::<SettingEntry>::new(&store);
        store.write(|txn| mark_exported(&settings, txn, 42)).unwrap();
        assert_eq!(last_export_at(&store).unwrap(), Some(42));
    }
}
