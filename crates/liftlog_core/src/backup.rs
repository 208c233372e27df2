//! Whole-store JSON backups.
//!
//! A backup is a single JSON object holding every record of the five
//! collections plus a version tag. Restoring goes collection by collection
//! in dependency order and writes each collection in chunks, one
//! transaction per chunk:
//!
//! 1. exercises and plans
//! 2. sessions, renamed to fresh ids on collision under `CreateNew`
//! 3. logged sets, pointed at their session's new id; sets whose session
//!    was not imported are dropped
//! 4. settings, always overwritten
//!
//! A restore cannot be undone. It replaces the last-import marker with a
//! full-backup marker so undo refuses.

use crate::access::Repository;
use crate::clock::format_file_stamp;
use crate::error::{CoreError, CoreResult};
use crate::model::{Exercise, LoggedSet, Plan, Record, Session, SettingEntry};
use crate::schema::Collection;
use crate::store::{Store, Transaction};
use crate::transfer::{fresh_id, mark_exported, set_last_import, DuplicateStrategy, LastImport};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io::Write;
use tracing::{debug, info};

/// The only backup format version this build reads and writes.
pub const BACKUP_VERSION: u64 = 1;

/// A full backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullBackup {
    /// Format version.
    pub version: u64,
    /// Epoch ms the backup was taken.
    pub exported_at: i64,
    /// Exercise records.
    pub exercises: Vec<Value>,
    /// Plan records.
    pub plans: Vec<Value>,
    /// Session records.
    pub sessions: Vec<Value>,
    /// Logged set records.
    pub logged_sets: Vec<Value>,
    /// Setting entries.
    pub settings: Vec<Value>,
}

impl FullBackup {
    /// Total records across the five collections.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.exercises.len() + self.plans.len() + self.sessions.len() + self.logged_sets.len() + self.settings.len()
    }
}

/// Suggested name for a backup written at `millis`.
#[must_use]
pub fn backup_filename(millis: i64) -> String {
    format!("liftlog-backup-{}.json", format_file_stamp(millis))
}

/// Dumps every collection and records the export time.
pub fn export_full_backup(store: &Store) -> CoreResult<FullBackup> {
    let exported_at = store.now();
    let backup = store.read(|txn| {
        Ok(FullBackup {
            version: BACKUP_VERSION,
            exported_at,
            exercises: txn.get_all(Collection::Exercises)?,
            plans: txn.get_all(Collection::Plans)?,
            sessions: txn.get_all(Collection::Sessions)?,
            logged_sets: txn.get_all(Collection::LoggedSets)?,
            settings: txn.get_all(Collection::Settings)?,
        })
    })?;
    store.write(|txn| mark_exported(&Repository::new(store), txn, exported_at))?;
    info!(records = backup.record_count(), "backup exported");
    Ok(backup)
}

/// Writes a backup as pretty-printed JSON and returns its suggested name.
pub fn write_full_backup<W: Write>(store: &Store, out: &mut W) -> CoreResult<String> {
    let backup = export_full_backup(store)?;
    serde_json::to_writer_pretty(&mut *out, &backup)
        .map_err(|e| CoreError::Io(std::io::Error::other(e)))?;
    out.flush()?;
    Ok(backup_filename(backup.exported_at))
}

fn array_field(object: &Map<String, Value>, key: &str) -> CoreResult<Vec<Value>> {
    match object.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                if item.is_object() {
                    Ok(item.clone())
                } else {
                    Err(CoreError::malformed(format!("backup {key}[{i}] is not an object")))
                }
            })
            .collect(),
        Some(_) => Err(CoreError::malformed(format!("backup field {key} is not an array"))),
        None => Err(CoreError::malformed(format!("backup is missing {key}"))),
    }
}

/// Checks the envelope of a parsed backup.
///
/// # Errors
///
/// `MalformedInput` if the version is not [`BACKUP_VERSION`], a collection
/// is not an array of objects, or `exportedAt` is not a finite number.
pub fn validate_backup(raw: &Value) -> CoreResult<FullBackup> {
    let Some(object) = raw.as_object() else {
        return Err(CoreError::malformed("backup is not a JSON object"));
    };

    let version = object.get("version").cloned().unwrap_or(Value::Null);
    if version.as_f64() != Some(BACKUP_VERSION as f64) {
        return Err(CoreError::malformed(format!(
            "Unsupported backup version: found {version}, expected {BACKUP_VERSION}"
        )));
    }

    let exported_at = object
        .get("exportedAt")
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .ok_or_else(|| CoreError::malformed("backup exportedAt is not a number"))?;

    Ok(FullBackup {
        version: BACKUP_VERSION,
        exported_at: exported_at as i64,
        exercises: array_field(object, "exercises")?,
        plans: array_field(object, "plans")?,
        sessions: array_field(object, "sessions")?,
        logged_sets: array_field(object, "loggedSets")?,
        settings: array_field(object, "settings")?,
    })
}

/// Parses and validates backup text.
pub fn parse_backup(text: &str) -> CoreResult<FullBackup> {
    let raw: Value = serde_json::from_str(text)
        .map_err(|e| CoreError::malformed(format!("backup is not valid JSON: {e}")))?;
    validate_backup(&raw)
}

/// Progress after one committed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupProgress {
    /// Collection the chunk belonged to.
    pub collection: Collection,
    /// Records handled so far across all collections.
    pub processed: usize,
    /// Records in the backup.
    pub total: usize,
}

impl BackupProgress {
    /// Completion in whole percent.
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        u8::try_from(self.processed.min(self.total) * 100 / self.total).unwrap_or(100)
    }
}

/// What a restore wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupImportReport {
    /// Records written per collection.
    pub written: BTreeMap<Collection, usize>,
    /// Records left out per collection.
    pub skipped: BTreeMap<Collection, usize>,
    /// Sessions imported under a new id: old id → new id.
    pub session_remap: BTreeMap<String, String>,
}

impl BackupImportReport {
    /// Records written to `collection`.
    #[must_use]
    pub fn written(&self, collection: Collection) -> usize {
        self.written.get(&collection).copied().unwrap_or(0)
    }

    /// Records of `collection` left out.
    #[must_use]
    pub fn skipped(&self, collection: Collection) -> usize {
        self.skipped.get(&collection).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Running,
    Done,
    Failed,
}

/// A restore in progress. Each `next` writes one chunk.
#[derive(Debug)]
pub struct BackupImportJob<'a> {
    store: &'a Store,
    strategy: DuplicateStrategy,
    chunk_size: usize,
    exercises: VecDeque<Exercise>,
    plans: VecDeque<Plan>,
    sessions: VecDeque<Session>,
    logged_sets: VecDeque<LoggedSet>,
    settings: VecDeque<SettingEntry>,
    // Backup session id → id it was written under.
    session_targets: HashMap<String, String>,
    processed: usize,
    total: usize,
    report: BackupImportReport,
    state: JobState,
}

fn decode_all<T: Record>(values: Vec<Value>) -> CoreResult<VecDeque<T>> {
    values.into_iter().map(T::from_value).collect()
}

fn drain_chunk<T>(queue: &mut VecDeque<T>, size: usize) -> Vec<T> {
    let take = size.min(queue.len());
    queue.drain(..take).collect()
}

// Exercises and plans have no dependencies: write or skip by key.
fn write_catalog<T: Record>(
    repo: &Repository<'_, T>,
    txn: &mut Transaction<'_>,
    records: Vec<T>,
    strategy: DuplicateStrategy,
) -> CoreResult<(usize, usize)> {
    let (mut written, mut skipped) = (0, 0);
    for record in records {
        if strategy == DuplicateStrategy::Skip && txn.contains(T::COLLECTION, record.key())? {
            skipped += 1;
            continue;
        }
        repo.put_in_txn(txn, record)?;
        written += 1;
    }
    Ok((written, skipped))
}

impl<'a> BackupImportJob<'a> {
    /// Decodes every record up front, so a bad record fails before anything
    /// is written.
    ///
    /// # Errors
    ///
    /// `MalformedInput` if a record does not decode or a session id appears
    /// twice.
    pub fn start(store: &'a Store, backup: FullBackup, strategy: DuplicateStrategy) -> CoreResult<Self> {
        let total = backup.record_count();
        let sessions: VecDeque<Session> = decode_all(backup.sessions)?;
        let mut seen = HashSet::new();
        if let Some(repeated) = sessions.iter().find(|s| !seen.insert(s.id.as_str())) {
            return Err(CoreError::malformed(format!(
                "backup lists session {} more than once",
                repeated.id
            )));
        }
        Ok(Self {
            store,
            strategy,
            chunk_size: store.config().import_chunk_size.max(1),
            exercises: decode_all(backup.exercises)?,
            plans: decode_all(backup.plans)?,
            sessions,
            logged_sets: decode_all(backup.logged_sets)?,
            settings: decode_all(backup.settings)?,
            session_targets: HashMap::new(),
            processed: 0,
            total,
            report: BackupImportReport::default(),
            state: JobState::Running,
        })
    }

    /// What has been written so far.
    #[must_use]
    pub fn report(&self) -> &BackupImportReport {
        &self.report
    }

    /// Writes every remaining chunk and returns the report.
    pub fn finish(mut self) -> CoreResult<BackupImportReport> {
        while let Some(step) = self.next() {
            step?;
        }
        match self.state {
            JobState::Done => Ok(self.report),
            _ => Err(CoreError::invalid_operation("the backup import stopped after a failed chunk")),
        }
    }

    fn write_next_chunk(&mut self) -> CoreResult<Option<(Collection, usize, usize, usize)>> {
        let store = self.store;
        let strategy = self.strategy;
        let size = self.chunk_size;

        if !self.exercises.is_empty() {
            let chunk = drain_chunk(&mut self.exercises, size);
            let n = chunk.len();
            let repo = Repository::<Exercise>::new(store);
            let (w, s) = store.write(|txn| write_catalog(&repo, txn, chunk, strategy))?;
            return Ok(Some((Collection::Exercises, n, w, s)));
        }
        if !self.plans.is_empty() {
            let chunk = drain_chunk(&mut self.plans, size);
            let n = chunk.len();
            let repo = Repository::<Plan>::new(store);
            let (w, s) = store.write(|txn| write_catalog(&repo, txn, chunk, strategy))?;
            return Ok(Some((Collection::Plans, n, w, s)));
        }
        if !self.sessions.is_empty() {
            let chunk = drain_chunk(&mut self.sessions, size);
            let n = chunk.len();
            let repo = Repository::<Session>::new(store);
            let targets = store.write(|txn| {
                let mut targets = Vec::with_capacity(chunk.len());
                for mut session in chunk {
                    let original = session.id.clone();
                    if txn.contains(Session::COLLECTION, &session.id)? {
                        match strategy {
                            DuplicateStrategy::Skip => continue,
                            DuplicateStrategy::CreateNew => session.id = fresh_id(),
                        }
                    }
                    let session = repo.put_in_txn(txn, session)?;
                    targets.push((original, session.id));
                }
                Ok(targets)
            })?;
            let written = targets.len();
            for (original, target) in targets {
                if original != target {
                    self.report.session_remap.insert(original.clone(), target.clone());
                }
                self.session_targets.insert(original, target);
            }
            return Ok(Some((Collection::Sessions, n, written, n - written)));
        }
        if !self.logged_sets.is_empty() {
            let chunk = drain_chunk(&mut self.logged_sets, size);
            let n = chunk.len();
            let repo = Repository::<LoggedSet>::new(store);
            let targets = &self.session_targets;
            let written = store.write(|txn| {
                let mut written = 0;
                for mut set in chunk {
                    let Some(target) = targets.get(&set.session_id) else {
                        continue;
                    };
                    set.session_id.clone_from(target);
                    if txn.contains(LoggedSet::COLLECTION, &set.id)? {
                        match strategy {
                            DuplicateStrategy::Skip => continue,
                            DuplicateStrategy::CreateNew => set.id = fresh_id(),
                        }
                    }
                    repo.put_in_txn(txn, set)?;
                    written += 1;
                }
                Ok(written)
            })?;
            return Ok(Some((Collection::LoggedSets, n, written, n - written)));
        }
        if !self.settings.is_empty() {
            let chunk = drain_chunk(&mut self.settings, size);
            let n = chunk.len();
            let repo = Repository::<SettingEntry>::new(store);
            store.write(|txn| {
                for entry in chunk {
                    repo.put_in_txn(txn, entry)?;
                }
                Ok(())
            })?;
            return Ok(Some((Collection::Settings, n, n, 0)));
        }
        Ok(None)
    }

    fn complete(&mut self) -> CoreResult<()> {
        let store = self.store;
        let now = store.now();
        let settings = Repository::<SettingEntry>::new(store);
        store.write(|txn| set_last_import(&settings, txn, &LastImport::FullBackup { imported_at: now }, now))?;
        info!(
            records = self.total,
            remapped_sessions = self.report.session_remap.len(),
            "backup imported"
        );
        Ok(())
    }
}

impl Iterator for BackupImportJob<'_> {
    type Item = CoreResult<BackupProgress>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != JobState::Running {
            return None;
        }
        match self.write_next_chunk() {
            Ok(Some((collection, handled, written, skipped))) => {
                self.processed += handled;
                *self.report.written.entry(collection).or_insert(0) += written;
                if skipped > 0 {
                    *self.report.skipped.entry(collection).or_insert(0) += skipped;
                }
                debug!(collection = %collection, processed = self.processed, total = self.total, "backup chunk written");
                Some(Ok(BackupProgress {
                    collection,
                    processed: self.processed,
                    total: self.total,
                }))
            }
            Ok(None) => match self.complete() {
                Ok(()) => {
                    self.state = JobState::Done;
                    None
                }
                Err(e) => {
                    self.state = JobState::Failed;
                    Some(Err(e))
                }
            },
            Err(e) => {
                self.state = JobState::Failed;
                Some(Err(e))
            }
        }
    }
}

/// Restores a whole backup and returns the report.
pub fn import_full_backup(
    store: &Store,
    backup: FullBackup,
    strategy: DuplicateStrategy,
) -> CoreResult<BackupImportReport> {
    BackupImportJob::start(store, backup, strategy)?.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::model::SetAlternative;
    use crate::transfer::{last_import, undo_last_import};
    use liftlog_storage::InMemoryBackend;
    use serde_json::json;

    fn store() -> Store {
        Store::open_in_memory(InMemoryBackend::new(), StoreConfig::default().import_chunk_size(2)).unwrap()
    }

    fn seeded() -> Store {
        let store = store();
        Repository::<Exercise>::new(&store).create(Exercise::new("E1", "Squat")).unwrap();
        Repository::<Exercise>::new(&store).create(Exercise::new("E2", "Lunge")).unwrap();
        Repository::<Session>::new(&store).create(Session::new("S1", 1_000)).unwrap();
        Repository::<Session>::new(&store).create(Session::new("S2", 2_000)).unwrap();
        let sets = Repository::<LoggedSet>::new(&store);
        let mut set = LoggedSet::new("L1", "S1", "E1", 100.0, 5.0, 1_001);
        set.alternative = Some(SetAlternative {
            exercise_id: "E2".into(),
            name_snapshot: None,
            weight: None,
            reps: None,
        });
        sets.create(set).unwrap();
        sets.create(LoggedSet::new("L2", "S2", "E1", 110.0, 3.0, 2_001)).unwrap();
        store
    }

    fn envelope(version: Value) -> Value {
        json!({
            "version": version,
            "exportedAt": 1_704_067_200_000_i64,
            "exercises": [],
            "plans": [],
            "sessions": [],
            "loggedSets": [],
            "settings": []
        })
    }

    #[test]
    fn version_two_is_rejected() {
        let err = validate_backup(&envelope(json!(2))).unwrap_err();
        assert!(err
            .to_string()
            .contains("Unsupported backup version: found 2, expected 1"));
        assert!(validate_backup(&envelope(json!(1))).is_ok());
        assert!(validate_backup(&envelope(json!(1.0))).is_ok());
        assert!(validate_backup(&envelope(json!(1.5))).is_err());
        assert!(validate_backup(&envelope(json!("1"))).is_err());
    }

    #[test]
    fn envelope_shape_is_checked() {
        let mut raw = envelope(json!(1));
        raw["plans"] = json!({});
        assert!(validate_backup(&raw).is_err());

        let mut raw = envelope(json!(1));
        raw["exportedAt"] = json!("yesterday");
        assert!(validate_backup(&raw).is_err());

        let mut raw = envelope(json!(1));
        raw["sessions"] = json!([1, 2]);
        assert!(validate_backup(&raw).is_err());

        assert!(parse_backup("{not json").is_err());
    }

    #[test]
    fn restore_into_empty_store() {
        let source = seeded();
        let backup = export_full_backup(&source).unwrap();
        assert_eq!(backup.version, BACKUP_VERSION);
        assert_eq!(crate::transfer::last_export_at(&source).unwrap(), Some(backup.exported_at));

        let target = store();
        let job = BackupImportJob::start(&target, backup.clone(), DuplicateStrategy::Skip).unwrap();
        let progress: Vec<BackupProgress> = job.map(Result::unwrap).collect();
        assert_eq!(progress.last().unwrap().percent(), 100);
        assert_eq!(progress[0].collection, Collection::Exercises);

        let set = Repository::<LoggedSet>::new(&target).get("L1").unwrap().unwrap();
        assert_eq!(set.exercise_ids, vec!["E1", "E2"]);
        assert_eq!(Repository::<Session>::new(&target).count().unwrap(), 2);
        assert!(matches!(last_import(&target).unwrap(), Some(LastImport::FullBackup { .. })));
        assert!(matches!(
            undo_last_import(&target).unwrap_err(),
            CoreError::UndoUnavailable { .. }
        ));
    }

    #[test]
    fn create_new_remaps_colliding_sessions() {
        let store = seeded();
        let backup = export_full_backup(&store).unwrap();
        let report = import_full_backup(&store, backup, DuplicateStrategy::CreateNew).unwrap();

        assert_eq!(report.session_remap.len(), 2);
        assert_eq!(report.written(Collection::LoggedSets), 2);
        assert_eq!(Repository::<Session>::new(&store).count().unwrap(), 4);
        assert_eq!(Repository::<LoggedSet>::new(&store).count().unwrap(), 4);

        let renamed = &report.session_remap["S1"];
        let moved = Repository::<LoggedSet>::new(&store).for_session(renamed).unwrap();
        assert_eq!(moved.len(), 1);
        assert_ne!(moved[0].id, "L1");
    }

    #[test]
    fn skip_drops_sets_of_skipped_sessions() {
        let store = seeded();
        let backup = export_full_backup(&store).unwrap();
        let report = import_full_backup(&store, backup, DuplicateStrategy::Skip).unwrap();

        assert_eq!(report.written(Collection::Sessions), 0);
        assert_eq!(report.skipped(Collection::Sessions), 2);
        assert_eq!(report.skipped(Collection::LoggedSets), 2);
        assert_eq!(report.skipped(Collection::Exercises), 2);
        assert!(report.written(Collection::Settings) >= 1);
        assert_eq!(Repository::<LoggedSet>::new(&store).count().unwrap(), 2);
    }

    #[test]
    fn bad_records_fail_before_writing() {
        let target = store();
        let mut raw = envelope(json!(1));
        raw["exercises"] = json!([{"id": "E1", "name": "Squat"}]);
        raw["sessions"] = json!([{"id": "S1"}]);
        let backup = validate_backup(&raw).unwrap();
        assert!(BackupImportJob::start(&target, backup, DuplicateStrategy::Skip).is_err());
        assert_eq!(Repository::<Exercise>::new(&target).count().unwrap(), 0);
    }

    #[test]
    fn repeated_session_ids_are_rejected() {
        let target = store();
        let mut raw = envelope(json!(1));
        raw["exercises"] = json!([{"id": "E1", "name": "Squat"}]);
        raw["sessions"] = serde_json::to_value([Session::new("S1", 1_000), Session::new("S1", 2_000)]).unwrap();
        let backup = validate_backup(&raw).unwrap();
        let err = BackupImportJob::start(&target, backup, DuplicateStrategy::CreateNew).unwrap_err();
        assert!(err.to_string().contains("session S1 more than once"));
        assert_eq!(Repository::<Exercise>::new(&target).count().unwrap(), 0);
    }
}
