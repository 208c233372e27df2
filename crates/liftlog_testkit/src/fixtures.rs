//! Test fixtures and store helpers.
//!
//! Provides stores with automatic cleanup, sample records and builders for
//! import rows.

use liftlog_core::access::Repository;
use liftlog_core::csv::{format_line, LINE_END};
use liftlog_core::model::{Exercise, LoggedSet, Plan, PlanExercise, Session, SessionStatus, SetAlternative};
use liftlog_core::transfer::{RawRow, HEADERS};
use liftlog_core::{Store, StoreConfig};
use liftlog_storage::InMemoryBackend;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 2024-01-01T00:00:00Z in epoch ms.
pub const JAN_1_2024: i64 = 1_704_067_200_000;

/// One day in ms.
pub const DAY_MS: i64 = 86_400_000;

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Store,
    backend: Option<InMemoryBackend>,
    // Kept alive so the directory outlives the store.
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self::memory_with(StoreConfig::default())
    }

    /// Creates an in-memory test store with `config`.
    pub fn memory_with(config: StoreConfig) -> Self {
        let backend = InMemoryBackend::new();
        Self {
            store: Store::open_in_memory(backend.clone(), config).expect("Failed to open in-memory store"),
            backend: Some(backend),
            temp_dir: None,
        }
    }

    /// Creates a new directory-backed test store.
    pub fn directory() -> Self {
        Self::directory_with(StoreConfig::default())
    }

    /// Creates a directory-backed test store with `config`.
    pub fn directory_with(config: StoreConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Store::open(&temp_dir.path().join("store"), config).expect("Failed to open directory store");
        Self {
            store,
            backend: None,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store directory if directory-backed.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("store"))
    }

    /// Returns the shared bytes if in-memory.
    pub fn backend(&self) -> Option<&InMemoryBackend> {
        self.backend.as_ref()
    }

    /// Closes the store and opens it again with `config`.
    pub fn reopen(self, config: StoreConfig) -> Self {
        self.store.close().expect("Failed to close store");
        let store = match (&self.backend, &self.temp_dir) {
            (Some(backend), _) => {
                Store::open_in_memory(backend.reconnect(), config).expect("Failed to reopen in-memory store")
            }
            (None, Some(dir)) => {
                Store::open(&dir.path().join("store"), config).expect("Failed to reopen directory store")
            }
            (None, None) => unreachable!("test store has neither backend nor directory"),
        };
        Self { store, ..self }
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a store in a temporary directory.
pub fn with_dir_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store, &Path) -> R,
{
    let test_store = TestStore::directory();
    let path = test_store.path().expect("Directory store should have a path");
    f(&test_store.store, &path)
}

/// Creates the sample exercises `squat`, `bench`, `row` and `press`.
pub fn seed_catalog(store: &Store) -> Vec<Exercise> {
    let repo = Repository::<Exercise>::new(store);
    [("squat", "Back Squat"), ("bench", "Press, Bench"), ("row", "Barbell Row"), ("press", "Overhead Press")]
        .into_iter()
        .map(|(id, name)| repo.create(Exercise::new(id, name)).expect("Failed to create exercise"))
        .collect()
}

/// Creates a plan using the given exercises in order.
pub fn seed_plan(store: &Store, id: &str, exercise_ids: &[&str]) -> Plan {
    let mut plan = Plan::new(id, format!("Plan {id}"));
    plan.plan_exercises = exercise_ids
        .iter()
        .enumerate()
        .map(|(i, exercise)| PlanExercise::new(format!("{id}-{i}"), *exercise))
        .collect();
    Repository::<Plan>::new(store).create(plan).expect("Failed to create plan")
}

/// Creates a completed session with `sets` sets of `exercise_id`.
///
/// Set ids are `{session_id}-L{n}`.
pub fn seed_session(store: &Store, session_id: &str, date: i64, exercise_id: &str, sets: usize) -> Session {
    let mut session = Session::new(session_id, date);
    session.name = Some(format!("Session {session_id}"));
    session.status = SessionStatus::Completed;
    session.exercise_order = vec![exercise_id.to_string()];
    let session = Repository::<Session>::new(store).create(session).expect("Failed to create session");

    let repo = Repository::<LoggedSet>::new(store);
    for n in 0..sets {
        let mut set = LoggedSet::new(
            format!("{session_id}-L{n}"),
            session_id,
            exercise_id,
            60.0 + 2.5 * n as f64,
            5.0,
            date + n as i64 * 60_000,
        );
        set.order_index = Some(n as i64);
        set.set_index = Some(n as i64 + 1);
        repo.create(set).expect("Failed to create set");
    }
    session
}

/// Creates a set of `exercise_id` with an alternative.
pub fn seed_set_with_alternative(store: &Store, id: &str, session_id: &str, exercise_id: &str, alternative: &str) -> LoggedSet {
    let mut set = LoggedSet::new(id, session_id, exercise_id, 80.0, 8.0, JAN_1_2024);
    set.alternative = Some(SetAlternative {
        exercise_id: alternative.to_string(),
        name_snapshot: None,
        weight: Some(40.0),
        reps: Some(10.0),
    });
    Repository::<LoggedSet>::new(store).create(set).expect("Failed to create set")
}

/// Builds an import row from header/value pairs.
pub fn raw_row(cells: &[(&str, &str)]) -> RawRow {
    cells.iter().map(|(h, v)| (h.to_string(), v.to_string())).collect()
}

/// The minimal "Leg Day" row: session S1, set L1, 100 × 5 squat.
pub fn leg_day_row() -> RawRow {
    raw_row(&[
        ("Session ID", "S1"),
        ("Session name", "Leg Day"),
        ("Session date", "2024-01-01T00:00:00Z"),
        ("Set ID", "L1"),
        ("Exercise ID", "squat"),
        ("Weight", "100"),
        ("Reps", "5"),
    ])
}

/// Renders rows as a CSV file with every export header.
pub fn csv_text(rows: &[RawRow]) -> String {
    let mut text = format_line(&HEADERS);
    text.push_str(LINE_END);
    for row in rows {
        let cells: Vec<&str> = HEADERS
            .iter()
            .map(|h| row.get(*h).map(String::as_str).unwrap_or(""))
            .collect();
        text.push_str(&format_line(&cells));
        text.push_str(LINE_END);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use liftlog_core::Collection;

    #[test]
    fn memory_store_reopens_onto_same_bytes() {
        let test_store = TestStore::memory();
        seed_catalog(&test_store);
        let test_store = test_store.reopen(StoreConfig::default());
        assert_eq!(test_store.read(|txn| txn.count(Collection::Exercises)).unwrap(), 4);
    }

    #[test]
    fn directory_store_survives_reopen() {
        let test_store = TestStore::directory();
        seed_session(&test_store, "S1", JAN_1_2024, "squat", 3);
        let test_store = test_store.reopen(StoreConfig::default());
        assert_eq!(test_store.read(|txn| txn.count(Collection::LoggedSets)).unwrap(), 3);
        assert!(test_store.path().unwrap().exists());
    }

    #[test]
    fn csv_text_has_every_header() {
        let text = csv_text(&[leg_day_row()]);
        let mut lines = text.split(LINE_END);
        assert_eq!(lines.next().unwrap().split(',').count(), HEADERS.len());
        assert!(lines.next().unwrap().starts_with("S1,Leg Day,"));
    }
}
