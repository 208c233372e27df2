//! Import/export helpers and the end-to-end scenarios.

use liftlog_core::access::Repository;
use liftlog_core::model::{LoggedSet, Session};
use liftlog_core::transfer::{export_csv, import_payloads, DuplicateStrategy, ExportOptions, ImportRequest, ImportSummary};
use liftlog_core::{Collection, CoreResult, Store};
use serde_json::Value;

/// Exports the whole store as CSV text.
pub fn export_to_string(store: &Store, options: &ExportOptions) -> String {
    let mut out = Vec::new();
    export_csv(store, options, &mut out, |_| {}).expect("Failed to export CSV");
    String::from_utf8(out).expect("Export is not UTF-8")
}

/// Imports CSV text.
pub fn import_text(store: &Store, text: &str, strategy: DuplicateStrategy) -> CoreResult<ImportSummary> {
    import_payloads(store, ImportRequest::from_csv(text)?.strategy(strategy))
}

/// Every stored record of `collection`, in key order.
pub fn snapshot(store: &Store, collection: Collection) -> Vec<Value> {
    store
        .read(|txn| txn.get_all(collection))
        .expect("Failed to read collection")
}

/// Sessions and sets, decoded.
pub fn workout_log(store: &Store) -> (Vec<Session>, Vec<LoggedSet>) {
    (
        Repository::<Session>::new(store).get_all().expect("Failed to read sessions"),
        Repository::<LoggedSet>::new(store).get_all().expect("Failed to read sets"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::generators::*;
    use liftlog_core::backup::{export_full_backup, import_full_backup, validate_backup};
    use liftlog_core::model::{logged_set_exercise_ids, plan_exercise_ids, Exercise, Plan, Record};
    use liftlog_core::transfer::{prepare_import, undo_last_import};
    use liftlog_core::{CoreError, StoreConfig, CURRENT_SCHEMA_VERSION};
    use proptest::prelude::*;
    use serde_json::json;

    fn seeded() -> TestStore {
        let test_store = TestStore::memory();
        seed_catalog(&test_store);
        seed_session(&test_store, "S1", JAN_1_2024, "squat", 3);
        seed_session(&test_store, "S2", JAN_1_2024 + DAY_MS, "bench", 2);
        seed_set_with_alternative(&test_store, "S2-alt", "S2", "bench", "press");
        test_store
    }

    #[test]
    fn csv_round_trip_into_empty_store() {
        let source = seeded();
        let text = export_to_string(&source, &ExportOptions::default());

        let target = TestStore::memory();
        let summary = import_text(&target, &text, DuplicateStrategy::CreateNew).unwrap();
        assert_eq!(summary.row_count, 6);
        assert_eq!(workout_log(&target), workout_log(&source));
    }

    #[test]
    fn create_new_reimport_doubles_the_log() {
        let store = seeded();
        let text = export_to_string(&store, &ExportOptions::default());
        let summary = import_text(&store, &text, DuplicateStrategy::CreateNew).unwrap();

        assert_eq!(summary.session_ids.len(), 2);
        assert_eq!(summary.duplicates.id_matches(), 2);
        let (sessions, sets) = workout_log(&store);
        assert_eq!(sessions.len(), 4);
        assert_eq!(sets.len(), 12);
        for id in &summary.session_ids {
            assert!(id != "S1" && id != "S2");
            let moved = Repository::<LoggedSet>::new(&store).for_session(id).unwrap();
            assert!(!moved.is_empty());
        }
    }

    #[test]
    fn skip_reimport_has_nothing_to_import() {
        let store = seeded();
        let text = export_to_string(&store, &ExportOptions::default());

        let request = ImportRequest::from_csv(&text).unwrap();
        let preview = prepare_import(&store, &request).unwrap();
        assert_eq!(preview.duplicates.id_matches(), 2);
        assert_eq!(preview.sessions, 0);

        let err = import_text(&store, &text, DuplicateStrategy::Skip).unwrap_err();
        assert!(matches!(err, CoreError::NothingToImport));
        assert_eq!(err.to_string(), "No rows remain after duplicate filtering.");
    }

    #[test]
    fn leg_day_row_imports_one_set() {
        let store = TestStore::memory();
        let summary = import_text(&store, &csv_text(&[leg_day_row()]), DuplicateStrategy::Skip).unwrap();
        assert_eq!(summary.row_count, 1);
        assert_eq!(summary.session_ids, vec!["S1"]);

        let session = Repository::<Session>::new(&store).get("S1").unwrap().unwrap();
        assert_eq!(session.name.as_deref(), Some("Leg Day"));
        assert_eq!(session.date, JAN_1_2024);
        assert_eq!(session.exercise_order, vec!["squat"]);
    }

    #[test]
    fn names_with_commas_survive_quoting() {
        let store = TestStore::memory();
        seed_session(&store, "S1", JAN_1_2024, "bench", 0);
        let mut set = LoggedSet::new("L1", "S1", "bench", 70.0, 6.0, JAN_1_2024);
        set.exercise_name_snapshot = Some("Press, Bench".into());
        set.notes = Some("felt \"easy\"\nnext time +2.5".into());
        Repository::<LoggedSet>::new(&store).create(set).unwrap();

        let text = export_to_string(&store, &ExportOptions::default());
        assert!(text.contains("\"Press, Bench\""));

        let target = TestStore::memory();
        import_text(&target, &text, DuplicateStrategy::Skip).unwrap();
        let copy = Repository::<LoggedSet>::new(&target).get("L1").unwrap().unwrap();
        assert_eq!(copy.exercise_name_snapshot.as_deref(), Some("Press, Bench"));
        assert_eq!(copy.notes.as_deref(), Some("felt \"easy\"\nnext time +2.5"));
    }

    #[test]
    fn undo_restores_the_previous_log() {
        let store = seeded();
        let before = workout_log(&store);

        let mut legs = leg_day_row();
        legs.insert("Session ID".into(), "S9".into());
        legs.insert("Set ID".into(), "L9".into());
        let rows = vec![
            legs,
            raw_row(&[
                ("Session name", "Pull"),
                ("Session date", "2024-02-01T00:00:00Z"),
                ("Set ID", "P1"),
                ("Exercise ID", "row"),
                ("Weight", "70"),
                ("Reps", "8"),
            ]),
        ];
        let summary = import_text(&store, &csv_text(&rows), DuplicateStrategy::Skip).unwrap();
        assert_eq!(summary.session_ids.len(), 2);
        assert_ne!(workout_log(&store), before);

        let report = undo_last_import(&store).unwrap();
        assert_eq!(report.sessions, 2);
        assert_eq!(report.logged_sets, 2);
        assert_eq!(workout_log(&store), before);
        assert!(matches!(undo_last_import(&store), Err(CoreError::UndoUnavailable { .. })));
    }

    #[test]
    fn deleting_a_session_takes_its_sets() {
        let store = seeded();
        let removed = Repository::<Session>::new(&store).delete("S2").unwrap();
        assert_eq!(removed, 3);
        let (sessions, sets) = workout_log(&store);
        assert_eq!(sessions.len(), 1);
        assert!(sets.iter().all(|s| s.session_id == "S1"));
    }

    #[test]
    fn referenced_exercise_cannot_be_deleted() {
        let store = seeded();
        seed_plan(&store, "P1", &["press", "row"]);

        let exercises = Repository::<Exercise>::new(&store);
        let err = exercises.delete("press").unwrap_err();
        let CoreError::ReferenceConflict(report) = err else {
            panic!("expected a reference conflict");
        };
        assert_eq!(report.plan_count, 1);
        assert_eq!(report.logged_set_count, 1);
        assert_eq!(report.session_count, 1);

        Repository::<Plan>::new(&store).delete("P1").unwrap();
        Repository::<LoggedSet>::new(&store).delete("S2-alt").unwrap();
        exercises.delete("press").unwrap();
        assert!(exercises.get("press").unwrap().is_none());
    }

    #[test]
    fn backup_version_two_is_rejected() {
        let store = seeded();
        let mut raw = serde_json::to_value(export_full_backup(&store).unwrap()).unwrap();
        raw["version"] = json!(2);
        let err = validate_backup(&raw).unwrap_err();
        assert!(matches!(err, CoreError::MalformedInput { .. }));
        let message = err.to_string();
        assert!(message.contains("found 2"));
        assert!(message.contains("expected 1"));
    }

    #[test]
    fn backup_restores_into_directory_store() {
        let source = seeded();
        let backup = export_full_backup(&source).unwrap();

        let target = TestStore::directory_with(StoreConfig::default().import_chunk_size(2));
        import_full_backup(&target, backup, DuplicateStrategy::Skip).unwrap();
        let target = target.reopen(StoreConfig::default());
        assert_eq!(workout_log(&target), workout_log(&source));
        assert_eq!(snapshot(&target, Collection::Exercises), snapshot(&source, Collection::Exercises));
    }

    #[test]
    fn migrations_run_once() {
        let legacy = TestStore::directory_with(StoreConfig::default().schema_version(1));
        legacy
            .write(|txn| {
                txn.put(
                    Collection::Plans,
                    json!({"id": "P1", "name": "Push", "planExercises": [{"id": "a", "exerciseId": "bench"}]}),
                )?;
                txn.put(Collection::Exercises, json!({"id": "bench", "name": "Bench"}))?;
                txn.put(
                    Collection::LoggedSets,
                    json!({"id": "L1", "sessionId": "S1", "exerciseId": "bench", "weight": 60, "reps": 5,
                           "timestamp": JAN_1_2024, "alternative": {"exerciseId": "press"}}),
                )
            })
            .unwrap();

        let upgraded = legacy.reopen(StoreConfig::default());
        let applied: Vec<u32> = upgraded.upgrade_report().applied.iter().map(|m| m.version).collect();
        assert_eq!(applied, vec![2, 3, 4, 5]);
        let plans = snapshot(&upgraded, Collection::Plans);
        let sets = snapshot(&upgraded, Collection::LoggedSets);
        assert_eq!(plans[0]["exerciseIds"], json!(["bench"]));
        assert_eq!(plans[0]["planExercises"][0]["guideLinks"], json!([]));
        assert_eq!(sets[0]["exerciseIds"], json!(["bench", "press"]));

        let again = upgraded.reopen(StoreConfig::default());
        assert!(again.upgrade_report().applied.is_empty());
        assert_eq!(again.version(), CURRENT_SCHEMA_VERSION);
        assert_eq!(snapshot(&again, Collection::Plans), plans);
        assert_eq!(snapshot(&again, Collection::LoggedSets), sets);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn stored_sets_have_derived_ids(set in logged_set_strategy()) {
            let store = TestStore::memory();
            let id = set.id.clone();
            Repository::<LoggedSet>::new(&store).create(set).unwrap();
            let stored = store.read(|txn| txn.get(LoggedSet::COLLECTION, &id)).unwrap().unwrap();
            let expected = logged_set_exercise_ids(&stored["exerciseId"], &stored["alternative"]);
            prop_assert_eq!(&stored["exerciseIds"], &json!(expected));
        }

        #[test]
        fn stored_plans_have_derived_ids(plan in plan_strategy()) {
            let store = TestStore::memory();
            let id = plan.id.clone();
            Repository::<Plan>::new(&store).create(plan).unwrap();
            let stored = store.read(|txn| txn.get(Plan::COLLECTION, &id)).unwrap().unwrap();
            let expected = plan_exercise_ids(&stored["planExercises"]);
            prop_assert_eq!(&stored["exerciseIds"], &json!(expected));
        }

        #[test]
        fn alternative_changes_rederive_ids(set in logged_set_strategy(), alternative in alternative_strategy()) {
            let store = TestStore::memory();
            let repo = Repository::<LoggedSet>::new(&store);
            let id = set.id.clone();
            repo.create(set).unwrap();
            let updated = repo.modify(&id, |s| s.alternative = alternative.clone()).unwrap();
            let mut expected: Vec<String> = Vec::new();
            if !updated.exercise_id.is_empty() {
                expected.push(updated.exercise_id.clone());
            }
            if let Some(alt) = alternative.filter(|a| !a.exercise_id.is_empty()) {
                expected.push(alt.exercise_id);
            }
            prop_assert_eq!(updated.exercise_ids, expected);
        }

        #[test]
        fn awkward_names_round_trip_through_csv(name in awkward_name_strategy()) {
            let store = TestStore::memory();
            seed_session(&store, "S1", JAN_1_2024, "bench", 0);
            let mut set = LoggedSet::new("L1", "S1", "bench", 50.0, 5.0, JAN_1_2024);
            set.exercise_name_snapshot = Some(name.clone());
            Repository::<LoggedSet>::new(&store).create(set).unwrap();

            let text = export_to_string(&store, &ExportOptions::default());
            let target = TestStore::memory();
            import_text(&target, &text, DuplicateStrategy::Skip).unwrap();
            let copy = Repository::<LoggedSet>::new(&target).get("L1").unwrap().unwrap();
            prop_assert_eq!(copy.exercise_name_snapshot, Some(name));
        }
    }
}
