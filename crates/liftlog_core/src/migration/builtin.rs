//! Built-in migrations, one per schema version.

use crate::error::CoreResult;
use crate::migration::{Migration, MigrationContext};
use crate::model::{logged_set_exercise_ids, plan_exercise_ids};
use crate::schema::Collection;
use serde_json::{Map, Value};

/// Inserts `field = default` if the record lacks the field. Returns whether
/// the record changed.
pub fn backfill_field(record: &mut Map<String, Value>, field: &str, default: Value) -> bool {
    if record.contains_key(field) {
        return false;
    }
    record.insert(field.to_string(), default);
    true
}

/// Version 1: the initial collections and indexes.
///
/// The collections themselves come from the schema definitions; there are
/// no records to transform.
#[derive(Debug)]
pub struct InitialSchema;

impl Migration for InitialSchema {
    fn version(&self) -> u32 {
        1
    }

    fn name(&self) -> &str {
        "initial"
    }

    fn description(&self) -> Option<&str> {
        Some("create exercises, plans, sessions, loggedSets and settings")
    }

    fn up(&self, _ctx: &mut MigrationContext<'_, '_>) -> CoreResult<()> {
        Ok(())
    }
}

/// Version 2: every plan exercise gets a `guideLinks` list.
#[derive(Debug)]
pub struct PlanExerciseGuideLinks;

impl Migration for PlanExerciseGuideLinks {
    fn version(&self) -> u32 {
        2
    }

    fn name(&self) -> &str {
        "plan_exercise_guide_links"
    }

    fn description(&self) -> Option<&str> {
        Some("backfill planExercises[].guideLinks with an empty list")
    }

    fn up(&self, ctx: &mut MigrationContext<'_, '_>) -> CoreResult<()> {
        ctx.backfill(Collection::Plans, |plan| {
            let Some(Value::Array(items)) = plan.get_mut("planExercises") else {
                return false;
            };
            let mut changed = false;
            for item in items.iter_mut() {
                if let Value::Object(entry) = item {
                    changed |= backfill_field(entry, "guideLinks", Value::Array(Vec::new()));
                }
            }
            changed
        })?;
        Ok(())
    }
}

/// Version 3: exercises get a nullable `exerciseType`.
#[derive(Debug)]
pub struct ExerciseType;

impl Migration for ExerciseType {
    fn version(&self) -> u32 {
        3
    }

    fn name(&self) -> &str {
        "exercise_type"
    }

    fn up(&self, ctx: &mut MigrationContext<'_, '_>) -> CoreResult<()> {
        ctx.backfill(Collection::Exercises, |exercise| {
            backfill_field(exercise, "exerciseType", Value::Null)
        })?;
        Ok(())
    }
}

/// Version 4: plans get nullable `weekday` and `workoutType`.
#[derive(Debug)]
pub struct PlanSchedule;

impl Migration for PlanSchedule {
    fn version(&self) -> u32 {
        4
    }

    fn name(&self) -> &str {
        "plan_schedule"
    }

    fn up(&self, ctx: &mut MigrationContext<'_, '_>) -> CoreResult<()> {
        ctx.backfill(Collection::Plans, |plan| {
            let weekday = backfill_field(plan, "weekday", Value::Null);
            let workout_type = backfill_field(plan, "workoutType", Value::Null);
            weekday || workout_type
        })?;
        Ok(())
    }
}

/// Version 5: plans and logged sets get the derived `exerciseIds` list
/// backing the multi-valued `exerciseIds` indexes.
#[derive(Debug)]
pub struct DerivedExerciseIds;

impl Migration for DerivedExerciseIds {
    fn version(&self) -> u32 {
        5
    }

    fn name(&self) -> &str {
        "derived_exercise_ids"
    }

    fn description(&self) -> Option<&str> {
        Some("index plans and logged sets by every exercise they reference")
    }

    fn up(&self, ctx: &mut MigrationContext<'_, '_>) -> CoreResult<()> {
        ctx.backfill(Collection::Plans, |plan| {
            if plan.contains_key("exerciseIds") {
                return false;
            }
            let ids = plan_exercise_ids(plan.get("planExercises").unwrap_or(&Value::Null));
            plan.insert("exerciseIds".into(), ids.into());
            true
        })?;
        ctx.backfill(Collection::LoggedSets, |set| {
            if set.contains_key("exerciseIds") {
                return false;
            }
            let ids = logged_set_exercise_ids(
                set.get("exerciseId").unwrap_or(&Value::Null),
                set.get("alternative").unwrap_or(&Value::Null),
            );
            set.insert("exerciseIds".into(), ids.into());
            true
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::Store;
    use liftlog_storage::InMemoryBackend;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn backfill_keeps_existing_values() {
        let mut record = object(json!({"exerciseType": "strength"}));
        assert!(!backfill_field(&mut record, "exerciseType", Value::Null));
        assert_eq!(record["exerciseType"], "strength");

        let mut record = object(json!({}));
        assert!(backfill_field(&mut record, "exerciseType", Value::Null));
        assert_eq!(record["exerciseType"], Value::Null);
    }

    fn legacy_store() -> Store {
        let store =
            Store::open_in_memory(InMemoryBackend::new(), StoreConfig::default().schema_version(1)).unwrap();
        store
            .write(|txn| {
                txn.put(
                    Collection::Plans,
                    json!({"id": "P1", "name": "Push", "planExercises": [
                        {"id": "a", "exerciseId": "bench", "guideLinks": [{"url": "https://example.com/bench"}]},
                        {"id": "b", "exerciseId": "press"},
                        {"id": "c", "exerciseId": "bench"}
                    ]}),
                )?;
                txn.put(Collection::Plans, json!({"id": "P2", "name": "Rest", "planExercises": []}))?;
                txn.put(Collection::Exercises, json!({"id": "bench", "name": "Bench"}))?;
                txn.put(Collection::Exercises, json!({"id": "press", "name": "Press", "exerciseType": "strength"}))?;
                txn.put(
                    Collection::LoggedSets,
                    json!({"id": "L1", "sessionId": "S1", "exerciseId": "bench", "weight": 80.0, "reps": 5.0,
                           "timestamp": 1, "alternative": {"exerciseId": "press"}}),
                )
            })
            .unwrap();
        store
    }

    fn run_steps(store: &Store) -> Vec<usize> {
        let steps: [&dyn Migration; 4] = [&PlanExerciseGuideLinks, &ExerciseType, &PlanSchedule, &DerivedExerciseIds];
        store
            .write(|txn| {
                let mut updated = Vec::new();
                for step in steps {
                    let mut ctx = MigrationContext::new(txn, 1, 5, 2);
                    step.up(&mut ctx)?;
                    updated.push(ctx.updated());
                }
                Ok(updated)
            })
            .unwrap()
    }

    fn snapshot(store: &Store) -> Vec<Vec<Value>> {
        store
            .read(|txn| {
                [Collection::Exercises, Collection::Plans, Collection::LoggedSets]
                    .into_iter()
                    .map(|c| txn.get_all(c))
                    .collect()
            })
            .unwrap()
    }

    #[test]
    fn builtin_steps_are_idempotent() {
        let store = legacy_store();
        assert_eq!(run_steps(&store), vec![1, 1, 2, 3]);
        let once = snapshot(&store);

        assert_eq!(run_steps(&store), vec![0, 0, 0, 0]);
        assert_eq!(snapshot(&store), once);
    }

    #[test]
    fn guide_links_leave_non_empty_lists_alone() {
        let store = legacy_store();
        run_steps(&store);
        let plan = store.read(|txn| txn.get(Collection::Plans, "P1")).unwrap().unwrap();
        assert_eq!(plan["planExercises"][0]["guideLinks"], json!([{"url": "https://example.com/bench"}]));
        assert_eq!(plan["planExercises"][1]["guideLinks"], json!([]));
        assert_eq!(plan["weekday"], Value::Null);
        assert_eq!(plan["exerciseIds"], json!(["bench", "press"]));

        let exercise = store.read(|txn| txn.get(Collection::Exercises, "press")).unwrap().unwrap();
        assert_eq!(exercise["exerciseType"], "strength");
        let set = store.read(|txn| txn.get(Collection::LoggedSets, "L1")).unwrap().unwrap();
        assert_eq!(set["exerciseIds"], json!(["bench", "press"]));
    }
}
