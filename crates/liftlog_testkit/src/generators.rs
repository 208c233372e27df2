//! Property-based test generators using proptest.
//!
//! Provides strategies for records that satisfy the store's required
//! fields, with derived fields left stale so normalization is exercised.

use liftlog_core::model::{LoggedSet, Plan, PlanExercise, SetAlternative};
use proptest::prelude::*;

/// Strategy for record ids.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,12}").expect("Invalid regex")
}

/// Strategy for exercise ids drawn from a small pool, so records collide.
pub fn exercise_id_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["squat", "bench", "row", "press", "curl", ""]).prop_map(String::from)
}

/// Strategy for display names that need CSV quoting.
pub fn awkward_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z ,\"]{0,15}[A-Za-z]").expect("Invalid regex")
}

/// Strategy for single CSV cells, including separators and line breaks.
pub fn csv_cell_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z ,\"\r\n]{0,12}").expect("Invalid regex")
}

/// Strategy for an alternative exercise on a set.
pub fn alternative_strategy() -> impl Strategy<Value = Option<SetAlternative>> {
    prop::option::of(
        (exercise_id_strategy(), prop::option::of(0.0f64..300.0)).prop_map(|(exercise_id, weight)| {
            SetAlternative {
                exercise_id,
                name_snapshot: None,
                weight,
                reps: None,
            }
        }),
    )
}

/// Strategy for logged sets with stale `exerciseIds`.
pub fn logged_set_strategy() -> impl Strategy<Value = LoggedSet> {
    (
        id_strategy(),
        id_strategy(),
        exercise_id_strategy(),
        0.0f64..300.0,
        1u32..30,
        0i64..4_000_000_000_000,
        alternative_strategy(),
    )
        .prop_map(|(id, session_id, exercise_id, weight, reps, timestamp, alternative)| {
            let mut set = LoggedSet::new(id, session_id, exercise_id, weight, f64::from(reps), timestamp);
            set.alternative = alternative;
            set.exercise_ids = vec!["stale".into()];
            set
        })
}

/// Strategy for plans with repeated exercises and stale `exerciseIds`.
pub fn plan_strategy() -> impl Strategy<Value = Plan> {
    (
        id_strategy(),
        prop::collection::vec((exercise_id_strategy(), prop::option::of(exercise_id_strategy())), 0..8),
    )
        .prop_map(|(id, entries)| {
            let mut plan = Plan::new(id.clone(), "Generated");
            plan.plan_exercises = entries
                .into_iter()
                .enumerate()
                .map(|(i, (exercise_id, alternative))| {
                    let mut entry = PlanExercise::new(format!("{id}-{i}"), exercise_id);
                    entry.optional_alternative_exercise_id = alternative;
                    entry
                })
                .collect();
            plan.exercise_ids = vec!["stale".into()];
            plan
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn generated_sets_carry_stale_derived_ids() {
        let mut runner = TestRunner::default();
        for _ in 0..20 {
            let set = logged_set_strategy().new_tree(&mut runner).unwrap().current();
            assert_eq!(set.exercise_ids, vec!["stale"]);
            assert!(!set.id.is_empty());
        }
    }

    #[test]
    fn awkward_names_are_trimmed() {
        let mut runner = TestRunner::default();
        for _ in 0..20 {
            let name = awkward_name_strategy().new_tree(&mut runner).unwrap().current();
            assert_eq!(name.trim(), name);
        }
    }
}
