//! Typed records of the five collections.
//!
//! Records are stored as JSON objects with camelCase fields. Each type
//! implements [`Record`], which ties it to its collection and carries the
//! write-time hooks the access layer runs: [`Record::normalize`] recomputes
//! derived fields and [`Record::before_delete`] cascades or vetoes deletes.

mod exercise;
mod logged_set;
mod plan;
mod session;
mod setting;

pub use exercise::Exercise;
pub use logged_set::{LoggedSet, SetAlternative};
pub use plan::{AlternativeDefaults, GuideLink, Plan, PlanExercise};
pub use session::{Session, SessionStatus};
pub use setting::{SettingEntry, SETTING_IMPORT_HISTORY, SETTING_LAST_EXPORT, SETTING_LAST_IMPORT};

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::schema::Collection;
use crate::store::Transaction;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A record type stored in one collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send {
    /// The collection holding records of this type.
    const COLLECTION: Collection;

    /// Primary key.
    fn key(&self) -> &str;

    /// Recomputes derived fields from the fields they derive from.
    ///
    /// Must be pure: normalizing twice gives the same record.
    fn normalize(&mut self) {}

    /// Sets the creation timestamp.
    fn stamp_created(&mut self, now: i64);

    /// Sets the modification timestamp.
    fn touch(&mut self, now: i64);

    /// Runs inside the delete transaction before the record is removed.
    ///
    /// Returns the number of dependent records deleted along with it, or an
    /// error to refuse the delete.
    fn before_delete(_txn: &mut Transaction<'_>, _key: &str, _config: &StoreConfig) -> CoreResult<usize> {
        Ok(0)
    }

    /// Converts the record to its stored form.
    fn to_value(&self) -> CoreResult<Value> {
        serde_json::to_value(self).map_err(|e| {
            CoreError::malformed(format!("cannot encode {} record: {e}", Self::COLLECTION))
        })
    }

    /// Reads a record from its stored form.
    fn from_value(value: Value) -> CoreResult<Self> {
        serde_json::from_value(value).map_err(|e| {
            CoreError::malformed(format!("invalid {} record: {e}", Self::COLLECTION))
        })
    }
}

/// Distinct exercise ids referenced by a plan's `planExercises`, in order of
/// first appearance.
///
/// An exercise listed twice in a plan appears once here, so the length can
/// be smaller than `planExercises`. Empty ids and alternatives are left out.
#[must_use]
pub fn plan_exercise_ids(plan_exercises: &Value) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for entry in plan_exercises.as_array().into_iter().flatten() {
        if let Some(id) = entry.get("exerciseId").and_then(Value::as_str) {
            if !id.is_empty() && !ids.iter().any(|known| known == id) {
                ids.push(id.to_string());
            }
        }
    }
    ids
}

/// A logged set's exercise id followed by its alternative's, if any.
#[must_use]
pub fn logged_set_exercise_ids(exercise_id: &Value, alternative: &Value) -> Vec<String> {
    let primary = exercise_id.as_str().filter(|id| !id.is_empty());
    let alternate = alternative
        .get("exerciseId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty());
    primary.into_iter().chain(alternate).map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plan_ids_are_distinct_in_first_seen_order() {
        let ids = plan_exercise_ids(&json!([
            {"exerciseId": "E2"},
            {"exerciseId": "E1", "optionalAlternativeExerciseId": "E3"},
            {"exerciseId": "E2"},
            {"exerciseId": ""},
            {"notes": "no exercise"}
        ]));
        assert_eq!(ids, vec!["E2", "E1"]);
        assert!(plan_exercise_ids(&Value::Null).is_empty());
    }

    #[test]
    fn set_ids_append_alternative() {
        assert_eq!(
            logged_set_exercise_ids(&json!("E1"), &json!({"exerciseId": "E9"})),
            vec!["E1", "E9"]
        );
        assert_eq!(logged_set_exercise_ids(&json!("E1"), &Value::Null), vec!["E1"]);
        assert_eq!(
            logged_set_exercise_ids(&json!("E1"), &json!({"exerciseId": ""})),
            vec!["E1"]
        );
    }
}
