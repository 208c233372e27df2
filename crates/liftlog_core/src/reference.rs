//! Exercise reference check.
//!
//! A read-only scan used before an exercise is deleted: which plans and
//! logged sets still point at it. Lookups go through the multi-valued
//! `exerciseIds` indexes; a store missing an index falls back to a full
//! scan of that collection.

use crate::config::StoreConfig;
use crate::error::CoreResult;
use crate::index::IndexValue;
use crate::model::{logged_set_exercise_ids, plan_exercise_ids};
use crate::schema::Collection;
use crate::store::Transaction;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

const EXERCISE_IDS_INDEX: &str = "exerciseIds";

/// A plan that references the exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReference {
    /// Plan id.
    pub id: String,
    /// Plan name.
    pub name: String,
}

/// A session holding sets of the exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReference {
    /// Session id.
    pub id: String,
    /// Session name, if any.
    pub name: Option<String>,
    /// Session date, epoch ms.
    pub date: i64,
}

/// Where an exercise is still used.
///
/// Counts are exact; `plans` and `sessions` are bounded samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceReport {
    /// The exercise checked.
    pub exercise_id: String,
    /// Plans referencing it.
    pub plan_count: usize,
    /// Logged sets referencing it.
    pub logged_set_count: usize,
    /// Distinct sessions holding those sets.
    pub session_count: usize,
    /// Up to `reference_plan_sample` plans, by name.
    pub plans: Vec<PlanReference>,
    /// Up to `reference_session_sample` sessions, newest first.
    pub sessions: Vec<SessionReference>,
}

impl ReferenceReport {
    /// Whether anything still references the exercise.
    #[must_use]
    pub fn is_referenced(&self) -> bool {
        self.plan_count > 0 || self.logged_set_count > 0
    }
}

/// Scans plans and logged sets for references to `exercise_id`.
pub fn check_exercise_references(
    txn: &Transaction<'_>,
    exercise_id: &str,
    config: &StoreConfig,
) -> CoreResult<ReferenceReport> {
    let plans = referencing(txn, Collection::Plans, exercise_id, config, |plan| {
        plan_exercise_ids(plan.get("planExercises").unwrap_or(&Value::Null))
    })?;
    let sets = referencing(txn, Collection::LoggedSets, exercise_id, config, |set| {
        logged_set_exercise_ids(
            set.get("exerciseId").unwrap_or(&Value::Null),
            set.get("alternative").unwrap_or(&Value::Null),
        )
    })?;

    let mut plan_refs: Vec<PlanReference> = plans
        .iter()
        .map(|plan| PlanReference {
            id: str_field(plan, "id"),
            name: str_field(plan, "name"),
        })
        .collect();
    plan_refs.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    plan_refs.truncate(config.reference_plan_sample);

    let session_ids: BTreeSet<String> = sets
        .iter()
        .filter_map(|set| set.get("sessionId").and_then(Value::as_str))
        .map(String::from)
        .collect();
    let mut sessions = Vec::with_capacity(session_ids.len());
    for id in &session_ids {
        let Some(session) = txn.get(Collection::Sessions, id)? else {
            continue;
        };
        sessions.push(SessionReference {
            id: id.clone(),
            name: session.get("name").and_then(Value::as_str).map(String::from),
            date: session.get("date").and_then(Value::as_i64).unwrap_or(0),
        });
    }
    sessions.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
    sessions.truncate(config.reference_session_sample);

    Ok(ReferenceReport {
        exercise_id: exercise_id.to_string(),
        plan_count: plans.len(),
        logged_set_count: sets.len(),
        session_count: session_ids.len(),
        plans: plan_refs,
        sessions,
    })
}

fn referencing<F>(
    txn: &Transaction<'_>,
    collection: Collection,
    exercise_id: &str,
    config: &StoreConfig,
    derive: F,
) -> CoreResult<Vec<Value>>
where
    F: Fn(&Value) -> Vec<String>,
{
    if txn.has_index(collection, EXERCISE_IDS_INDEX) {
        return txn.index_lookup(collection, EXERCISE_IDS_INDEX, &IndexValue::from(exercise_id));
    }

    tracing::debug!(%collection, "exerciseIds index missing; scanning collection");
    let mut hits = Vec::new();
    for item in txn.cursor(collection, config.cursor_page_size) {
        let (_, record) = item?;
        if derive(&record).iter().any(|id| id == exercise_id) {
            hits.push(record);
        }
    }
    Ok(hits)
}

fn str_field(record: &Value, field: &str) -> String {
    record
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
