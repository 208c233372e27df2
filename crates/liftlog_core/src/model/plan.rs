use crate::model::Record;
use crate::schema::Collection;
use serde::{Deserialize, Serialize};

/// A link to an external guide for a plan exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideLink {
    /// Optional link text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Target URL.
    pub url: String,
}

/// Defaults used when the alternative exercise is picked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeDefaults {
    /// Default number of sets.
    #[serde(default)]
    pub sets: Option<u32>,
    /// Default repetitions.
    #[serde(default)]
    pub reps: Option<u32>,
    /// Default weight.
    #[serde(default)]
    pub weight: Option<f64>,
}

/// One exercise slot of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanExercise {
    /// Slot identifier.
    pub id: String,
    /// Exercise performed in this slot.
    pub exercise_id: String,
    /// Suggested number of sets.
    #[serde(default)]
    pub default_sets: Option<u32>,
    /// Suggested repetitions per set.
    #[serde(default)]
    pub default_reps: Option<u32>,
    /// Suggested weight.
    #[serde(default)]
    pub default_weight: Option<f64>,
    /// Exercise that may replace this one.
    #[serde(default)]
    pub optional_alternative_exercise_id: Option<String>,
    /// Defaults for the alternative exercise.
    #[serde(default)]
    pub alternative_defaults: Option<AlternativeDefaults>,
    /// External guides.
    #[serde(default)]
    pub guide_links: Vec<GuideLink>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl PlanExercise {
    /// A slot for `exercise_id` with no defaults.
    #[must_use]
    pub fn new(id: impl Into<String>, exercise_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            exercise_id: exercise_id.into(),
            default_sets: None,
            default_reps: None,
            default_weight: None,
            optional_alternative_exercise_id: None,
            alternative_defaults: None,
            guide_links: Vec::new(),
            notes: None,
        }
    }
}

/// A workout plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Immutable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Exercise slots, in order.
    #[serde(default)]
    pub plan_exercises: Vec<PlanExercise>,
    /// Derived: distinct `exerciseId`s of `plan_exercises`.
    #[serde(default)]
    pub exercise_ids: Vec<String>,
    /// Scheduled weekday, 0 = Sunday.
    #[serde(default)]
    pub weekday: Option<u8>,
    /// Workout type label.
    #[serde(default)]
    pub workout_type: Option<String>,
    /// Creation time, epoch ms.
    #[serde(default)]
    pub created_at: i64,
    /// Last modification time, epoch ms.
    #[serde(default)]
    pub updated_at: Option<i64>,
}

impl Plan {
    /// An empty plan.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            notes: None,
            plan_exercises: Vec::new(),
            exercise_ids: Vec::new(),
            weekday: None,
            workout_type: None,
            created_at: 0,
            updated_at: None,
        }
    }
}

impl Record for Plan {
    const COLLECTION: Collection = Collection::Plans;

    fn key(&self) -> &str {
        &self.id
    }

    fn normalize(&mut self) {
        let mut ids: Vec<String> = Vec::new();
        for entry in &self.plan_exercises {
            if !entry.exercise_id.is_empty() && !ids.contains(&entry.exercise_id) {
                ids.push(entry.exercise_id.clone());
            }
        }
        self.exercise_ids = ids;
    }

    fn stamp_created(&mut self, now: i64) {
        self.created_at = now;
    }

    fn touch(&mut self, now: i64) {
        self.updated_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::plan_exercise_ids;

    #[test]
    fn normalize_matches_stored_form_derivation() {
        let mut plan = Plan::new("P1", "Push");
        plan.plan_exercises = vec![
            PlanExercise::new("a", "E1"),
            PlanExercise::new("b", "E2"),
            PlanExercise::new("c", "E1"),
        ];
        plan.exercise_ids = vec!["stale".into()];
        plan.normalize();
        assert_eq!(plan.exercise_ids, vec!["E1", "E2"]);

        let stored = plan.to_value().unwrap();
        assert_eq!(plan_exercise_ids(&stored["planExercises"]), plan.exercise_ids);
    }

    #[test]
    fn guide_link_label_is_optional() {
        let link: GuideLink = serde_json::from_str(r#"{"url":"https://example.com/squat"}"#).unwrap();
        assert_eq!(link.label, None);
        assert_eq!(
            serde_json::to_string(&link).unwrap(),
            r#"{"url":"https://example.com/squat"}"#
        );
    }
}
