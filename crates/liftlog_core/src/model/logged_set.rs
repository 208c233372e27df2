use crate::model::Record;
use crate::schema::Collection;
use serde::{Deserialize, Serialize};

/// The exercise actually performed when a set swapped in an alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAlternative {
    /// Alternative exercise.
    pub exercise_id: String,
    /// Exercise name at logging time.
    #[serde(default)]
    pub name_snapshot: Option<String>,
    /// Weight lifted on the alternative.
    #[serde(default)]
    pub weight: Option<f64>,
    /// Repetitions on the alternative.
    #[serde(default)]
    pub reps: Option<f64>,
}

/// One set logged in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedSet {
    /// Immutable identifier.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Exercise performed.
    pub exercise_id: String,
    /// Exercise name at logging time.
    #[serde(default)]
    pub exercise_name_snapshot: Option<String>,
    /// Weight lifted.
    pub weight: f64,
    /// Weight unit, such as kg or lb.
    #[serde(default)]
    pub weight_unit: Option<String>,
    /// Repetitions.
    pub reps: f64,
    /// Set type, such as normal, warmup or drop.
    #[serde(default = "default_set_type")]
    pub set_type: String,
    /// Position among the sets of the same exercise.
    #[serde(default)]
    pub set_index: Option<i64>,
    /// Position within the session.
    #[serde(default)]
    pub order_index: Option<i64>,
    /// When the set was logged, epoch ms.
    pub timestamp: i64,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Completion status of the set.
    #[serde(default)]
    pub status: Option<String>,
    /// Alternative exercise performed instead.
    #[serde(default)]
    pub alternative: Option<SetAlternative>,
    /// Derived: `exercise_id` followed by the alternative's exercise id.
    #[serde(default)]
    pub exercise_ids: Vec<String>,
    /// Creation time, epoch ms.
    #[serde(default)]
    pub created_at: i64,
    /// Last modification time, epoch ms.
    #[serde(default)]
    pub updated_at: Option<i64>,
}

fn default_set_type() -> String {
    "normal".to_string()
}

impl LoggedSet {
    /// A normal set with only the required fields set.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        exercise_id: impl Into<String>,
        weight: f64,
        reps: f64,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            exercise_id: exercise_id.into(),
            exercise_name_snapshot: None,
            weight,
            weight_unit: None,
            reps,
            set_type: default_set_type(),
            set_index: None,
            order_index: None,
            timestamp,
            notes: None,
            status: None,
            alternative: None,
            exercise_ids: Vec::new(),
            created_at: 0,
            updated_at: None,
        }
    }
}

impl Record for LoggedSet {
    const COLLECTION: Collection = Collection::LoggedSets;

    fn key(&self) -> &str {
        &self.id
    }

    fn normalize(&mut self) {
        let mut ids = Vec::with_capacity(2);
        if !self.exercise_id.is_empty() {
            ids.push(self.exercise_id.clone());
        }
        if let Some(alt) = &self.alternative {
            if !alt.exercise_id.is_empty() {
                ids.push(alt.exercise_id.clone());
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
    use crate::model::logged_set_exercise_ids;

    #[test]
    fn normalize_tracks_alternative() {
        let mut set = LoggedSet::new("L1", "S1", "E1", 100.0, 5.0, 0);
        set.normalize();
        assert_eq!(set.exercise_ids, vec!["E1"]);

        set.alternative = Some(SetAlternative {
            exercise_id: "E7".into(),
            name_snapshot: None,
            weight: Some(80.0),
            reps: None,
        });
        set.normalize();
        assert_eq!(set.exercise_ids, vec!["E1", "E7"]);

        let stored = set.to_value().unwrap();
        assert_eq!(
            logged_set_exercise_ids(&stored["exerciseId"], &stored["alternative"]),
            set.exercise_ids
        );
    }

    #[test]
    fn set_type_defaults_to_normal() {
        let set: LoggedSet = serde_json::from_str(
            r#"{"id":"L1","sessionId":"S1","exerciseId":"E1","weight":60,"reps":8,"timestamp":1}"#,
        )
        .unwrap();
        assert_eq!(set.set_type, "normal");
        assert_eq!(set.weight, 60.0);
    }
}
