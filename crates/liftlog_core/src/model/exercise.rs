use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::Record;
use crate::reference::check_exercise_references;
use crate::schema::Collection;
use crate::store::Transaction;
use serde::{Deserialize, Serialize};

/// An exercise definition, referenced by plans and logged sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    /// Immutable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Muscle group or similar.
    #[serde(default)]
    pub category: Option<String>,
    /// Equipment needed; indexed per element.
    #[serde(default)]
    pub equipment: Vec<String>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Exercise type, such as strength or cardio.
    #[serde(default)]
    pub exercise_type: Option<String>,
    /// Creation time, epoch ms.
    #[serde(default)]
    pub created_at: i64,
    /// Last modification time, epoch ms.
    #[serde(default)]
    pub updated_at: Option<i64>,
}

impl Exercise {
    /// A new exercise with only the required fields set.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: None,
            equipment: Vec::new(),
            notes: None,
            exercise_type: None,
            created_at: 0,
            updated_at: None,
        }
    }
}

impl Record for Exercise {
    const COLLECTION: Collection = Collection::Exercises;

    fn key(&self) -> &str {
        &self.id
    }

    fn stamp_created(&mut self, now: i64) {
        self.created_at = now;
    }

    fn touch(&mut self, now: i64) {
        self.updated_at = Some(now);
    }

    /// Refuses to delete an exercise that plans or logged sets still use.
    fn before_delete(txn: &mut Transaction<'_>, key: &str, config: &StoreConfig) -> CoreResult<usize> {
        let report = check_exercise_references(txn, key, config)?;
        if report.is_referenced() {
            return Err(CoreError::ReferenceConflict(Box::new(report)));
        }
        Ok(0)
    }
}
