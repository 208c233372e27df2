use crate::config::StoreConfig;
use crate::error::CoreResult;
use crate::index::IndexValue;
use crate::model::Record;
use crate::schema::Collection;
use crate::store::Transaction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a session is still being logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// In progress.
    #[default]
    Active,
    /// Finished.
    Completed,
}

impl SessionStatus {
    /// Stored name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown session status {other:?}")),
        }
    }
}

/// A workout session; owns the logged sets that point at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Immutable identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// When the session took place, epoch ms.
    pub date: i64,
    /// Plan the session was started from.
    #[serde(default)]
    pub source_plan_id: Option<String>,
    /// Exercise ids in display order; not enforced against the sets.
    #[serde(default)]
    pub exercise_order: Vec<String>,
    /// Progress state.
    #[serde(default)]
    pub status: SessionStatus,
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

impl Session {
    /// An active session on `date`.
    #[must_use]
    pub fn new(id: impl Into<String>, date: i64) -> Self {
        Self {
            id: id.into(),
            name: None,
            date,
            source_plan_id: None,
            exercise_order: Vec::new(),
            status: SessionStatus::Active,
            workout_type: None,
            created_at: 0,
            updated_at: None,
        }
    }
}

impl Record for Session {
    const COLLECTION: Collection = Collection::Sessions;

    fn key(&self) -> &str {
        &self.id
    }

    fn stamp_created(&mut self, now: i64) {
        self.created_at = now;
    }

    fn touch(&mut self, now: i64) {
        self.updated_at = Some(now);
    }

    /// Deletes every logged set of the session in the same transaction.
    fn before_delete(txn: &mut Transaction<'_>, key: &str, _config: &StoreConfig) -> CoreResult<usize> {
        let sets = txn.index_lookup(Collection::LoggedSets, "sessionId", &IndexValue::from(key))?;
        let mut deleted = 0;
        for set in sets {
            if let Some(id) = set.get("id").and_then(|v| v.as_str()) {
                if txn.delete(Collection::LoggedSets, id)? {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_loosely_and_stores_lowercase() {
        assert_eq!("Completed".parse::<SessionStatus>(), Ok(SessionStatus::Completed));
        assert!("paused".parse::<SessionStatus>().is_err());
        let json = serde_json::to_value(SessionStatus::Active).unwrap();
        assert_eq!(json, "active");
    }

    #[test]
    fn missing_optional_fields_default() {
        let session: Session =
            serde_json::from_str(r#"{"id":"S1","date":1704067200000}"#).unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.exercise_order.is_empty());
        assert_eq!(session.created_at, 0);
    }
}
