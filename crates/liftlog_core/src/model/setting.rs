use crate::model::Record;
use crate::schema::Collection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Epoch ms of the most recent CSV or backup export.
pub const SETTING_LAST_EXPORT: &str = "lastExportAt";

/// Summaries of the most recent row imports, newest first.
pub const SETTING_IMPORT_HISTORY: &str = "importHistory";

/// What the most recent import was, for undo.
pub const SETTING_LAST_IMPORT: &str = "lastImport";

/// A keyed configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingEntry {
    /// Setting name.
    pub key: String,
    /// Arbitrary JSON value.
    #[serde(default)]
    pub value: Value,
    /// Last write time, epoch ms.
    #[serde(default)]
    pub updated_at: i64,
}

impl SettingEntry {
    /// An entry holding `value`.
    #[must_use]
    pub fn new(key: impl Into<String>, value: Value, updated_at: i64) -> Self {
        Self {
            key: key.into(),
            value,
            updated_at,
        }
    }
}

impl Record for SettingEntry {
    const COLLECTION: Collection = Collection::Settings;

    fn key(&self) -> &str {
        &self.key
    }

    fn stamp_created(&mut self, now: i64) {
        self.updated_at = now;
    }

    fn touch(&mut self, now: i64) {
        self.updated_at = now;
    }
}
