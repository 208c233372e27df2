//! Store configuration.

use crate::schema::CURRENT_SCHEMA_VERSION;
use std::time::Duration;

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to flush the commit log on every commit.
    pub sync_on_commit: bool,

    /// Schema version the store is opened at.
    pub schema_version: u32,

    /// Session groups (row import) or records (backup import) per transaction.
    pub import_chunk_size: usize,

    /// Records fetched per page by cursor scans.
    pub cursor_page_size: usize,

    /// How long to wait for another connection to release the store.
    pub blocked_timeout: Duration,

    /// Maximum referencing plans listed by an exercise reference check.
    pub reference_plan_sample: usize,

    /// Maximum referencing sessions listed by an exercise reference check.
    pub reference_session_sample: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            schema_version: CURRENT_SCHEMA_VERSION,
            import_chunk_size: 100,
            cursor_page_size: 256,
            blocked_timeout: Duration::from_secs(2),
            reference_plan_sample: 12,
            reference_session_sample: 6,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to flush the log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Pins the schema version the store is opened at.
    ///
    /// Opening at an older version than [`CURRENT_SCHEMA_VERSION`] is only
    /// useful for building legacy fixtures.
    #[must_use]
    pub const fn schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    /// Sets the import chunk size. Zero is treated as one.
    #[must_use]
    pub const fn import_chunk_size(mut self, size: usize) -> Self {
        self.import_chunk_size = if size == 0 { 1 } else { size };
        self
    }

    /// Sets the cursor page size. Zero is treated as one.
    #[must_use]
    pub const fn cursor_page_size(mut self, size: usize) -> Self {
        self.cursor_page_size = if size == 0 { 1 } else { size };
        self
    }

    /// Sets how long an open waits on a blocked store.
    #[must_use]
    pub const fn blocked_timeout(mut self, timeout: Duration) -> Self {
        self.blocked_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_import_contract() {
        let config = StoreConfig::default();
        assert!(config.create_if_missing);
        assert_eq!(config.import_chunk_size, 100);
        assert_eq!(config.reference_plan_sample, 12);
        assert_eq!(config.reference_session_sample, 6);
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn builder_clamps_zero_sizes() {
        let config = StoreConfig::new()
            .import_chunk_size(0)
            .cursor_page_size(0)
            .schema_version(2);
        assert_eq!(config.import_chunk_size, 1);
        assert_eq!(config.cursor_page_size, 1);
        assert_eq!(config.schema_version, 2);
    }
}
