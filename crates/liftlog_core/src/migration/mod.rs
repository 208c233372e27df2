//! Schema versioning and migrations.
//!
//! ## Design
//!
//! Migrations in LiftLog are:
//! - **Registered in code**: a registry maps each target version to one step
//! - **Forward-only**: there is no downgrade; a store newer than the binary
//!   refuses to open
//! - **Idempotent**: a step writes only records missing the field it adds,
//!   so running it twice changes nothing the second time
//! - **All-or-nothing**: every pending step of one open runs inside a single
//!   upgrade transaction; a failing step leaves the store at its old version
//!
//! A brand-new store skips the steps and is created directly at the target
//! version.
//!
//! ## Usage
//!
//! ```ignore
//! struct AddNotesField;
//! impl Migration for AddNotesField {
//!     fn version(&self) -> u32 { 6 }
//!     fn name(&self) -> &str { "session_notes" }
//!     fn up(&self, ctx: &mut MigrationContext<'_, '_>) -> CoreResult<()> {
//!         ctx.backfill(Collection::Sessions, |record| {
//!             backfill_field(record, "notes", Value::Null)
//!         })?;
//!         Ok(())
//!     }
//! }
//! ```

mod builtin;

pub use builtin::{
    backfill_field, DerivedExerciseIds, ExerciseType, InitialSchema, PlanExerciseGuideLinks,
    PlanSchedule,
};

use crate::error::{CoreError, CoreResult};
use crate::schema::{collection_defs, Collection, IndexDef, CURRENT_SCHEMA_VERSION};
use crate::store::{Store, Transaction};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Information about a registered migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationInfo {
    /// Target version.
    pub version: u32,
    /// Short name.
    pub name: String,
    /// What the migration does.
    pub description: Option<String>,
}

/// Outcome of one applied migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationResult {
    /// Target version.
    pub version: u32,
    /// Short name.
    pub name: String,
    /// Records the migration rewrote.
    pub updated: usize,
}

/// What happened to the schema when a store was opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeReport {
    /// Version found in the store; zero for a brand-new store.
    pub from_version: u32,
    /// Version the store is at now.
    pub to_version: u32,
    /// Whether the schema was created from scratch.
    pub created: bool,
    /// Migrations applied, in order.
    pub applied: Vec<MigrationResult>,
}

/// An operation performed during a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOperation {
    /// Created an index.
    CreateIndex {
        /// Collection the index is on.
        collection: String,
        /// Index name.
        index_name: String,
    },
    /// Rewrote records of a collection.
    Backfill {
        /// Collection scanned.
        collection: String,
        /// Records rewritten.
        updated: usize,
    },
}

/// Operations available to a migration step.
///
/// Everything goes through the upgrade transaction, so nothing a step does
/// is visible until every pending step has succeeded.
pub struct MigrationContext<'a, 's> {
    txn: &'a mut Transaction<'s>,
    from_version: u32,
    target_version: u32,
    page_size: usize,
    /// Operations performed so far.
    pub operations: Vec<MigrationOperation>,
}

impl<'a, 's> MigrationContext<'a, 's> {
    fn new(txn: &'a mut Transaction<'s>, from_version: u32, target_version: u32, page_size: usize) -> Self {
        Self {
            txn,
            from_version,
            target_version,
            page_size: page_size.max(1),
            operations: Vec::new(),
        }
    }

    /// Version the store was at before this upgrade began.
    #[must_use]
    pub fn from_version(&self) -> u32 {
        self.from_version
    }

    /// Version this upgrade ends at.
    #[must_use]
    pub fn target_version(&self) -> u32 {
        self.target_version
    }

    /// The upgrade transaction.
    pub fn transaction(&mut self) -> &mut Transaction<'s> {
        self.txn
    }

    /// Creates an index unless it exists.
    pub fn create_index(&mut self, collection: Collection, def: &IndexDef) -> CoreResult<bool> {
        let created = self.txn.create_index(collection, def)?;
        if created {
            self.operations.push(MigrationOperation::CreateIndex {
                collection: collection.name().to_string(),
                index_name: def.name.clone(),
            });
        }
        Ok(created)
    }

    /// Walks every record of a collection page by page and writes back the
    /// ones `update` reports as changed. Returns how many were written.
    pub fn backfill<F>(&mut self, collection: Collection, mut update: F) -> CoreResult<usize>
    where
        F: FnMut(&mut Map<String, Value>) -> bool,
    {
        let mut after: Option<String> = None;
        let mut updated = 0;
        loop {
            let page = self
                .txn
                .scan_page(collection, after.as_deref(), self.page_size)?;
            let Some((last, _)) = page.last() else {
                break;
            };
            let last = last.clone();
            let full = page.len() == self.page_size;

            for (_, mut record) in page {
                if let Value::Object(map) = &mut record {
                    if update(map) {
                        self.txn.put(collection, record)?;
                        updated += 1;
                    }
                }
            }

            if !full {
                break;
            }
            after = Some(last);
        }

        self.operations.push(MigrationOperation::Backfill {
            collection: collection.name().to_string(),
            updated,
        });
        Ok(updated)
    }

    fn updated(&self) -> usize {
        self.operations
            .iter()
            .map(|op| match op {
                MigrationOperation::Backfill { updated, .. } => *updated,
                MigrationOperation::CreateIndex { .. } => 0,
            })
            .sum()
    }
}

/// Trait for defining migrations.
pub trait Migration: Send + Sync {
    /// The version this step upgrades the store to.
    ///
    /// Versions must be unique and contiguous starting from 1.
    fn version(&self) -> u32;

    /// Short name of the step.
    fn name(&self) -> &str;

    /// Returns an optional description.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Runs the step.
    fn up(&self, ctx: &mut MigrationContext<'_, '_>) -> CoreResult<()>;
}

/// Registry of migrations keyed by target version.
pub struct MigrationManager {
    migrations: BTreeMap<u32, Box<dyn Migration>>,
}

impl MigrationManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            migrations: BTreeMap::new(),
        }
    }

    /// A registry holding every built-in migration.
    pub fn builtin() -> CoreResult<Self> {
        let mut manager = Self::new();
        manager.register(Box::new(InitialSchema))?;
        manager.register(Box::new(PlanExerciseGuideLinks))?;
        manager.register(Box::new(ExerciseType))?;
        manager.register(Box::new(PlanSchedule))?;
        manager.register(Box::new(DerivedExerciseIds))?;
        Ok(manager)
    }

    /// Registers a migration.
    ///
    /// # Errors
    ///
    /// Fails if a migration with the same version is already registered.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> CoreResult<()> {
        let version = migration.version();
        if version == 0 {
            return Err(CoreError::schema("migration version 0 is reserved"));
        }
        if self.migrations.contains_key(&version) {
            return Err(CoreError::schema(format!(
                "migration version {version} already registered"
            )));
        }
        self.migrations.insert(version, migration);
        Ok(())
    }

    /// Registered migrations, in version order.
    #[must_use]
    pub fn list(&self) -> Vec<MigrationInfo> {
        self.migrations.values().map(|m| info_of(m.as_ref())).collect()
    }

    /// Migrations that take a store from `from` to `to`.
    #[must_use]
    pub fn pending(&self, from: u32, to: u32) -> Vec<MigrationInfo> {
        if from >= to {
            return Vec::new();
        }
        self.migrations
            .range(from + 1..=to)
            .map(|(_, m)| info_of(m.as_ref()))
            .collect()
    }

    /// Checks that versions `1..=to` are all registered.
    pub fn validate(&self, to: u32) -> CoreResult<()> {
        for version in 1..=to {
            if !self.migrations.contains_key(&version) {
                return Err(CoreError::schema(format!(
                    "no migration registered for version {version}"
                )));
            }
        }
        Ok(())
    }

    /// Brings `store` to `target`.
    ///
    /// A fresh store gets every collection and index of `target` in one
    /// transaction. An older store gets, for each version in ascending
    /// order, that version's new collections and indexes followed by its
    /// migration, all inside one transaction.
    ///
    /// # Errors
    ///
    /// Every failure is reported as `Schema`, except a lost connection. The
    /// store is left at its previous version.
    pub fn upgrade(&self, store: &Store, target: u32) -> CoreResult<UpgradeReport> {
        if target == 0 || target > CURRENT_SCHEMA_VERSION {
            return Err(CoreError::schema(format!(
                "unsupported schema version {target}; this build supports up to {CURRENT_SCHEMA_VERSION}"
            )));
        }
        self.validate(target)?;

        let from = store.version();
        if from > target {
            return Err(CoreError::schema(format!(
                "store is at schema version {from}, newer than supported version {target}"
            )));
        }
        let mut report = UpgradeReport {
            from_version: from,
            to_version: target,
            created: from == 0,
            applied: Vec::new(),
        };
        if from == target {
            return Ok(report);
        }

        let page_size = store.config().cursor_page_size;
        let outcome = store.write(|txn| {
            if from == 0 {
                create_schema(txn, target)?;
                txn.set_version(target)?;
                return Ok(Vec::new());
            }

            let mut applied = Vec::new();
            for version in from + 1..=target {
                apply_schema_changes(txn, version)?;
                let migration = self.migrations.get(&version).ok_or_else(|| {
                    CoreError::schema(format!("no migration registered for version {version}"))
                })?;

                let mut ctx = MigrationContext::new(txn, from, target, page_size);
                migration.up(&mut ctx).map_err(|e| {
                    CoreError::schema(format!(
                        "migration {version} ({}) failed: {e}",
                        migration.name()
                    ))
                })?;
                let updated = ctx.updated();
                debug!(version, name = migration.name(), operations = ?ctx.operations, "migration step done");

                txn.set_version(version)?;
                applied.push(MigrationResult {
                    version,
                    name: migration.name().to_string(),
                    updated,
                });
            }
            Ok(applied)
        });

        match outcome {
            Ok(applied) => {
                for step in &applied {
                    info!(version = step.version, name = %step.name, updated = step.updated, "migration applied");
                }
                report.applied = applied;
                Ok(report)
            }
            Err(e) if e.is_connection_lost() || matches!(e, CoreError::Schema { .. }) => Err(e),
            Err(e) => Err(CoreError::schema(format!(
                "schema upgrade to version {target} failed: {e}"
            ))),
        }
    }
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MigrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationManager")
            .field("versions", &self.migrations.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn info_of(m: &dyn Migration) -> MigrationInfo {
    MigrationInfo {
        version: m.version(),
        name: m.name().to_string(),
        description: m.description().map(String::from),
    }
}

/// Creates every collection and index that exists at `version`.
fn create_schema(txn: &mut Transaction<'_>, version: u32) -> CoreResult<()> {
    for def in collection_defs().iter().filter(|d| d.since <= version) {
        txn.create_collection(def.collection)?;
        for index in def.indexes_at(version) {
            txn.create_index(def.collection, index)?;
        }
    }
    Ok(())
}

/// Creates the collections and indexes introduced at `version`.
fn apply_schema_changes(txn: &mut Transaction<'_>, version: u32) -> CoreResult<()> {
    for def in collection_defs() {
        if def.since > version {
            continue;
        }
        txn.create_collection(def.collection)?;
        for index in def.indexes_added_in(version) {
            txn.create_index(def.collection, index)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use liftlog_storage::InMemoryBackend;
    use serde_json::json;

    struct Failing;

    impl Migration for Failing {
        fn version(&self) -> u32 {
            3
        }
        fn name(&self) -> &str {
            "failing"
        }
        fn up(&self, ctx: &mut MigrationContext<'_, '_>) -> CoreResult<()> {
            ctx.backfill(Collection::Exercises, |record| {
                record.insert("touched".into(), json!(true));
                true
            })?;
            Err(CoreError::malformed("cannot convert record"))
        }
    }

    fn legacy_store(version: u32) -> (InMemoryBackend, Store) {
        let backend = InMemoryBackend::new();
        let store =
            Store::open_in_memory(backend.clone(), StoreConfig::default().schema_version(version)).unwrap();
        (backend, store)
    }

    #[test]
    fn duplicate_version_rejected() {
        let mut manager = MigrationManager::builtin().unwrap();
        let err = manager.register(Box::new(ExerciseType)).unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn pending_is_the_version_range() {
        let manager = MigrationManager::builtin().unwrap();
        let pending: Vec<u32> = manager.pending(2, 5).iter().map(|m| m.version).collect();
        assert_eq!(pending, vec![3, 4, 5]);
        assert!(manager.pending(5, 5).is_empty());
        assert_eq!(manager.list().len(), 5);
    }

    #[test]
    fn gaps_fail_validation() {
        let mut manager = MigrationManager::new();
        manager.register(Box::new(InitialSchema)).unwrap();
        manager.register(Box::new(ExerciseType)).unwrap();
        assert!(manager.validate(1).is_ok());
        assert!(matches!(manager.validate(3), Err(CoreError::Schema { .. })));
    }

    #[test]
    fn legacy_store_is_upgraded_in_order() {
        let (backend, store) = legacy_store(2);
        store
            .write(|txn| {
                txn.put(
                    Collection::Plans,
                    json!({"id": "P1", "name": "Push", "planExercises": [{"id": "PE1", "exerciseId": "E1", "guideLinks": []}]}),
                )?;
                txn.put(Collection::Exercises, json!({"id": "E1", "name": "Bench"}))
            })
            .unwrap();
        assert!(!store.read(|txn| Ok(txn.has_index(Collection::Plans, "exerciseIds"))).unwrap());
        drop(store);

        let store = Store::open_in_memory(backend.reconnect(), StoreConfig::default()).unwrap();
        let report = store.upgrade_report();
        assert_eq!(report.from_version, 2);
        assert_eq!(report.to_version, CURRENT_SCHEMA_VERSION);
        let versions: Vec<u32> = report.applied.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![3, 4, 5]);

        let plan = store.read(|txn| txn.get(Collection::Plans, "P1")).unwrap().unwrap();
        assert_eq!(plan["weekday"], Value::Null);
        assert_eq!(plan["exerciseIds"], json!(["E1"]));
        let exercise = store.read(|txn| txn.get(Collection::Exercises, "E1")).unwrap().unwrap();
        assert!(exercise.as_object().unwrap().contains_key("exerciseType"));
        assert!(store.read(|txn| Ok(txn.has_index(Collection::Plans, "exerciseIds"))).unwrap());
    }

    #[test]
    fn failing_step_leaves_store_untouched() {
        let (backend, store) = legacy_store(2);
        store
            .write(|txn| txn.put(Collection::Exercises, json!({"id": "E1", "name": "Bench"})))
            .unwrap();

        let mut manager = MigrationManager::new();
        manager.register(Box::new(InitialSchema)).unwrap();
        manager.register(Box::new(PlanExerciseGuideLinks)).unwrap();
        manager.register(Box::new(Failing)).unwrap();

        let err = manager.upgrade(&store, 3).unwrap_err();
        assert!(matches!(err, CoreError::Schema { .. }));
        assert!(err.to_string().contains("migration 3 (failing) failed"));
        assert_eq!(store.version(), 2);
        let exercise = store.read(|txn| txn.get(Collection::Exercises, "E1")).unwrap().unwrap();
        assert!(exercise.get("touched").is_none());
        drop(backend);
    }

    #[test]
    fn newer_store_refuses_to_open() {
        let (backend, store) = legacy_store(5);
        drop(store);
        let err = Store::open_in_memory(backend.reconnect(), StoreConfig::default().schema_version(4))
            .unwrap_err();
        assert!(matches!(err, CoreError::Schema { .. }));
    }

    #[test]
    fn backfill_pages_through_everything() {
        let (_backend, store) = legacy_store(1);
        store
            .write(|txn| {
                for i in 0..10 {
                    txn.put(Collection::Exercises, json!({"id": format!("E{i:02}"), "name": "x"}))?;
                }
                Ok(())
            })
            .unwrap();

        let updated = store
            .write(|txn| {
                let mut ctx = MigrationContext::new(txn, 1, 3, 3);
                ctx.backfill(Collection::Exercises, |record| {
                    backfill_field(record, "exerciseType", Value::Null)
                })
            })
            .unwrap();
        assert_eq!(updated, 10);

        let again = store
            .write(|txn| {
                let mut ctx = MigrationContext::new(txn, 1, 3, 3);
                ctx.backfill(Collection::Exercises, |record| {
                    backfill_field(record, "exerciseType", Value::Null)
                })
            })
            .unwrap();
        assert_eq!(again, 0);
    }
}
