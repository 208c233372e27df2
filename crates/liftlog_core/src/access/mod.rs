//! Typed record access.
//!
//! [`Repository<T>`] wraps the raw transaction API for one record type. Every
//! create and update runs [`Record::normalize`] before the record is
//! written, so derived fields such as `exerciseIds` always match the fields
//! they derive from, whichever call site did the write.
//!
//! Each operation has a variant that runs in its own transaction and an
//! `_in_txn` variant for composing several operations into one commit.

mod query;

pub use query::{ListQuery, Page, PageRequest, RangeFilter, SortKey};

use crate::error::{CoreError, CoreResult};
use crate::index::IndexValue;
use crate::model::{Exercise, LoggedSet, Plan, Record, Session, SessionStatus};
use crate::reference::{check_exercise_references, ReferenceReport};
use crate::store::{Store, Transaction};
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::ops::Bound;
use tracing::debug;

/// A partial update of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCommand {
    /// Key of the record to update.
    pub id: String,
    /// Fields to overwrite, in stored (camelCase) form.
    pub patch: Map<String, Value>,
}

impl UpdateCommand {
    /// An update of `id` with `patch`.
    ///
    /// A `patch` that is not a JSON object updates nothing.
    #[must_use]
    pub fn new(id: impl Into<String>, patch: Value) -> Self {
        let patch = match patch {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { id: id.into(), patch }
    }
}

/// Typed access to the records of one collection.
///
/// # Example
///
/// ```rust
/// use liftlog_core::access::Repository;
/// use liftlog_core::model::{Plan, PlanExercise};
/// use liftlog_core::{Store, StoreConfig};
/// use liftlog_storage::InMemoryBackend;
///
/// let store = Store::open_in_memory(InMemoryBackend::new(), StoreConfig::default()).unwrap();
/// let plans = Repository::<Plan>::new(&store);
///
/// let mut plan = Plan::new("P1", "Push");
/// plan.plan_exercises.push(PlanExercise::new("pe1", "bench"));
/// let plan = plans.create(plan).unwrap();
/// assert_eq!(plan.exercise_ids, vec!["bench"]);
/// ```
pub struct Repository<'a, T: Record> {
    store: &'a Store,
    _marker: PhantomData<T>,
}

impl<'a, T: Record> Repository<'a, T> {
    /// Access to `T` records in `store`.
    #[must_use]
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// The store this repository writes to.
    #[must_use]
    pub fn store(&self) -> &'a Store {
        self.store
    }

    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// `DuplicateKey` if a record with the same key exists.
    pub fn create(&self, record: T) -> CoreResult<T> {
        self.store.write(|txn| self.create_in_txn(txn, record))
    }

    /// Inserts a new record within an existing transaction.
    pub fn create_in_txn(&self, txn: &mut Transaction<'_>, mut record: T) -> CoreResult<T> {
        record.normalize();
        record.stamp_created(self.store.now());
        txn.add(T::COLLECTION, record.to_value()?)?;
        Ok(record)
    }

    /// Writes a record as-is apart from its derived fields, replacing any
    /// record with the same key. Timestamps are kept.
    pub fn put_in_txn(&self, txn: &mut Transaction<'_>, mut record: T) -> CoreResult<T> {
        record.normalize();
        txn.put(T::COLLECTION, record.to_value()?)?;
        Ok(record)
    }

    /// Gets a record by key.
    pub fn get(&self, id: &str) -> CoreResult<Option<T>> {
        self.store.read(|txn| self.get_in_txn(txn, id))
    }

    /// Gets a record within a transaction, seeing its uncommitted writes.
    pub fn get_in_txn(&self, txn: &Transaction<'_>, id: &str) -> CoreResult<Option<T>> {
        txn.get(T::COLLECTION, id)?.map(T::from_value).transpose()
    }

    /// Gets a record that must exist.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no such record.
    pub fn require_in_txn(&self, txn: &Transaction<'_>, id: &str) -> CoreResult<T> {
        self.get_in_txn(txn, id)?
            .ok_or_else(|| CoreError::not_found(T::COLLECTION.name(), id))
    }

    /// Every record, in key order.
    ///
    /// **Warning**: This loads the whole collection.
    pub fn get_all(&self) -> CoreResult<Vec<T>> {
        self.store.read(|txn| {
            txn.get_all(T::COLLECTION)?
                .into_iter()
                .map(T::from_value)
                .collect()
        })
    }

    /// Number of records.
    pub fn count(&self) -> CoreResult<usize> {
        self.store.read(|txn| txn.count(T::COLLECTION))
    }

    /// Merges `patch` onto an existing record.
    ///
    /// The key cannot be changed; a key field in the patch is ignored.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no such record, `MalformedInput` if the merged
    /// record is not a valid `T`.
    pub fn update(&self, id: &str, patch: Map<String, Value>) -> CoreResult<T> {
        self.store.write(|txn| self.update_in_txn(txn, id, &patch))
    }

    /// Merges `patch` onto an existing record within a transaction.
    pub fn update_in_txn(&self, txn: &mut Transaction<'_>, id: &str, patch: &Map<String, Value>) -> CoreResult<T> {
        let Some(Value::Object(mut stored)) = txn.get(T::COLLECTION, id)? else {
            return Err(CoreError::not_found(T::COLLECTION.name(), id));
        };
        let key_field = T::COLLECTION.key_field();
        for (field, value) in patch {
            if field != key_field {
                stored.insert(field.clone(), value.clone());
            }
        }
        let mut record = T::from_value(Value::Object(stored))?;
        record.normalize();
        record.touch(self.store.now());
        txn.put(T::COLLECTION, record.to_value()?)?;
        Ok(record)
    }

    /// Applies `change` to an existing record and writes it back.
    pub fn modify<F>(&self, id: &str, change: F) -> CoreResult<T>
    where
        F: FnOnce(&mut T),
    {
        self.store.write(|txn| {
            let mut record = self.require_in_txn(txn, id)?;
            change(&mut record);
            if record.key() != id {
                return Err(CoreError::invalid_operation(format!(
                    "cannot change the key of {} record {id}",
                    T::COLLECTION
                )));
            }
            record.normalize();
            record.touch(self.store.now());
            txn.put(T::COLLECTION, record.to_value()?)?;
            Ok(record)
        })
    }

    /// Applies every update in one transaction.
    ///
    /// # Errors
    ///
    /// `NotFound` if any key is missing; nothing is written then.
    pub fn bulk_update(&self, commands: &[UpdateCommand]) -> CoreResult<Vec<T>> {
        self.store.write(|txn| {
            commands
                .iter()
                .map(|cmd| self.update_in_txn(txn, &cmd.id, &cmd.patch))
                .collect()
        })
    }

    /// Deletes a record and whatever depends on it.
    ///
    /// Returns the number of dependent records deleted with it.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no such record; `ReferenceConflict` when the
    /// record type refuses the delete.
    pub fn delete(&self, id: &str) -> CoreResult<usize> {
        self.store.write(|txn| self.delete_in_txn(txn, id))
    }

    /// Deletes a record within an existing transaction.
    pub fn delete_in_txn(&self, txn: &mut Transaction<'_>, id: &str) -> CoreResult<usize> {
        if !txn.contains(T::COLLECTION, id)? {
            return Err(CoreError::not_found(T::COLLECTION.name(), id));
        }
        let dependents = T::before_delete(txn, id, self.store.config())?;
        txn.delete(T::COLLECTION, id)?;
        debug!(collection = %T::COLLECTION, id, dependents, "record deleted");
        Ok(dependents)
    }

    /// Runs a filtered, sorted, paged list query.
    pub fn list(&self, query: &ListQuery) -> CoreResult<Page<T>> {
        self.store.read(|txn| {
            let page = query.execute(txn, T::COLLECTION)?;
            Ok(Page {
                items: page
                    .items
                    .into_iter()
                    .map(T::from_value)
                    .collect::<CoreResult<_>>()?,
                total: page.total,
            })
        })
    }

    fn decode(values: Vec<Value>) -> CoreResult<Vec<T>> {
        values.into_iter().map(T::from_value).collect()
    }
}

/// Bounds covering every `[prefix, x]` compound key, with `x` limited by
/// `from`/`to` when given.
fn prefix_bounds(prefix: &str, from: Option<i64>, to: Option<i64>) -> (IndexValue, IndexValue) {
    let lower = match from {
        Some(from) => IndexValue::compound([prefix.into(), from.into()]),
        None => IndexValue::compound([prefix.into()]),
    };
    // Arrays sort after numbers and text, so `[prefix, []]` is above every
    // `[prefix, x]`.
    let upper = match to {
        Some(to) => IndexValue::compound([prefix.into(), to.into()]),
        None => IndexValue::compound([prefix.into(), IndexValue::Array(Vec::new())]),
    };
    (lower, upper)
}

impl Repository<'_, LoggedSet> {
    /// Sets of one session, in session order.
    pub fn for_session(&self, session_id: &str) -> CoreResult<Vec<LoggedSet>> {
        let mut sets = self.store.read(|txn| {
            Self::decode(txn.index_lookup(
                LoggedSet::COLLECTION,
                "sessionId",
                &IndexValue::from(session_id),
            )?)
        })?;
        sets.sort_by_key(|s| (s.order_index.unwrap_or(i64::MAX), s.timestamp));
        Ok(sets)
    }

    /// Sets of one exercise logged within the inclusive time bounds, oldest
    /// first.
    pub fn exercise_history(&self, exercise_id: &str, from: Option<i64>, to: Option<i64>) -> CoreResult<Vec<LoggedSet>> {
        let (lower, upper) = prefix_bounds(exercise_id, from, to);
        self.store.read(|txn| {
            Self::decode(txn.index_range(
                LoggedSet::COLLECTION,
                "exerciseId+timestamp",
                Bound::Included(&lower),
                Bound::Included(&upper),
            )?)
        })
    }

    /// The heaviest set of one exercise; the latest of equal weights.
    pub fn heaviest(&self, exercise_id: &str) -> CoreResult<Option<LoggedSet>> {
        let (lower, upper) = prefix_bounds(exercise_id, None, None);
        let sets = self.store.read(|txn| {
            Self::decode(txn.index_range(
                LoggedSet::COLLECTION,
                "exerciseId+weight",
                Bound::Included(&lower),
                Bound::Included(&upper),
            )?)
        })?;
        let Some(top) = sets.last().map(|s| s.weight) else {
            return Ok(None);
        };
        Ok(sets
            .into_iter()
            .filter(|s| s.weight == top)
            .max_by_key(|s| s.timestamp))
    }
}

impl Repository<'_, Session> {
    /// Sessions with `status` dated within the inclusive bounds, newest
    /// first.
    pub fn by_status(&self, status: SessionStatus, from: Option<i64>, to: Option<i64>) -> CoreResult<Vec<Session>> {
        let (lower, upper) = prefix_bounds(status.as_str(), from, to);
        let mut sessions = self.store.read(|txn| {
            Self::decode(txn.index_range(
                Session::COLLECTION,
                "status+date",
                Bound::Included(&lower),
                Bound::Included(&upper),
            )?)
        })?;
        sessions.reverse();
        Ok(sessions)
    }
}

impl Repository<'_, Plan> {
    /// Plans with the exercise in any slot.
    pub fn using_exercise(&self, exercise_id: &str) -> CoreResult<Vec<Plan>> {
        self.list(&ListQuery::new().filter("exerciseIds", exercise_id))
            .map(|page| page.items)
    }
}

impl Repository<'_, Exercise> {
    /// Where the exercise is still referenced.
    pub fn references(&self, exercise_id: &str) -> CoreResult<ReferenceReport> {
        let config = self.store.config();
        self.store
            .read(|txn| check_exercise_references(txn, exercise_id, config))
    }
}
