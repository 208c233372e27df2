//! Grouping import rows into sessions and matching them against the store.

use super::row::ImportRow;
use crate::error::{CoreError, CoreResult};
use crate::model::{LoggedSet, Record, Session};
use crate::store::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// What to do with an imported session that is already in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DuplicateStrategy {
    /// Drop the session and all its rows.
    #[default]
    Skip,
    /// Import it as a separate session under a fresh id.
    CreateNew,
}

impl fmt::Display for DuplicateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Skip => "skip",
            Self::CreateNew => "createNew",
        })
    }
}

impl FromStr for DuplicateStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "skip" => Ok(Self::Skip),
            "createnew" => Ok(Self::CreateNew),
            other => Err(CoreError::malformed(format!("unknown duplicate strategy {other:?}"))),
        }
    }
}

/// A fresh record id.
#[must_use]
pub fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

/// Lowercased, trimmed session name used for name+date matching.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Existing sessions indexed by id and by normalized name + date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateLookup {
    by_id: HashSet<String>,
    by_name_date: HashMap<(String, i64), String>,
}

impl DuplicateLookup {
    /// An empty lookup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every session in the store, reading one page at a time.
    pub fn build(txn: &Transaction<'_>, page_size: usize) -> CoreResult<Self> {
        let mut lookup = Self::new();
        for item in txn.cursor(Session::COLLECTION, page_size) {
            let (_, value) = item?;
            lookup.insert(&Session::from_value(value)?);
        }
        Ok(lookup)
    }

    /// Adds one session.
    pub fn insert(&mut self, session: &Session) {
        self.by_id.insert(session.id.clone());
        if let Some(name) = session.name.as_deref().map(normalize_name).filter(|n| !n.is_empty()) {
            self.by_name_date
                .entry((name, session.date))
                .or_insert_with(|| session.id.clone());
        }
    }

    /// Whether a session with `id` exists.
    #[must_use]
    pub fn contains_id(&self, id: &str) -> bool {
        self.by_id.contains(id)
    }

    /// The existing session with this name and date.
    #[must_use]
    pub fn find_name_date(&self, name: &str, date: i64) -> Option<&str> {
        let name = normalize_name(name);
        if name.is_empty() {
            return None;
        }
        self.by_name_date.get(&(name, date)).map(String::as_str)
    }

    /// Number of sessions indexed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether no sessions are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// What makes rows belong to the same session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    /// An explicit session id.
    Id(String),
    /// Normalized session name and date, for rows without an id.
    NameDate(String, i64),
}

/// Rows of one imported session.
#[derive(Debug, Clone, PartialEq)]
pub struct RowGroup {
    /// Grouping key.
    pub key: GroupKey,
    /// Rows in input order.
    pub rows: Vec<ImportRow>,
    /// Existing session with the same id.
    pub matched_id: Option<String>,
    /// Existing session with the same name and date.
    pub matched_name_date: Option<String>,
}

impl RowGroup {
    /// Whether the group matches an existing session either way.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.matched_id.is_some() || self.matched_name_date.is_some()
    }
}

/// Existing sessions matched by an import, per match class.
///
/// A session matched both by id and by name+date appears in both sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateReport {
    /// Sessions matched by id.
    pub by_id: BTreeSet<String>,
    /// Sessions matched by name and date.
    pub by_name_date: BTreeSet<String>,
    /// Imported groups dropped by `Skip`.
    pub skipped_groups: usize,
    /// Imported groups given a fresh id by `CreateNew`.
    pub renamed_groups: usize,
}

impl DuplicateReport {
    /// Distinct sessions matched by id.
    #[must_use]
    pub fn id_matches(&self) -> usize {
        self.by_id.len()
    }

    /// Distinct sessions matched by name and date.
    #[must_use]
    pub fn name_date_matches(&self) -> usize {
        self.by_name_date.len()
    }
}

/// Groups rows by session id, or by name and date when the id is absent.
/// Groups keep the order in which they first appear.
#[must_use]
pub fn group_rows(rows: Vec<ImportRow>) -> Vec<RowGroup> {
    let mut groups: Vec<RowGroup> = Vec::new();
    let mut positions: HashMap<GroupKey, usize> = HashMap::new();
    for row in rows {
        let key = match &row.session_id {
            Some(id) => GroupKey::Id(id.clone()),
            None => GroupKey::NameDate(
                normalize_name(row.session_name.as_deref().unwrap_or_default()),
                row.session_date,
            ),
        };
        match positions.get(&key) {
            Some(&at) => groups[at].rows.push(row),
            None => {
                positions.insert(key.clone(), groups.len());
                groups.push(RowGroup {
                    key,
                    rows: vec![row],
                    matched_id: None,
                    matched_name_date: None,
                });
            }
        }
    }
    groups
}

/// Marks each group's matches and reports them per class.
pub fn detect_duplicates(groups: &mut [RowGroup], lookup: &DuplicateLookup) -> DuplicateReport {
    let mut report = DuplicateReport::default();
    for group in groups.iter_mut() {
        if let GroupKey::Id(id) = &group.key {
            if lookup.contains_id(id) {
                group.matched_id = Some(id.clone());
                report.by_id.insert(id.clone());
            }
        }
        let Some(first) = group.rows.first() else {
            continue;
        };
        if let Some(name) = &first.session_name {
            if let Some(existing) = lookup.find_name_date(name, first.session_date) {
                group.matched_name_date = Some(existing.to_string());
                report.by_name_date.insert(existing.to_string());
            }
        }
    }
    report
}

/// A session and its sets, ready to write.
///
/// A zero `created_at` is stamped at write time.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    /// The session record.
    pub session: Session,
    /// Its sets.
    pub sets: Vec<LoggedSet>,
}

fn first_some<'r>(rows: &'r [ImportRow], field: impl Fn(&'r ImportRow) -> Option<&'r String>) -> Option<String> {
    rows.iter().find_map(field).cloned()
}

fn build_session(id: String, rows: &[ImportRow]) -> Session {
    let mut session = Session::new(id, rows.first().map_or(0, |r| r.session_date));
    session.name = first_some(rows, |r| r.session_name.as_ref());
    session.source_plan_id = first_some(rows, |r| r.source_plan_id.as_ref());
    session.workout_type = first_some(rows, |r| r.workout_type.as_ref());
    if let Some(first) = rows.first() {
        session.status = first.session_status;
        session.created_at = first.session_created.unwrap_or(0);
        session.updated_at = first.session_updated;
    }
    session.exercise_order = rows
        .iter()
        .map(|r| &r.exercise_order)
        .find(|order| !order.is_empty())
        .cloned()
        .unwrap_or_else(|| {
            let mut order: Vec<String> = Vec::new();
            for row in rows {
                if !order.contains(&row.exercise_id) {
                    order.push(row.exercise_id.clone());
                }
            }
            order
        });
    session
}

fn build_set(session_id: &str, row: ImportRow) -> LoggedSet {
    let mut set = LoggedSet::new(row.set_id, session_id, row.exercise_id, row.weight, row.reps, row.set_timestamp);
    set.exercise_name_snapshot = row.exercise_name;
    set.weight_unit = row.unit;
    if let Some(set_type) = row.set_type {
        set.set_type = set_type;
    }
    set.set_index = row.set_index;
    set.order_index = row.order_index;
    set.notes = row.notes;
    set.status = row.set_status;
    set.alternative = row.alternative;
    set.created_at = row.set_created.unwrap_or(0);
    set.updated_at = row.set_updated;
    set.normalize();
    set
}

/// Groups rows, detects duplicates and applies `strategy`.
///
/// Groups without a match keep their supplied session id; groups keyed by
/// name and date get a fresh one. Under `Skip` matched groups are dropped,
/// under `CreateNew` they get a fresh id.
pub fn build_session_groups(
    rows: Vec<ImportRow>,
    lookup: &DuplicateLookup,
    strategy: DuplicateStrategy,
) -> (Vec<SessionPlan>, DuplicateReport) {
    let mut groups = group_rows(rows);
    let mut report = detect_duplicates(&mut groups, lookup);

    let mut plans = Vec::with_capacity(groups.len());
    for group in groups {
        let id = match (&group.key, group.is_duplicate(), strategy) {
            (_, true, DuplicateStrategy::Skip) => {
                report.skipped_groups += 1;
                continue;
            }
            (_, true, DuplicateStrategy::CreateNew) => {
                report.renamed_groups += 1;
                fresh_id()
            }
            (GroupKey::Id(id), false, _) => id.clone(),
            (GroupKey::NameDate(..), false, _) => fresh_id(),
        };
        let session = build_session(id, &group.rows);
        let sets = group
            .rows
            .into_iter()
            .map(|row| build_set(&session.id, row))
            .collect();
        plans.push(SessionPlan { session, sets });
    }
    (plans, report)
}
