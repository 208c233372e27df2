//! Collection and secondary-index definitions, per schema version.
//!
//! ```text
//! exercises   id    name, category, equipment*
//! plans       id    name, exerciseIds* (v5)
//! sessions    id    date, status, sourcePlanId, [status+date]
//! loggedSets  id    sessionId, exerciseId, exerciseIds* (v5), timestamp,
//!                   [exerciseId+timestamp], [exerciseId+weight]
//! settings    key
//! ```
//!
//! `*` marks multi-valued indexes: an array field contributes one index entry
//! per element.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema version a fresh store is created at.
pub const CURRENT_SCHEMA_VERSION: u32 = 5;

/// The collections of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Exercise definitions.
    Exercises,
    /// Workout plans.
    Plans,
    /// Workout sessions.
    Sessions,
    /// Sets logged inside sessions.
    LoggedSets,
    /// Keyed configuration entries.
    Settings,
}

impl Collection {
    /// Every collection, in backup dependency order.
    pub const ALL: [Collection; 5] = [
        Collection::Exercises,
        Collection::Plans,
        Collection::Sessions,
        Collection::LoggedSets,
        Collection::Settings,
    ];

    /// Store name of the collection.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Exercises => "exercises",
            Self::Plans => "plans",
            Self::Sessions => "sessions",
            Self::LoggedSets => "loggedSets",
            Self::Settings => "settings",
        }
    }

    /// Field holding the primary key.
    #[must_use]
    pub const fn key_field(self) -> &'static str {
        match self {
            Self::Settings => "key",
            _ => "id",
        }
    }

    /// Looks a collection up by store name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where an index takes its key from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPath {
    /// A single top-level field.
    Field(String),
    /// Several top-level fields, compared in order.
    Compound(Vec<String>),
}

/// A secondary index on a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name.
    pub name: String,
    /// Key source.
    pub key_path: KeyPath,
    /// Whether an array value yields one entry per element.
    pub multi_entry: bool,
}

impl IndexDef {
    /// An index on one field.
    #[must_use]
    pub fn field(name: &str) -> Self {
        Self {
            name: name.to_string(),
            key_path: KeyPath::Field(name.to_string()),
            multi_entry: false,
        }
    }

    /// A multi-valued index on one array field.
    #[must_use]
    pub fn multi(name: &str) -> Self {
        Self {
            multi_entry: true,
            ..Self::field(name)
        }
    }

    /// A compound index; the name joins the fields with `+`.
    #[must_use]
    pub fn compound(fields: &[&str]) -> Self {
        Self {
            name: fields.join("+"),
            key_path: KeyPath::Compound(fields.iter().map(|f| (*f).to_string()).collect()),
            multi_entry: false,
        }
    }
}

/// An index together with the schema version that introduced it.
#[derive(Debug, Clone)]
pub struct VersionedIndex {
    /// Version the index first exists at.
    pub since: u32,
    /// The index.
    pub def: IndexDef,
}

/// Definition of one collection.
#[derive(Debug, Clone)]
pub struct CollectionDef {
    /// The collection.
    pub collection: Collection,
    /// Version the collection first exists at.
    pub since: u32,
    /// Secondary indexes.
    pub indexes: Vec<VersionedIndex>,
}

impl CollectionDef {
    /// Indexes that exist at `version`.
    pub fn indexes_at(&self, version: u32) -> impl Iterator<Item = &IndexDef> {
        self.indexes
            .iter()
            .filter(move |i| i.since <= version)
            .map(|i| &i.def)
    }

    /// Indexes introduced exactly at `version`.
    pub fn indexes_added_in(&self, version: u32) -> impl Iterator<Item = &IndexDef> {
        self.indexes
            .iter()
            .filter(move |i| i.since == version)
            .map(|i| &i.def)
    }
}

fn v(since: u32, def: IndexDef) -> VersionedIndex {
    VersionedIndex { since, def }
}

/// The full schema at the current version.
#[must_use]
pub fn collection_defs() -> Vec<CollectionDef> {
    vec![
        CollectionDef {
            collection: Collection::Exercises,
            since: 1,
            indexes: vec![
                v(1, IndexDef::field("name")),
                v(1, IndexDef::field("category")),
                v(1, IndexDef::multi("equipment")),
            ],
        },
        CollectionDef {
            collection: Collection::Plans,
            since: 1,
            indexes: vec![v(1, IndexDef::field("name")), v(5, IndexDef::multi("exerciseIds"))],
        },
        CollectionDef {
            collection: Collection::Sessions,
            since: 1,
            indexes: vec![
                v(1, IndexDef::field("date")),
                v(1, IndexDef::field("status")),
                v(1, IndexDef::field("sourcePlanId")),
                v(1, IndexDef::compound(&["status", "date"])),
            ],
        },
        CollectionDef {
            collection: Collection::LoggedSets,
            since: 1,
            indexes: vec![
                v(1, IndexDef::field("sessionId")),
                v(1, IndexDef::field("exerciseId")),
                v(5, IndexDef::multi("exerciseIds")),
                v(1, IndexDef::field("timestamp")),
                v(1, IndexDef::compound(&["exerciseId", "timestamp"])),
                v(1, IndexDef::compound(&["exerciseId", "weight"])),
            ],
        },
        CollectionDef {
            collection: Collection::Settings,
            since: 1,
            indexes: Vec::new(),
        },
    ]
}
