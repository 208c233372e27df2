//! # LiftLog Core
//!
//! Local persistence for the LiftLog workout tracker.
//!
//! This crate provides:
//! - A versioned key-value store with collections and secondary indexes,
//!   made durable by an append-only commit log
//! - Built-in schema migrations, each run exactly once per version step
//! - Typed record access that keeps derived fields in sync
//! - A streaming CSV codec and the 27-column export format
//! - Row import with duplicate detection, chunked writes and undo
//! - Whole-store JSON backups
//! - The exercise reference check run before destructive deletes
//!
//! ## Example
//!
//! ```rust
//! use liftlog_core::access::Repository;
//! use liftlog_core::model::{LoggedSet, Session};
//! use liftlog_core::{Store, StoreConfig};
//! use liftlog_storage::InMemoryBackend;
//!
//! let store = Store::open_in_memory(InMemoryBackend::new(), StoreConfig::default()).unwrap();
//! Repository::<Session>::new(&store).create(Session::new("S1", 1_704_067_200_000)).unwrap();
//! Repository::<LoggedSet>::new(&store)
//!     .create(LoggedSet::new("L1", "S1", "squat", 100.0, 5.0, 1_704_067_260_000))
//!     .unwrap();
//!
//! // Deleting the session takes its sets with it.
//! assert_eq!(Repository::<Session>::new(&store).delete("S1").unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod access;
pub mod backup;
pub mod clock;
mod config;
pub mod csv;
mod error;
pub mod index;
pub mod migration;
pub mod model;
pub mod reference;
pub mod schema;
pub mod store;
pub mod transfer;
pub mod wal;

pub use config::StoreConfig;
pub use error::{CoreError, CoreResult};
pub use schema::{Collection, CURRENT_SCHEMA_VERSION};
pub use store::{Store, StoreLocation, StoreManager, StoreStats, StoreStatus, Transaction};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
