//! # LiftLog Storage
//!
//! Byte-level storage for the LiftLog commit log.
//!
//! The persistence core keeps its collections in memory and makes them
//! durable by appending one framed record per committed transaction to a
//! backend from this crate. Backends are **opaque byte stores**: they never
//! look inside the frames they hold.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - shared in-process buffer, used by tests and by
//!   ephemeral stores; can simulate an external connection termination
//! - [`FileBackend`] - a single OS file
//!
//! ## Example
//!
//! ```rust
//! use liftlog_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"frame").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
