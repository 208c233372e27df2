//! # LiftLog Testkit
//!
//! Test utilities for LiftLog.
//!
//! This crate provides:
//! - Store fixtures (in-memory and temporary directories) and sample data
//! - Property-based generators for records and CSV cells
//! - Import/export helpers and the end-to-end scenario tests
//!
//! ## Usage
//!
//! ```rust
//! use liftlog_testkit::prelude::*;
//!
//! with_temp_store(|store| {
//!     seed_catalog(store);
//!     assert_eq!(store.stats().unwrap().version, liftlog_core::CURRENT_SCHEMA_VERSION);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
