//! CLI command implementations.

pub mod backup;
pub mod csv;
pub mod exercise;
pub mod inspect;

use liftlog_core::{Store, StoreConfig};
use std::path::Path;

/// Opens the store at `path`, creating it only when `create` is set.
pub fn open_store(path: &Path, create: bool) -> Result<Store, Box<dyn std::error::Error>> {
    let config = StoreConfig::default().create_if_missing(create);
    match Store::open(path, config) {
        Ok(store) => Ok(store),
        Err(e) if !create && !path.exists() => Err(format!("No store found at {path:?}: {e}").into()),
        Err(e) => Err(e.into()),
    }
}
