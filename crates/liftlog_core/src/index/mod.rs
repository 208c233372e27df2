//! Secondary indexes.
//!
//! Every index is an ordered map from [`IndexValue`] to primary keys, kept
//! in step with its collection on every put and delete. Indexes support
//! single fields, compound keys and multi-valued array fields.

mod key;
mod secondary;

pub use key::{extract_keys, IndexValue};
pub(crate) use secondary::{bounds_are_valid, within};
pub use secondary::SecondaryIndex;
