//! Commit log for durability and recovery.
//!
//! Collections live in memory; every committed transaction is appended to
//! the log as one frame and replayed on open.
//!
//! ## Frame Format
//!
//! ```text
//! | magic "LLOG" (4) | version (2) | length (4) | CBOR payload (N) | crc32 (4) |
//! ```
//!
//! The CRC covers the header and the payload. A frame holds every operation
//! of one transaction, so a transaction is either wholly in the log or
//! absent from it.
//!
//! ## Recovery Policy
//!
//! - **Torn tail**: a header or payload running past the end of the log is a
//!   write interrupted before it was flushed. Replay stops there and the tail
//!   is cut off.
//! - **CRC mismatch, bad magic, unsupported version**: the log is damaged and
//!   the store MUST NOT open.

mod iterator;
mod record;
mod writer;

pub use iterator::LogIterator;
pub use record::{compute_crc32, CommitRecord, LogOp, LOG_MAGIC, LOG_VERSION};
pub use writer::CommitLog;

/// magic (4) + version (2) + length (4)
pub(crate) const HEADER_SIZE: usize = 10;

pub(crate) const CRC_SIZE: usize = 4;
