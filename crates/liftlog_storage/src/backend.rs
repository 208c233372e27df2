//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte store holding the commit log.
///
/// # Invariants
///
/// - `append` returns the offset the bytes were written at
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - after `flush` returns, appended bytes survive the process
/// - once a backend reports [`crate::StorageError::Closed`] every later call
///   reports it too
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Fails with `ReadPastEnd` if the range is not fully written, or with
    /// `Closed` once the backend has been terminated.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends bytes and returns the offset they start at.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or the backend is closed.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes appended bytes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails or the backend is closed.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the number of bytes written so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is unavailable or the backend is closed.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails or the backend is closed.
    fn sync(&mut self) -> StorageResult<()>;

    /// Discards every byte at or after `new_size`.
    ///
    /// Used to cut a torn frame off the end of the log during recovery.
    ///
    /// # Errors
    ///
    /// Fails if `new_size` is larger than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
