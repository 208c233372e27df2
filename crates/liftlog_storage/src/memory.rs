//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An in-memory storage backend.
///
/// Cloning an `InMemoryBackend` yields another handle onto the **same
/// connection**: both see the same bytes and both observe [`terminate`].
/// [`reconnect`] yields a handle onto the same bytes through a fresh
/// connection, which is how a store re-opens after its connection was lost.
///
/// [`terminate`]: InMemoryBackend::terminate
/// [`reconnect`]: InMemoryBackend::reconnect
///
/// # Example
///
/// ```rust
/// use liftlog_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let observer = backend.clone();
/// backend.append(b"abc").unwrap();
/// assert_eq!(observer.size().unwrap(), 3);
///
/// observer.terminate();
/// assert!(backend.append(b"d").is_err());
/// assert_eq!(backend.reconnect().size().unwrap(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding pre-existing bytes.
    ///
    /// Useful for recovery tests that hand-craft a damaged log.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a copy of every byte written so far.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Terminates this connection. The bytes are kept.
    pub fn terminate(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Returns whether this connection was terminated.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Opens a new connection onto the same bytes.
    #[must_use]
    pub fn reconnect(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn ensure_live(&self) -> StorageResult<()> {
        if self.is_terminated() {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.ensure_live()?;
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);

        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        self.ensure_live()?;
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.ensure_live()
    }

    fn size(&self) -> StorageResult<u64> {
        self.ensure_live()?;
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.ensure_live()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.ensure_live()?;
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot truncate log of {size} bytes to {new_size} bytes"),
            )));
        }
        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_appends() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"first").unwrap(), 0);
        assert_eq!(backend.append(b"second").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 11);
        assert_eq!(backend.read_at(5, 6).unwrap(), b"second");
    }

    #[test]
    fn reading_past_the_end_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"abc").unwrap();
        assert!(matches!(
            backend.read_at(2, 4),
            Err(StorageError::ReadPastEnd { size: 3, .. })
        ));
        assert!(backend.read_at(3, 0).unwrap().is_empty());
    }

    #[test]
    fn clones_share_bytes() {
        let mut writer = InMemoryBackend::new();
        let reader = writer.clone();
        writer.append(b"shared").unwrap();
        assert_eq!(reader.data(), b"shared");
    }

    #[test]
    fn terminate_closes_every_handle_of_the_connection() {
        let mut backend = InMemoryBackend::with_data(b"log".to_vec());
        let handle = backend.clone();
        handle.terminate();

        assert!(backend.is_terminated());
        assert!(matches!(backend.append(b"x"), Err(StorageError::Closed)));
        assert!(matches!(backend.size(), Err(StorageError::Closed)));
    }

    #[test]
    fn reconnect_sees_bytes_written_before_termination() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"durable").unwrap();
        backend.terminate();

        let mut fresh = backend.reconnect();
        assert_eq!(fresh.read_at(0, 7).unwrap(), b"durable");
        fresh.append(b"!").unwrap();
        assert_eq!(fresh.size().unwrap(), 8);
        assert!(backend.is_terminated());
    }

    #[test]
    fn truncate_drops_tail() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"keep-torn").unwrap();
        backend.truncate(4).unwrap();
        assert_eq!(backend.data(), b"keep");
        assert!(backend.truncate(10).is_err());
    }
}
