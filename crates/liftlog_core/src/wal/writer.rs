//! Commit log writer.

use crate::error::CoreResult;
use crate::wal::iterator::LogIterator;
use crate::wal::record::CommitRecord;
use liftlog_storage::StorageBackend;

/// Appends commit frames to a storage backend.
pub struct CommitLog {
    backend: Box<dyn StorageBackend>,
    sync_on_commit: bool,
}

impl CommitLog {
    /// Creates a log over `backend`.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend,
            sync_on_commit,
        }
    }

    /// Appends one commit frame and returns its offset.
    ///
    /// The frame is flushed before returning when `sync_on_commit` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the backend rejects the write.
    pub fn append(&mut self, record: &CommitRecord) -> CoreResult<u64> {
        let frame = record.encode_frame()?;
        let offset = self.backend.append(&frame)?;
        if self.sync_on_commit {
            self.backend.flush()?;
        }
        Ok(offset)
    }

    /// Returns a streaming iterator over committed records.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be accessed.
    pub fn iter(&self) -> CoreResult<LogIterator<'_>> {
        LogIterator::new(self.backend.as_ref())
    }

    /// Current log size in bytes.
    ///
    /// Also serves as a liveness check: a terminated backend reports
    /// `Closed` here.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Cuts the log back to `offset`.
    pub fn truncate(&mut self, offset: u64) -> CoreResult<()> {
        self.backend.truncate(offset)?;
        Ok(())
    }

    /// Flushes pending writes to durable storage.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.backend.sync()?;
        Ok(())
    }
}

impl std::fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLog")
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::LogOp;
    use liftlog_storage::InMemoryBackend;
    use serde_json::json;

    fn put(txid: u64, key: &str) -> CommitRecord {
        CommitRecord {
            txid,
            ops: vec![LogOp::Put {
                collection: "settings".into(),
                key: key.into(),
                value: json!({"key": key, "value": 1}),
            }],
        }
    }

    #[test]
    fn append_and_read_back() {
        let mut log = CommitLog::new(Box::new(InMemoryBackend::new()), true);
        assert_eq!(log.append(&put(1, "a")).unwrap(), 0);
        let second = log.append(&put(2, "b")).unwrap();
        assert!(second > 0);

        let records: Vec<_> = log.iter().unwrap().collect::<CoreResult<_>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], (second, put(2, "b")));
    }

    #[test]
    fn truncate_drops_later_frames() {
        let mut log = CommitLog::new(Box::new(InMemoryBackend::new()), false);
        log.append(&put(1, "a")).unwrap();
        let end = log.size().unwrap();
        log.append(&put(2, "b")).unwrap();

        log.truncate(end).unwrap();
        assert_eq!(log.iter().unwrap().count(), 1);
    }

    #[test]
    fn terminated_backend_fails_append() {
        let backend = InMemoryBackend::new();
        let mut log = CommitLog::new(Box::new(backend.clone()), true);
        backend.terminate();
        let err = log.append(&put(1, "a")).unwrap_err();
        assert!(err.is_connection_lost());
    }
}
