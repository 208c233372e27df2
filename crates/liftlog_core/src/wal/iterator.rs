//! Streaming commit log iterator.

use crate::error::{CoreError, CoreResult};
use crate::wal::record::{compute_crc32, CommitRecord, LOG_MAGIC, LOG_VERSION};
use crate::wal::{CRC_SIZE, HEADER_SIZE};
use liftlog_storage::StorageBackend;

/// Reads commit records one frame at a time.
///
/// Yields `(offset, record)` pairs. A torn tail ends iteration cleanly and
/// leaves [`LogIterator::valid_end`] pointing at the first byte of the torn
/// frame; damage yields one error and ends iteration.
pub struct LogIterator<'a> {
    backend: &'a dyn StorageBackend,
    total_size: u64,
    offset: u64,
    finished: bool,
}

impl<'a> LogIterator<'a> {
    /// Creates an iterator over the whole log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log size cannot be read.
    pub fn new(backend: &'a dyn StorageBackend) -> CoreResult<Self> {
        let total_size = backend.size()?;
        Ok(Self {
            backend,
            total_size,
            offset: 0,
            finished: false,
        })
    }

    /// Offset just past the last complete frame read so far.
    #[must_use]
    pub fn valid_end(&self) -> u64 {
        self.offset
    }

    /// Whether bytes past [`valid_end`](Self::valid_end) belong to a torn
    /// frame.
    #[must_use]
    pub fn has_torn_tail(&self) -> bool {
        self.finished && self.offset < self.total_size
    }

    fn read_next(&mut self) -> CoreResult<Option<(u64, CommitRecord)>> {
        let start = self.offset;
        let remaining = self.total_size - start;
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            return Ok(None);
        }

        let header = self.backend.read_at(start, HEADER_SIZE)?;
        if header[0..4] != LOG_MAGIC {
            return Err(CoreError::corruption(format!("invalid magic at offset {start}")));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > LOG_VERSION {
            return Err(CoreError::corruption(format!(
                "unsupported frame version {version} at offset {start}"
            )));
        }
        let payload_len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;

        let frame_len = (HEADER_SIZE + payload_len + CRC_SIZE) as u64;
        if remaining < frame_len {
            return Ok(None);
        }

        let body = self
            .backend
            .read_at(start + HEADER_SIZE as u64, payload_len + CRC_SIZE)?;
        let (payload, crc_bytes) = body.split_at(payload_len);
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

        let mut covered = header;
        covered.extend_from_slice(payload);
        let computed = compute_crc32(&covered);
        if stored != computed {
            return Err(CoreError::corruption(format!(
                "checksum mismatch at offset {start}: stored {stored:#010x}, computed {computed:#010x}"
            )));
        }

        let record = CommitRecord::decode_payload(payload)?;
        self.offset = start + frame_len;
        Ok(Some((start, record)))
    }
}

impl Iterator for LogIterator<'_> {
    type Item = CoreResult<(u64, CommitRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::LogOp;
    use liftlog_storage::InMemoryBackend;

    fn record(txid: u64) -> CommitRecord {
        CommitRecord {
            txid,
            ops: vec![LogOp::SetVersion { version: txid as u32 }],
        }
    }

    fn log_of(records: &[CommitRecord]) -> Vec<u8> {
        records
            .iter()
            .flat_map(|r| r.encode_frame().unwrap())
            .collect()
    }

    #[test]
    fn reads_frames_in_order() {
        let backend = InMemoryBackend::with_data(log_of(&[record(1), record(2)]));
        let records: Vec<_> = LogIterator::new(&backend)
            .unwrap()
            .map(|r| r.unwrap().1.txid)
            .collect();
        assert_eq!(records, vec![1, 2]);
    }

    #[test]
    fn torn_tail_ends_cleanly() {
        let mut bytes = log_of(&[record(1), record(2)]);
        let whole = bytes.len();
        bytes.truncate(whole - 3);

        let backend = InMemoryBackend::with_data(bytes);
        let mut iter = LogIterator::new(&backend).unwrap();
        assert_eq!(iter.next().unwrap().unwrap().1.txid, 1);
        assert!(iter.next().is_none());
        assert!(iter.has_torn_tail());
        assert_eq!(iter.valid_end() as usize, record(1).encode_frame().unwrap().len());
    }

    #[test]
    fn flipped_bit_is_fatal() {
        let mut bytes = log_of(&[record(1)]);
        bytes[HEADER_SIZE] ^= 0x01;

        let backend = InMemoryBackend::with_data(bytes);
        let mut iter = LogIterator::new(&backend).unwrap();
        let err = iter.next().unwrap().unwrap_err();
        assert!(matches!(err, CoreError::Corruption { .. }));
        assert!(iter.next().is_none());
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut bytes = log_of(&[record(1)]);
        bytes[0] = b'X';
        let backend = InMemoryBackend::with_data(bytes);
        let err = LogIterator::new(&backend).unwrap().next().unwrap().unwrap_err();
        assert!(err.to_string().contains("invalid magic"));
    }
}
