//! Commit records and frame encoding.

use crate::error::{CoreError, CoreResult};
use crate::schema::IndexDef;
use crate::wal::{CRC_SIZE, HEADER_SIZE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Magic bytes opening every frame.
pub const LOG_MAGIC: [u8; 4] = *b"LLOG";

/// Current frame format version.
pub const LOG_VERSION: u16 = 1;

/// One operation of a committed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogOp {
    /// Create a collection keyed by `key_field`.
    CreateCollection {
        /// Collection name.
        collection: String,
        /// Field holding the primary key.
        key_field: String,
    },
    /// Create a secondary index and build it from existing records.
    CreateIndex {
        /// Collection name.
        collection: String,
        /// Index definition.
        index: IndexDef,
    },
    /// Insert or replace a record.
    Put {
        /// Collection name.
        collection: String,
        /// Primary key.
        key: String,
        /// The whole record.
        value: Value,
    },
    /// Remove a record.
    Delete {
        /// Collection name.
        collection: String,
        /// Primary key.
        key: String,
    },
    /// Record the schema version.
    SetVersion {
        /// New schema version.
        version: u32,
    },
}

/// Everything one transaction wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Transaction id, increasing per store.
    pub txid: u64,
    /// Operations in the order they were issued.
    pub ops: Vec<LogOp>,
}

impl CommitRecord {
    /// Encodes the record as a complete frame.
    ///
    /// # Errors
    ///
    /// Fails if the payload cannot be encoded or exceeds the 4-byte length
    /// field.
    pub fn encode_frame(&self) -> CoreResult<Vec<u8>> {
        let mut payload = Vec::new();
        ciborium::into_writer(self, &mut payload)
            .map_err(|e| CoreError::transaction_failure(format!("encode commit: {e}")))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::transaction_failure("commit payload too large"))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&LOG_MAGIC);
        frame.extend_from_slice(&LOG_VERSION.to_le_bytes());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);
        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }

    /// Decodes a record from a frame payload.
    pub fn decode_payload(payload: &[u8]) -> CoreResult<Self> {
        ciborium::from_reader(payload)
            .map_err(|e| CoreError::corruption(format!("undecodable commit payload: {e}")))
    }
}

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
