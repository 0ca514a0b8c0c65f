//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::clock::unix_millis;
use crate::error::{Result, SdError};
use crate::partition::Partition;

/// Header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound on a single entry's payload; larger lengths mean a bad header
pub const MAX_ENTRY_SIZE: usize = 64 * 1024 * 1024;

/// A single entry in the WAL: one committed write transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// Operations of the transaction, applied in order
    pub operations: Vec<Operation>,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Partition operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Create an empty bucket if it does not exist
    CreateBucket { partition: Partition, group: String },

    /// Put a key-value pair into a bucket (creating the bucket)
    Put {
        partition: Partition,
        group: String,
        key: String,
        value: String,
    },

    /// Delete a key from a bucket
    Delete {
        partition: Partition,
        group: String,
        key: String,
    },

    /// Drop a whole bucket
    DropBucket { partition: Partition, group: String },
}

impl WalEntry {
    pub fn new(lsn: u64, operations: Vec<Operation>) -> Self {
        Self {
            lsn,
            operations,
            timestamp: unix_millis(),
        }
    }

    /// Frame the entry: header followed by the bincode payload
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = bincode::serialize(self)?;
        let len = u32::try_from(data.len())
            .map_err(|_| SdError::Serialization("WAL entry exceeds 4 GiB".into()))?;
        let crc = Self::checksum(self.lsn, len, &data);

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + data.len());
        buf.put_u64_le(self.lsn);
        buf.put_u32_le(crc);
        buf.put_u32_le(len);
        buf.put_slice(&data);
        Ok(buf.to_vec())
    }

    /// Parse a framed entry, validating length and checksum
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let (lsn, crc, len) = Self::parse_header(bytes)?;
        let end = HEADER_SIZE + len as usize;
        if bytes.len() < end {
            return Err(SdError::WalCorruption(format!(
                "truncated entry: expected {} bytes, got {}",
                end,
                bytes.len()
            )));
        }
        Self::decode_payload(lsn, crc, len, &bytes[HEADER_SIZE..end])
    }

    /// Total framed size in bytes
    pub fn serialized_size(&self) -> Result<usize> {
        Ok(HEADER_SIZE + bincode::serialized_size(self)? as usize)
    }

    /// CRC over LSN, length and payload
    pub fn compute_crc(&self) -> Result<u32> {
        let data = bincode::serialize(self)?;
        Ok(Self::checksum(self.lsn, data.len() as u32, &data))
    }

    pub(crate) fn parse_header(bytes: &[u8]) -> Result<(u64, u32, u32)> {
        if bytes.len() < HEADER_SIZE {
            return Err(SdError::WalCorruption(format!(
                "header too small: {} bytes",
                bytes.len()
            )));
        }
        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&bytes[0..8]);
        crc.copy_from_slice(&bytes[8..12]);
        len.copy_from_slice(&bytes[12..16]);
        Ok((
            u64::from_le_bytes(lsn),
            u32::from_le_bytes(crc),
            u32::from_le_bytes(len),
        ))
    }

    pub(crate) fn decode_payload(lsn: u64, crc: u32, len: u32, data: &[u8]) -> Result<Self> {
        let actual = Self::checksum(lsn, len, data);
        if actual != crc {
            return Err(SdError::WalCorruption(format!(
                "CRC mismatch at lsn {lsn}: stored {crc:#010x}, computed {actual:#010x}"
            )));
        }
        let entry: WalEntry = bincode::deserialize(data)
            .map_err(|e| SdError::WalCorruption(format!("undecodable entry at lsn {lsn}: {e}")))?;
        if entry.lsn != lsn {
            return Err(SdError::WalCorruption(format!(
                "LSN mismatch: header {lsn}, payload {}",
                entry.lsn
            )));
        }
        Ok(entry)
    }

    fn checksum(lsn: u64, len: u32, data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&lsn.to_le_bytes());
        hasher.update(&len.to_le_bytes());
        hasher.update(data);
        hasher.finalize()
    }
}
