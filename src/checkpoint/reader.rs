//! Checkpoint Reader
//!
//! Loads and validates a checkpoint file.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Result, SdError};
use crate::partition::Partitions;

use super::{FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Reader for checkpoint files
pub struct CheckpointReader;

impl CheckpointReader {
    /// Load a checkpoint, or `None` if no checkpoint has been written yet.
    ///
    /// A checkpoint that exists but fails validation is an error: silently
    /// starting empty would drop every group it holds.
    pub fn load(path: &Path) -> Result<Option<Partitions>> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        if (data.len() as u64) < HEADER_SIZE + FOOTER_SIZE {
            return Err(SdError::Checkpoint(format!(
                "{} is too small: {} bytes",
                path.display(),
                data.len()
            )));
        }

        // Header
        if &data[0..4] != MAGIC {
            return Err(SdError::Checkpoint(format!(
                "Invalid checkpoint magic: expected PSDC, got {:?}",
                &data[0..4]
            )));
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != VERSION {
            return Err(SdError::Checkpoint(format!(
                "Unsupported checkpoint version: {}",
                version
            )));
        }
        let bucket_count = read_u64(&data[6..14]);

        // Footer
        let footer_start = data.len() - FOOTER_SIZE as usize;
        let body_len = read_u64(&data[footer_start..footer_start + 8]);
        let body_crc = u32::from_le_bytes([
            data[footer_start + 8],
            data[footer_start + 9],
            data[footer_start + 10],
            data[footer_start + 11],
        ]);

        let body = &data[HEADER_SIZE as usize..footer_start];
        if body.len() as u64 != body_len {
            return Err(SdError::Checkpoint(format!(
                "Body length mismatch: footer says {}, file holds {}",
                body_len,
                body.len()
            )));
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(body);
        if hasher.finalize() != body_crc {
            return Err(SdError::Checkpoint("Body CRC mismatch".into()));
        }

        let partitions: Partitions = bincode::deserialize(body)
            .map_err(|e| SdError::Checkpoint(format!("Undecodable body: {}", e)))?;
        if partitions.bucket_count() as u64 != bucket_count {
            return Err(SdError::Checkpoint(format!(
                "Bucket count mismatch: header says {}, body holds {}",
                bucket_count,
                partitions.bucket_count()
            )));
        }

        Ok(Some(partitions))
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
