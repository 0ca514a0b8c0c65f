//! Checkpoint Writer
//!
//! Serializes the partition table to a new checkpoint file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, SdError};
use crate::partition::Partitions;

use super::{MAGIC, VERSION};

/// Writes checkpoints via temp file + rename
pub struct CheckpointWriter {
    path: PathBuf,
}

impl CheckpointWriter {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Write `partitions` and atomically replace the current checkpoint.
    ///
    /// Returns the size of the new file in bytes.
    pub fn write(&self, partitions: &Partitions) -> Result<u64> {
        let tmp_path = self.path.with_extension("tmp");
        let body = bincode::serialize(partitions)?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&body);
        let body_crc = hasher.finalize();

        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            let mut writer = BufWriter::new(file);

            // Header
            writer.write_all(MAGIC)?;
            writer.write_all(&VERSION.to_le_bytes())?;
            writer.write_all(&(partitions.bucket_count() as u64).to_le_bytes())?;

            // Body
            writer.write_all(&body)?;

            // Footer: body_len (8) + body_crc (4) + padding (4)
            writer.write_all(&(body.len() as u64).to_le_bytes())?;
            writer.write_all(&body_crc.to_le_bytes())?;
            writer.write_all(&[0u8; 4])?;

            let file = writer.into_inner().map_err(|e| {
                SdError::Checkpoint(format!("Failed to flush checkpoint: {}", e))
            })?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        Self::sync_parent(&self.path)?;

        Ok(fs::metadata(&self.path)?.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn sync_parent(path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            File::open(dir)?.sync_all()?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_parent(_path: &Path) -> Result<()> {
        Ok(())
    }
}
