//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::OpenOptions;
use std::path::Path;

use super::reader::ReadOutcome;
use super::{WalEntry, WalReader};
use crate::error::{Result, SdError};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries dropped
    pub entries_corrupted: u64,

    /// Last valid LSN (0 when the log is empty)
    pub last_lsn: u64,

    /// Whether the WAL was truncated (partial or corrupt tail removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Stop at the first partial or corrupted entry
    /// 3. Truncate the file at the end of the last valid entry
    /// 4. Return all valid entries in order
    ///
    /// Nothing after a bad entry is trusted: entries are transactions, and
    /// replaying a later one without an earlier one would not be a prefix of
    /// the committed history.
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, mut result, valid_len) = Self::scan(path)?;

        let file = OpenOptions::new().write(true).open(path)?;
        if file.metadata()?.len() > valid_len {
            file.set_len(valid_len)?;
            file.sync_all()?;
            result.was_truncated = true;
        }

        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let (_, mut result, valid_len) = Self::scan(path)?;
        result.was_truncated = std::fs::metadata(path)?.len() > valid_len;
        Ok(result)
    }

    fn scan(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult, u64)> {
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();

        loop {
            match reader.read_next() {
                Ok(ReadOutcome::Entry(entry)) => {
                    result.entries_recovered += 1;
                    result.last_lsn = entry.lsn;
                    entries.push(entry);
                }
                Ok(ReadOutcome::Eof) => break,
                Ok(ReadOutcome::Partial(reason)) => {
                    tracing::warn!(
                        "WAL {} has a torn tail after lsn {}: {}",
                        path.display(),
                        result.last_lsn,
                        reason
                    );
                    break;
                }
                Err(SdError::WalCorruption(reason)) => {
                    result.entries_corrupted += 1;
                    tracing::warn!(
                        "WAL {} has a corrupt entry after lsn {}: {}",
                        path.display(),
                        result.last_lsn,
                        reason
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok((entries, result, reader.position()))
    }
}
