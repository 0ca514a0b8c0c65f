//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{Operation, WalEntry, WalRecovery};
use crate::config::WalSyncStrategy;
use crate::error::Result;

/// Writes entries to the WAL file
pub struct WalWriter {
    file: File,
    path: PathBuf,
    /// LSN the next appended entry receives
    current_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries written since the last fsync
    uncommitted: usize,
    /// Entries in the log since it was last truncated
    entry_count: usize,
    /// File length after the last complete entry
    len: u64,
    #[cfg(test)]
    fail_next_sync: bool,
}

impl WalWriter {
    /// Open or create a WAL file.
    ///
    /// An existing log is scanned so LSNs continue after its last valid entry.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let (current_lsn, entry_count) = if path.exists() {
            let result = WalRecovery::verify(path)?;
            (result.last_lsn + 1, result.entries_recovered as usize)
        } else {
            (1, 0)
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            file,
            path: path.to_path_buf(),
            current_lsn,
            sync_strategy,
            uncommitted: 0,
            entry_count,
            len,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    /// Append one transaction to the WAL, returning its LSN.
    ///
    /// If the write or its fsync fails the file is cut back to the previous
    /// entry boundary and the LSN is not consumed, so an error always means
    /// the entry is not in the log.
    pub fn append(&mut self, operations: Vec<Operation>) -> Result<u64> {
        let lsn = self.current_lsn;
        let bytes = WalEntry::new(lsn, operations).serialize()?;

        if let Err(e) = self.file.write_all(&bytes) {
            self.cut_back(self.len);
            return Err(e.into());
        }

        let prev_len = self.len;
        let prev_uncommitted = self.uncommitted;
        self.len += bytes.len() as u64;
        self.current_lsn += 1;
        self.uncommitted += 1;
        self.entry_count += 1;

        let sync_now = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.uncommitted >= count,
        };
        if sync_now {
            if let Err(e) = self.sync() {
                self.cut_back(prev_len);
                self.len = prev_len;
                self.current_lsn = lsn;
                self.uncommitted = prev_uncommitted;
                self.entry_count -= 1;
                return Err(e);
            }
        }

        Ok(lsn)
    }

    fn cut_back(&mut self, len: u64) {
        if let Err(e) = self.file.set_len(len) {
            tracing::error!(
                "Could not roll back WAL entry in {}: {}",
                self.path.display(),
                e
            );
        }
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        #[cfg(test)]
        self.injected_sync_failure()?;
        self.file.sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    #[cfg(test)]
    fn injected_sync_failure(&mut self) -> Result<()> {
        if std::mem::take(&mut self.fail_next_sync) {
            return Err(std::io::Error::other("injected fsync failure").into());
        }
        Ok(())
    }

    /// Discard all entries (after a checkpoint made them redundant)
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.current_lsn = 1;
        self.uncommitted = 0;
        self.entry_count = 0;
        self.len = 0;
        Ok(())
    }

    /// Get the LSN the next entry will receive
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    /// Entries written but not yet fsynced
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    /// Entries in the log since the last truncate
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
