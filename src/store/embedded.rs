//! Embedded engine
//!
//! Single-process, file-backed store.
//!
//! ## Responsibilities
//! - Keep both partitions in memory as one published snapshot
//! - Log every write transaction to the WAL before publishing it
//! - Checkpoint the partitions and truncate the WAL periodically
//! - Recover checkpoint + WAL on open

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::gate::DrainGate;
use super::{check_labels, check_target, Store};
use crate::checkpoint::{CheckpointReader, CheckpointWriter};
use crate::config::LocalConfig;
use crate::error::{Result, SdError};
use crate::group::{validate_group, Labels, NamedGroup};
use crate::partition::{Partition, Partitions, WriteTxn};
use crate::wal::{WalRecovery, WalWriter};

/// The embedded storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes**: serialized by the `wal` mutex. A writer stages operations
///   against the current snapshot, appends them to the WAL as one entry,
///   then swaps in the next snapshot under a short `state` write lock.
///
/// - **Reads**: clone the current `Arc<Partitions>` and release the lock at
///   once. A reader sees either all of a transaction or none of it.
pub struct EmbeddedStore {
    /// Data directory
    dir: PathBuf,

    /// Write-ahead log; holding this lock is holding the single writer slot
    wal: Mutex<WalWriter>,

    /// Last committed snapshot
    state: RwLock<Arc<Partitions>>,

    checkpoint: CheckpointWriter,

    /// Logged transactions between checkpoints
    checkpoint_entries: usize,

    gate: DrainGate,
}

impl EmbeddedStore {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const CHECKPOINT_FILENAME: &'static str = "checkpoint.db";

    /// Open or create an embedded store
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Load the last checkpoint, if any
    /// 3. Replay the WAL on top of it, dropping a torn tail
    /// 4. Checkpoint the recovered state and truncate the WAL
    pub fn open(config: &LocalConfig) -> Result<Self> {
        config.validate()?;
        let dir = config.store_path.clone();
        fs::create_dir_all(&dir)?;

        let wal_path = dir.join(Self::WAL_FILENAME);
        let checkpoint = CheckpointWriter::new(&dir.join(Self::CHECKPOINT_FILENAME));

        let mut partitions = CheckpointReader::load(checkpoint.path())?.unwrap_or_default();

        let replayed = if wal_path.exists() {
            let (entries, result) = WalRecovery::recover(&wal_path)?;
            if result.entries_recovered > 0 || result.entries_corrupted > 0 || result.was_truncated
            {
                info!(
                    recovered = result.entries_recovered,
                    corrupted = result.entries_corrupted,
                    last_lsn = result.last_lsn,
                    truncated = result.was_truncated,
                    "WAL recovery"
                );
            }
            for entry in &entries {
                for op in &entry.operations {
                    partitions.apply(op);
                }
            }
            entries.len()
        } else {
            0
        };

        let mut wal = WalWriter::open(&wal_path, config.wal_sync)?;

        // Fold replayed transactions into a checkpoint before accepting writes.
        if replayed > 0 {
            checkpoint.write(&partitions)?;
            wal.truncate()?;
        }

        info!(
            path = %dir.display(),
            buckets = partitions.bucket_count(),
            "Embedded store opened"
        );

        Ok(Self {
            dir,
            wal: Mutex::new(wal),
            state: RwLock::new(Arc::new(partitions)),
            checkpoint,
            checkpoint_entries: config.checkpoint_entries,
            gate: DrainGate::new(),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default settings with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = LocalConfig {
            store_path: path.to_path_buf(),
            ..LocalConfig::default()
        };
        Self::open(&config)
    }

    /// Run `f` as one exclusive read-write transaction.
    ///
    /// If `f` returns an error nothing is logged or published.
    pub fn update<T>(&self, f: impl FnOnce(&mut WriteTxn<'_>) -> Result<T>) -> Result<T> {
        let _op = self.gate.enter()?;
        let mut wal = self
            .wal
            .lock()
            .map_err(|e| SdError::LockPoisoned(format!("WAL lock poisoned: {}", e)))?;

        let base = Arc::clone(&*self.state.read());
        let (out, ops) = {
            let mut txn = WriteTxn::new(&base);
            let out = f(&mut txn)?;
            (out, txn.into_operations())
        };
        drop(base);

        if ops.is_empty() {
            return Ok(out);
        }

        let lsn = wal.append(ops.clone())?;
        {
            let mut state = self.state.write();
            let next = Arc::make_mut(&mut *state);
            for op in &ops {
                next.apply(op);
            }
        }
        debug!(lsn, ops = ops.len(), "Committed transaction");

        if wal.entry_count() >= self.checkpoint_entries {
            // The transaction is already durable in the WAL; a failed
            // checkpoint is retried on the next commit.
            if let Err(e) = self.checkpoint_locked(&mut wal) {
                warn!(error = %e, "Checkpoint failed");
            }
        }

        Ok(out)
    }

    /// Snapshot of the last committed state
    pub fn view(&self) -> Result<Arc<Partitions>> {
        let _op = self.gate.enter()?;
        Ok(Arc::clone(&*self.state.read()))
    }

    /// Force a checkpoint and WAL truncation
    pub fn checkpoint(&self) -> Result<()> {
        let _op = self.gate.enter()?;
        let mut wal = self
            .wal
            .lock()
            .map_err(|e| SdError::LockPoisoned(format!("WAL lock poisoned: {}", e)))?;
        self.checkpoint_locked(&mut wal)
    }

    /// Called with the WAL lock held, so no commit races the snapshot taken
    fn checkpoint_locked(&self, wal: &mut WalWriter) -> Result<()> {
        let snapshot = Arc::clone(&*self.state.read());
        let bytes = self.checkpoint.write(&snapshot)?;
        wal.truncate()?;
        debug!(bytes, buckets = snapshot.bucket_count(), "Checkpoint written");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.dir
    }

    /// Transactions logged since the last checkpoint
    pub fn wal_entry_count(&self) -> Result<usize> {
        let wal = self
            .wal
            .lock()
            .map_err(|e| SdError::LockPoisoned(format!("WAL lock poisoned: {}", e)))?;
        Ok(wal.entry_count())
    }
}

impl Store for EmbeddedStore {
    fn add_target(&self, group: &str, target: &str) -> Result<()> {
        check_target(group, target)?;
        self.update(|txn| {
            txn.put(Partition::Targets, group, target, "");
            Ok(())
        })?;
        debug!(group, target, "Added target");
        Ok(())
    }

    fn remove_target(&self, group: &str, target: &str) -> Result<()> {
        validate_group(group)?;
        self.update(|txn| {
            txn.delete(Partition::Targets, group, target);
            Ok(())
        })?;
        debug!(group, target, "Removed target");
        Ok(())
    }

    fn remove_group(&self, group: &str) -> Result<()> {
        validate_group(group)?;
        self.update(|txn| {
            txn.drop_bucket(Partition::Targets, group);
            txn.drop_bucket(Partition::Labels, group);
            Ok(())
        })?;
        debug!(group, "Removed target group");
        Ok(())
    }

    fn add_labels(&self, group: &str, labels: &Labels) -> Result<()> {
        check_labels(group, labels)?;
        self.update(|txn| {
            txn.create_bucket(Partition::Labels, group);
            for (k, v) in labels {
                txn.put(Partition::Labels, group, k, v);
            }
            Ok(())
        })?;
        debug!(group, count = labels.len(), "Added labels");
        Ok(())
    }

    fn remove_label(&self, group: &str, label: &str) -> Result<()> {
        validate_group(group)?;
        self.update(|txn| {
            txn.delete(Partition::Labels, group, label);
            Ok(())
        })?;
        debug!(group, label, "Removed label");
        Ok(())
    }

    fn get_labels(&self, group: &str) -> Result<Labels> {
        validate_group(group)?;
        let view = self.view()?;
        Ok(view
            .bucket(Partition::Labels, group)
            .cloned()
            .unwrap_or_default())
    }

    fn list_groups(&self) -> Result<Vec<NamedGroup>> {
        Ok(self.view()?.groups())
    }

    fn shutdown(&self) -> Result<()> {
        self.gate.close_and_drain()?;
        let mut wal = self
            .wal
            .lock()
            .map_err(|e| SdError::LockPoisoned(format!("WAL lock poisoned: {}", e)))?;
        self.checkpoint_locked(&mut wal)?;
        wal.sync()?;
        info!(path = %self.dir.display(), "Embedded store closed");
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}
