//! Tests for WAL writing and recovery
//!
//! These tests verify:
//! - LSN assignment and sync bookkeeping in the writer
//! - Recovery from a clean WAL (no corruption)
//! - Recovery with partial writes (truncated tail)
//! - Recovery with corrupted entries (CRC mismatch)
//! - Verify mode (stats only, file untouched)

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use promsd::config::WalSyncStrategy;
use promsd::partition::Partition;
use promsd::wal::{Operation, WalEntry, WalReader, WalRecovery, WalWriter};
use promsd::SdError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn put_target(i: usize) -> Operation {
    Operation::Put {
        partition: Partition::Targets,
        group: "web".into(),
        key: format!("10.0.0.{i}:9100"),
        value: String::new(),
    }
}

/// Write entries using WalWriter (produces a well-formed WAL)
fn write_entries_via_writer(path: &PathBuf, count: usize) {
    let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        writer.append(vec![put_target(i)]).unwrap();
    }
}

/// Write raw serialized entries directly to a file (for crafting corruption)
fn write_raw_entries(path: &PathBuf, entries: &[WalEntry]) {
    let mut file = File::create(path).unwrap();
    for entry in entries {
        let bytes = entry.serialize().unwrap();
        file.write_all(&bytes).unwrap();
    }
    file.sync_all().unwrap();
}

// =============================================================================
// Writer Tests
// =============================================================================

#[test]
fn test_writer_assigns_sequential_lsns() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    assert_eq!(writer.current_lsn(), 1);
    assert_eq!(writer.append(vec![put_target(0)]).unwrap(), 1);
    assert_eq!(writer.append(vec![put_target(1), put_target(2)]).unwrap(), 2);
    assert_eq!(writer.current_lsn(), 3);
    assert_eq!(writer.entry_count(), 2);
}

#[test]
fn test_writer_every_n_entries_sync() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer =
        WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 3 }).unwrap();

    writer.append(vec![put_target(0)]).unwrap();
    writer.append(vec![put_target(1)]).unwrap();
    assert_eq!(writer.uncommitted_count(), 2);

    writer.append(vec![put_target(2)]).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);

    writer.append(vec![put_target(3)]).unwrap();
    writer.sync().unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

#[test]
fn test_writer_reopen_continues_lsn() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 4);

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.current_lsn(), 5);
    assert_eq!(writer.entry_count(), 4);
    assert_eq!(writer.append(vec![put_target(9)]).unwrap(), 5);
}

#[test]
fn test_writer_truncate_resets() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..3 {
        writer.append(vec![put_target(i)]).unwrap();
    }

    writer.truncate().unwrap();

    assert_eq!(writer.current_lsn(), 1);
    assert_eq!(writer.entry_count(), 0);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), 0);

    // Appends after a truncate start a fresh log
    writer.append(vec![put_target(7)]).unwrap();
    let (entries, _) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].lsn, 1);
    assert_eq!(entries[0].operations, vec![put_target(7)]);
}

#[test]
fn test_reader_iterates_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 3);

    let reader = WalReader::open(&wal_path).unwrap();
    let lsns: Vec<u64> = reader.entries().map(|e| e.unwrap().lsn).collect();

    assert_eq!(lsns, vec![1, 2, 3]);
}

// =============================================================================
// Recover: Clean WAL Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 0);
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(result.last_lsn, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_clean_wal() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 10);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 10);
    assert_eq!(result.entries_recovered, 10);
    assert_eq!(result.last_lsn, 10);
    assert!(!result.was_truncated);

    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.lsn, (i + 1) as u64);
        assert_eq!(entry.operations, vec![put_target(i)]);
    }
}

#[test]
fn test_recover_missing_file_is_error() {
    let (_temp, wal_path) = setup_temp_wal();
    assert!(matches!(
        WalRecovery::recover(&wal_path),
        Err(SdError::Io(_))
    ));
}

// =============================================================================
// Recover: Partial Write Tests
// =============================================================================

#[test]
fn test_recover_partial_header() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 3);
    let clean_len = fs::metadata(&wal_path).unwrap().len();

    // Crash after writing a few header bytes of the next entry
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[0xAB; 5]).unwrap();
    drop(file);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(result.entries_corrupted, 0);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), clean_len);
}

#[test]
fn test_recover_partial_payload() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);
    let clean_len = fs::metadata(&wal_path).unwrap().len();

    let torn = WalEntry::new(3, vec![put_target(3)]).serialize().unwrap();
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&torn[..torn.len() - 3]).unwrap();
    drop(file);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(result.last_lsn, 2);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), clean_len);
}

#[test]
fn test_recover_then_append_continues() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[1, 2, 3]).unwrap();
    drop(file);

    WalRecovery::recover(&wal_path).unwrap();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(vec![put_target(5)]).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(result.last_lsn, 3);
    assert!(!result.was_truncated);
}

// =============================================================================
// Recover: Corruption Tests
// =============================================================================

#[test]
fn test_recover_corrupted_middle_entry_stops() {
    let (_temp, wal_path) = setup_temp_wal();
    let entries: Vec<WalEntry> = (1..=3)
        .map(|lsn| WalEntry::new(lsn, vec![put_target(lsn as usize)]))
        .collect();
    write_raw_entries(&wal_path, &entries);

    // Flip a payload byte in the second entry
    let first_len = entries[0].serialized_size().unwrap();
    let mut bytes = fs::read(&wal_path).unwrap();
    let target = first_len + entries[1].serialized_size().unwrap() - 1;
    bytes[target] ^= 0xFF;
    fs::write(&wal_path, &bytes).unwrap();

    let (recovered, result) = WalRecovery::recover(&wal_path).unwrap();

    // Later entries are not replayed past a corrupt one
    assert_eq!(recovered.len(), 1);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.last_lsn, 1);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), first_len as u64);
}

#[test]
fn test_recover_garbage_length_is_corruption() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut header = vec![0u8; 16];
    header[0] = 1;
    header[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
    fs::write(&wal_path, &header).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), 0);
}

// =============================================================================
// Verify Tests
// =============================================================================

#[test]
fn test_verify_does_not_modify_file() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 5);
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[0xFF; 7]).unwrap();
    drop(file);
    let len_before = fs::metadata(&wal_path).unwrap().len();

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 5);
    assert_eq!(result.last_lsn, 5);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), len_before);
}
