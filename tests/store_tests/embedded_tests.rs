//! Tests for the embedded engine
//!
//! These tests verify:
//! - Store operations and their tolerated-absence semantics
//! - Input validation before any write
//! - Checkpointing and recovery from the WAL
//! - Snapshot reads under concurrent writers
//! - Lifecycle (shutdown, closed store)

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::thread;

use promsd::config::{Config, WalSyncStrategy};
use promsd::partition::Partition;
use promsd::{EmbeddedStore, Labels, SdError, Store};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, EmbeddedStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = open_in(&temp_dir, 1000);
    (temp_dir, store)
}

fn open_in(temp_dir: &TempDir, checkpoint_entries: usize) -> EmbeddedStore {
    let config = Config::builder()
        .store_path(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryWrite) // Sync every write for test reliability
        .checkpoint_entries(checkpoint_entries)
        .build();
    EmbeddedStore::open(&config.local).unwrap()
}

fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn targets_of(store: &impl Store, group: &str) -> Option<Vec<String>> {
    store
        .list_groups()
        .unwrap()
        .into_iter()
        .find(|g| g.name == group)
        .map(|g| g.group.targets.into_iter().collect())
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_open_creates_files() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("sd");

    let store = EmbeddedStore::open_path(&data_dir).unwrap();

    assert!(data_dir.exists());
    assert!(data_dir.join("wal.log").exists());
    assert_eq!(store.data_dir(), data_dir.as_path());
    assert_eq!(store.kind(), "local");
}

#[test]
fn test_add_target_is_idempotent() {
    let (_temp, store) = setup_temp_store();

    store.add_target("web", "10.0.0.1:9100").unwrap();
    store.add_target("web", "10.0.0.1:9100").unwrap();

    assert_eq!(targets_of(&store, "web"), Some(vec!["10.0.0.1:9100".into()]));
    // The second call had nothing to log
    assert_eq!(store.wal_entry_count().unwrap(), 1);
}

#[test]
fn test_remove_target() {
    let (_temp, store) = setup_temp_store();
    store.add_target("web", "a:1").unwrap();
    store.add_target("web", "b:1").unwrap();

    store.remove_target("web", "a:1").unwrap();

    assert_eq!(targets_of(&store, "web"), Some(vec!["b:1".into()]));
}

#[test]
fn test_emptied_group_still_exists() {
    let (_temp, store) = setup_temp_store();
    store.add_target("web", "a:1").unwrap();

    store.remove_target("web", "a:1").unwrap();

    assert_eq!(targets_of(&store, "web"), Some(vec![]));
}

#[test]
fn test_removals_of_missing_things_succeed() {
    let (_temp, store) = setup_temp_store();
    store.add_target("web", "a:1").unwrap();
    let before = store.serialize(true).unwrap();

    store.remove_target("ghost", "a:1").unwrap();
    store.remove_target("web", "z:1").unwrap();
    store.remove_label("web", "env").unwrap();
    store.remove_label("ghost", "env").unwrap();
    store.remove_group("ghost").unwrap();

    assert_eq!(store.serialize(true).unwrap(), before);
    assert_eq!(store.wal_entry_count().unwrap(), 1);
}

#[test]
fn test_labels_merge_and_overwrite() {
    let (_temp, store) = setup_temp_store();

    store.add_labels("web", &labels(&[("a", "1")])).unwrap();
    store.add_labels("web", &labels(&[("b", "2")])).unwrap();
    assert_eq!(
        store.get_labels("web").unwrap(),
        labels(&[("a", "1"), ("b", "2")])
    );

    store.add_labels("web", &labels(&[("a", "3")])).unwrap();
    assert_eq!(
        store.get_labels("web").unwrap(),
        labels(&[("a", "3"), ("b", "2")])
    );
}

#[test]
fn test_add_labels_creates_group_without_targets() {
    let (_temp, store) = setup_temp_store();

    store.add_labels("meta", &labels(&[("env", "prod")])).unwrap();

    assert_eq!(targets_of(&store, "meta"), Some(vec![]));
    // Target and label partitions are independent
    let view = store.view().unwrap();
    assert!(view.bucket(Partition::Targets, "meta").is_none());
    assert!(view.bucket(Partition::Labels, "meta").is_some());
}

#[test]
fn test_add_empty_labels_creates_group() {
    let (_temp, store) = setup_temp_store();

    store.add_labels("web", &Labels::new()).unwrap();

    assert_eq!(targets_of(&store, "web"), Some(vec![]));
    assert!(store.get_labels("web").unwrap().is_empty());
}

#[test]
fn test_get_labels_missing_group_is_empty() {
    let (_temp, store) = setup_temp_store();
    assert!(store.get_labels("ghost").unwrap().is_empty());
}

#[test]
fn test_remove_group_drops_both_partitions() {
    let (_temp, store) = setup_temp_store();
    store.add_target("web", "a:1").unwrap();
    store.add_labels("web", &labels(&[("env", "prod")])).unwrap();
    store.add_target("db", "b:1").unwrap();

    store.remove_group("web").unwrap();

    assert!(store.get_labels("web").unwrap().is_empty());
    assert_eq!(targets_of(&store, "web"), None);
    assert_eq!(targets_of(&store, "db"), Some(vec!["b:1".into()]));
    let view = store.view().unwrap();
    assert!(view.bucket(Partition::Targets, "web").is_none());
    assert!(view.bucket(Partition::Labels, "web").is_none());
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_invalid_input_is_rejected_before_writing() {
    let (_temp, store) = setup_temp_store();

    assert!(matches!(
        store.add_target("a/b", "x:1"),
        Err(SdError::InvalidGroup(_))
    ));
    assert!(matches!(
        store.add_target("", "x:1"),
        Err(SdError::InvalidGroup(_))
    ));
    assert!(matches!(
        store.add_target("web", "not a host"),
        Err(SdError::InvalidTarget(_))
    ));
    assert!(matches!(
        store.add_labels("web", &labels(&[("1bad", "x")])),
        Err(SdError::InvalidLabel(_))
    ));

    assert_eq!(store.wal_entry_count().unwrap(), 0);
    assert!(store.list_groups().unwrap().is_empty());
}

// =============================================================================
// Transaction Tests
// =============================================================================

#[test]
fn test_failed_update_publishes_nothing() {
    let (_temp, store) = setup_temp_store();

    let result: promsd::Result<()> = store.update(|txn| {
        txn.put(Partition::Targets, "web", "a:1", "");
        Err(SdError::Storage("aborted".into()))
    });

    assert!(result.is_err());
    assert!(store.list_groups().unwrap().is_empty());
    assert_eq!(store.wal_entry_count().unwrap(), 0);
}

#[test]
fn test_update_batches_one_wal_entry() {
    let (_temp, store) = setup_temp_store();

    store
        .update(|txn| {
            txn.put(Partition::Targets, "web", "a:1", "");
            txn.put(Partition::Targets, "web", "b:1", "");
            txn.put(Partition::Labels, "web", "env", "prod");
            Ok(())
        })
        .unwrap();

    assert_eq!(store.wal_entry_count().unwrap(), 1);
    assert_eq!(
        targets_of(&store, "web"),
        Some(vec!["a:1".into(), "b:1".into()])
    );
}

// =============================================================================
// Checkpoint & Recovery Tests
// =============================================================================

#[test]
fn test_checkpoint_triggers_after_entry_limit() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_in(&temp_dir, 3);

    store.add_target("web", "a:1").unwrap();
    store.add_target("web", "b:1").unwrap();
    assert_eq!(store.wal_entry_count().unwrap(), 2);

    store.add_target("web", "c:1").unwrap();

    assert_eq!(store.wal_entry_count().unwrap(), 0);
    assert!(temp_dir.path().join("checkpoint.db").exists());
}

#[test]
fn test_reopen_after_shutdown() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = open_in(&temp_dir, 1000);
        store.add_target("web", "a:1").unwrap();
        store.add_labels("web", &labels(&[("env", "prod")])).unwrap();
        store.shutdown().unwrap();
    }

    let store = open_in(&temp_dir, 1000);

    assert_eq!(targets_of(&store, "web"), Some(vec!["a:1".into()]));
    assert_eq!(store.get_labels("web").unwrap(), labels(&[("env", "prod")]));
    assert_eq!(store.wal_entry_count().unwrap(), 0);
}

#[test]
fn test_recovery_without_shutdown() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = open_in(&temp_dir, 1000);
        for i in 0..20 {
            store.add_target("web", &format!("10.0.0.{i}:9100")).unwrap();
        }
        store.remove_target("web", "10.0.0.0:9100").unwrap();
        store.add_target("gone", "x:1").unwrap();
        store.remove_group("gone").unwrap();
        // Simulate crash - no shutdown
    }

    let store = open_in(&temp_dir, 1000);

    let targets = targets_of(&store, "web").unwrap();
    assert_eq!(targets.len(), 19);
    assert!(!targets.contains(&"10.0.0.0:9100".to_string()));
    assert_eq!(targets_of(&store, "gone"), None);
}

#[test]
fn test_recovery_combines_checkpoint_and_wal() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = open_in(&temp_dir, 2);
        store.add_target("web", "a:1").unwrap();
        store.add_target("web", "b:1").unwrap(); // checkpoint here
        store.add_labels("web", &labels(&[("env", "prod")])).unwrap();
    }

    let store = open_in(&temp_dir, 2);

    assert_eq!(
        targets_of(&store, "web"),
        Some(vec!["a:1".into(), "b:1".into()])
    );
    assert_eq!(store.get_labels("web").unwrap(), labels(&[("env", "prod")]));
}

#[test]
fn test_recovery_drops_torn_wal_tail() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = open_in(&temp_dir, 1000);
        store.add_target("web", "a:1").unwrap();
        store.add_target("web", "b:1").unwrap();
    }
    let mut wal = OpenOptions::new()
        .append(true)
        .open(temp_dir.path().join("wal.log"))
        .unwrap();
    wal.write_all(&[0x07; 11]).unwrap();
    drop(wal);

    let store = open_in(&temp_dir, 1000);

    assert_eq!(
        targets_of(&store, "web"),
        Some(vec!["a:1".into(), "b:1".into()])
    );
    store.add_target("web", "c:1").unwrap();
    assert_eq!(targets_of(&store, "web").unwrap().len(), 3);
}

#[test]
fn test_corrupt_checkpoint_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = open_in(&temp_dir, 1000);
        store.add_target("web", "a:1").unwrap();
        store.shutdown().unwrap();
    }
    std::fs::write(temp_dir.path().join("checkpoint.db"), b"garbage").unwrap();

    let config = Config::builder().store_path(temp_dir.path()).build();
    assert!(matches!(
        EmbeddedStore::open(&config.local),
        Err(SdError::Checkpoint(_))
    ));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers() {
    let (_temp, store) = setup_temp_store();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..25 {
                    store
                        .add_target("shared", &format!("host-{t}-{i}:9100"))
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(targets_of(store.as_ref(), "shared").unwrap().len(), 200);
}

#[test]
fn test_readers_never_see_half_a_transaction() {
    let (_temp, store) = setup_temp_store();
    let store = Arc::new(store);

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..200 {
                let group = format!("g{i}");
                store
                    .update(|txn| {
                        txn.put(Partition::Targets, &group, "a:1", "");
                        txn.put(Partition::Labels, &group, "env", "prod");
                        Ok(())
                    })
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..200 {
                    let view = store.view().unwrap();
                    for name in view.group_names() {
                        assert_eq!(
                            view.has_bucket(Partition::Targets, name),
                            view.has_bucket(Partition::Labels, name)
                        );
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(store.list_groups().unwrap().len(), 200);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_operations_after_shutdown_fail_closed() {
    let (_temp, store) = setup_temp_store();
    store.add_target("web", "a:1").unwrap();

    store.shutdown().unwrap();

    assert!(matches!(store.add_target("web", "b:1"), Err(SdError::Closed)));
    assert!(matches!(store.remove_group("web"), Err(SdError::Closed)));
    assert!(matches!(store.get_labels("web"), Err(SdError::Closed)));
    assert!(matches!(store.serialize(false), Err(SdError::Closed)));
    assert!(matches!(store.shutdown(), Err(SdError::Closed)));
}
