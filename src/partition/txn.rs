//! Write transaction staging
//!
//! A [`WriteTxn`] reads from the snapshot committed before it began and
//! records operations. Nothing is visible to anyone until the engine logs
//! the recorded batch and publishes it.

use super::{Bucket, Partition, Partitions};
use crate::wal::Operation;

/// Staged write transaction over a committed snapshot
pub struct WriteTxn<'a> {
    base: &'a Partitions,
    ops: Vec<Operation>,
}

impl<'a> WriteTxn<'a> {
    pub fn new(base: &'a Partitions) -> Self {
        Self {
            base,
            ops: Vec::new(),
        }
    }

    /// Committed state of a bucket as of the start of the transaction
    pub fn bucket(&self, partition: Partition, group: &str) -> Option<&'a Bucket> {
        self.base.bucket(partition, group)
    }

    pub fn create_bucket(&mut self, partition: Partition, group: &str) {
        if !self.base.has_bucket(partition, group) {
            self.ops.push(Operation::CreateBucket {
                partition,
                group: group.to_string(),
            });
        }
    }

    /// Put `key = value`, creating the bucket if needed
    pub fn put(&mut self, partition: Partition, group: &str, key: &str, value: &str) {
        let unchanged = self
            .bucket(partition, group)
            .and_then(|b| b.get(key))
            .is_some_and(|v| v == value);
        if !unchanged {
            self.ops.push(Operation::Put {
                partition,
                group: group.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            });
        }
    }

    /// Delete `key`; absent keys and buckets are a no-op
    pub fn delete(&mut self, partition: Partition, group: &str, key: &str) {
        let present = self
            .bucket(partition, group)
            .is_some_and(|b| b.contains_key(key));
        if present {
            self.ops.push(Operation::Delete {
                partition,
                group: group.to_string(),
                key: key.to_string(),
            });
        }
    }

    pub fn drop_bucket(&mut self, partition: Partition, group: &str) {
        if self.base.has_bucket(partition, group) {
            self.ops.push(Operation::DropBucket {
                partition,
                group: group.to_string(),
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_operations(self) -> Vec<Operation> {
        self.ops
    }
}
