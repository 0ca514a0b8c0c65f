//! Partition table implementation
//!
//! BTreeMap of buckets keyed by `(partition, group)`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::Partition;
use crate::group::{NamedGroup, TargetGroup};
use crate::wal::Operation;

/// Key -> value within one bucket
pub type Bucket = BTreeMap<String, String>;

/// Full state of both partitions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partitions {
    buckets: BTreeMap<(Partition, String), Bucket>,
}

impl Partitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a bucket if it exists
    pub fn bucket(&self, partition: Partition, group: &str) -> Option<&Bucket> {
        // Tuple keys need an owned String to borrow from.
        self.buckets.get(&(partition, group.to_string()))
    }

    pub fn has_bucket(&self, partition: Partition, group: &str) -> bool {
        self.bucket(partition, group).is_some()
    }

    /// Apply one logged operation
    pub fn apply(&mut self, op: &Operation) {
        match op {
            Operation::CreateBucket { partition, group } => {
                self.buckets.entry((*partition, group.clone())).or_default();
            }
            Operation::Put {
                partition,
                group,
                key,
                value,
            } => {
                self.buckets
                    .entry((*partition, group.clone()))
                    .or_default()
                    .insert(key.clone(), value.clone());
            }
            Operation::Delete {
                partition,
                group,
                key,
            } => {
                if let Some(bucket) = self.buckets.get_mut(&(*partition, group.clone())) {
                    bucket.remove(key);
                }
            }
            Operation::DropBucket { partition, group } => {
                self.buckets.remove(&(*partition, group.clone()));
            }
        }
    }

    /// Names of every group with a bucket in either partition
    pub fn group_names(&self) -> BTreeSet<&str> {
        self.buckets.keys().map(|(_, group)| group.as_str()).collect()
    }

    /// Assemble a group from both partitions; `None` if neither bucket exists
    pub fn group(&self, name: &str) -> Option<TargetGroup> {
        let targets = self.bucket(Partition::Targets, name);
        let labels = self.bucket(Partition::Labels, name);
        if targets.is_none() && labels.is_none() {
            return None;
        }
        Some(TargetGroup {
            targets: targets
                .map(|b| b.keys().cloned().collect())
                .unwrap_or_default(),
            labels: labels.cloned().unwrap_or_default(),
        })
    }

    /// Every group, in name order
    pub fn groups(&self) -> Vec<NamedGroup> {
        self.group_names()
            .into_iter()
            .filter_map(|name| {
                self.group(name).map(|group| NamedGroup {
                    name: name.to_string(),
                    group,
                })
            })
            .collect()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
