//! Partition Module
//!
//! In-memory state of the embedded engine.
//!
//! ## Responsibilities
//! - Hold the two namespaced partitions (`targets:<group>` and
//!   `labels:<group>` buckets)
//! - Apply logged [`Operation`](crate::wal::Operation)s in order
//! - Stage a write transaction against a committed snapshot
//!
//! ## Data Structure Choice
//! Each bucket is a `BTreeMap<String, String>`. Target buckets store the
//! target as key with an empty value. The whole table is published behind
//! an `Arc`, so readers keep a consistent snapshot while a writer prepares
//! the next one.

mod table;
mod txn;

pub use table::{Bucket, Partitions};
pub use txn::WriteTxn;

use std::fmt;

use serde::{Deserialize, Serialize};

/// The namespace a bucket lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Partition {
    /// Buckets whose keys are scrape targets
    Targets,

    /// Buckets mapping label name to label value
    Labels,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Targets => "targets",
            Partition::Labels => "labels",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
