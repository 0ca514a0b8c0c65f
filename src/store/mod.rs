//! Store Module
//!
//! The operation set every storage engine implements, and the startup-time
//! choice between the two engines.
//!
//! ## Engines
//! - [`EmbeddedStore`]: single process, file backed, snapshot reads
//! - [`DistributedStore`]: shared KV service, per-group lock on writes,
//!   unlocked reads
//!
//! Both validate input before touching storage and reject every call after
//! [`Store::shutdown`] with [`SdError::Closed`](crate::SdError::Closed).

mod distributed;
mod embedded;
mod gate;

pub use distributed::{DistributedOptions, DistributedStore};
pub use embedded::EmbeddedStore;
pub use gate::{DrainGate, OpGuard};

use crate::config::{Config, StoreType};
use crate::error::Result;
use crate::group::{self, Labels, NamedGroup};
use crate::snapshot;

/// Operations uniform across engines.
///
/// Removals of things that do not exist succeed. Calls are synchronous and
/// may block on disk or network I/O.
pub trait Store: Send + Sync {
    /// Add `target` to `group`, creating the group if needed
    fn add_target(&self, group: &str, target: &str) -> Result<()>;

    /// Remove `target` from `group`
    fn remove_target(&self, group: &str, target: &str) -> Result<()>;

    /// Delete `group` with all its targets and labels, atomically
    fn remove_group(&self, group: &str) -> Result<()>;

    /// Merge `labels` into the group's labels, creating the group if needed
    fn add_labels(&self, group: &str, labels: &Labels) -> Result<()>;

    /// Remove one label key from `group`
    fn remove_label(&self, group: &str, label: &str) -> Result<()>;

    /// Current labels of `group`; empty if the group does not exist
    fn get_labels(&self, group: &str) -> Result<Labels>;

    /// Every group with its content. Undecodable records are skipped.
    fn list_groups(&self) -> Result<Vec<NamedGroup>>;

    /// Release engine resources. Later calls fail with `Closed`.
    fn shutdown(&self) -> Result<()>;

    /// Short engine name for logs
    fn kind(&self) -> &'static str;

    /// Full snapshot in production (`debug = false`) or debug shape.
    ///
    /// Both shapes come from the same [`Store::list_groups`] call.
    fn serialize(&self, debug: bool) -> Result<String> {
        let groups = self.list_groups()?;
        snapshot::render(&groups, debug)
    }
}

/// The engine chosen at startup
pub enum Backend {
    Embedded(EmbeddedStore),
    Distributed(DistributedStore),
}

impl Backend {
    /// Open the engine selected by `config.store_type`
    pub fn open(config: &Config) -> Result<Self> {
        match config.store_type {
            StoreType::Local => Ok(Backend::Embedded(EmbeddedStore::open(&config.local)?)),
            StoreType::Consul => Ok(Backend::Distributed(DistributedStore::open(
                &config.consul,
            )?)),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            Backend::Embedded($store) => $call,
            Backend::Distributed($store) => $call,
        }
    };
}

impl Store for Backend {
    fn add_target(&self, group: &str, target: &str) -> Result<()> {
        dispatch!(self, s => s.add_target(group, target))
    }

    fn remove_target(&self, group: &str, target: &str) -> Result<()> {
        dispatch!(self, s => s.remove_target(group, target))
    }

    fn remove_group(&self, group: &str) -> Result<()> {
        dispatch!(self, s => s.remove_group(group))
    }

    fn add_labels(&self, group: &str, labels: &Labels) -> Result<()> {
        dispatch!(self, s => s.add_labels(group, labels))
    }

    fn remove_label(&self, group: &str, label: &str) -> Result<()> {
        dispatch!(self, s => s.remove_label(group, label))
    }

    fn get_labels(&self, group: &str) -> Result<Labels> {
        dispatch!(self, s => s.get_labels(group))
    }

    fn list_groups(&self) -> Result<Vec<NamedGroup>> {
        dispatch!(self, s => s.list_groups())
    }

    fn shutdown(&self) -> Result<()> {
        dispatch!(self, s => s.shutdown())
    }

    fn kind(&self) -> &'static str {
        dispatch!(self, s => s.kind())
    }
}

// =============================================================================
// Input validation shared by both engines
// =============================================================================

pub(crate) fn check_target(group: &str, target: &str) -> Result<()> {
    group::validate_group(group)?;
    group::validate_target(target)
}

pub(crate) fn check_labels(group: &str, labels: &Labels) -> Result<()> {
    group::validate_group(group)?;
    group::validate_labels(labels)
}
