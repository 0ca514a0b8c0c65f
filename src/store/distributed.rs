//! Distributed engine
//!
//! One JSON record per group at `<prefix>/targetGroup/<group>` in a shared
//! KV service. Writers serialize per group through [`GroupLocker`]; readers
//! take no lock and may see a record mid-update.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::gate::DrainGate;
use super::{check_labels, check_target, Store};
use crate::config::ConsulConfig;
use crate::coord::{ConsulClient, GroupLocker, KvBackend, LockOptions};
use crate::error::{Result, SdError};
use crate::group::{validate_group, GroupMutation, Labels, NamedGroup, TargetGroup};

/// Distributed engine settings independent of the backend
#[derive(Debug, Clone)]
pub struct DistributedOptions {
    pub key_prefix: String,
    pub lock: LockOptions,
}

impl Default for DistributedOptions {
    fn default() -> Self {
        Self::from(&ConsulConfig::default())
    }
}

impl From<&ConsulConfig> for DistributedOptions {
    fn from(config: &ConsulConfig) -> Self {
        Self {
            key_prefix: config.key_prefix.clone(),
            lock: LockOptions::from(config),
        }
    }
}

pub struct DistributedStore {
    kv: Arc<dyn KvBackend>,
    locker: GroupLocker,
    /// `<prefix>/targetGroup/`
    records_prefix: String,
    gate: DrainGate,
}

impl DistributedStore {
    /// Connect to Consul and check that the cluster has a leader
    pub fn open(config: &ConsulConfig) -> Result<Self> {
        config.validate()?;
        let client = ConsulClient::new(config)?;
        let leader = client.check_leader()?;
        info!(address = %config.address, leader = %leader, "Connected to Consul");
        Ok(Self::new(Arc::new(client), DistributedOptions::from(config)))
    }

    pub fn new(kv: Arc<dyn KvBackend>, options: DistributedOptions) -> Self {
        let prefix = options.key_prefix.trim_matches('/');
        Self {
            locker: GroupLocker::new(Arc::clone(&kv), prefix, options.lock),
            records_prefix: format!("{prefix}/targetGroup/"),
            kv,
            gate: DrainGate::new(),
        }
    }

    /// KV key holding `group`'s record
    pub fn record_key(&self, group: &str) -> String {
        format!("{}{}", self.records_prefix, group)
    }

    /// KV key of `group`'s lock
    pub fn lock_key(&self, group: &str) -> String {
        self.locker.lock_key(group)
    }

    fn read_record(&self, group: &str) -> Result<Option<TargetGroup>> {
        match self.kv.get(&self.record_key(group))? {
            Some(bytes) => TargetGroup::from_json(group, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Locked read-modify-write of one group's record.
    ///
    /// The lock guard is created only by a successful acquire, so release
    /// never runs for a failed one.
    fn mutate(&self, group: &str, mutation: GroupMutation) -> Result<()> {
        let _op = self.gate.enter()?;
        let _lock = self.locker.acquire(group)?;

        // A record that fails to decode aborts the mutation unwritten.
        let existing = self.read_record(group)?;
        let absent = existing.is_none();
        if absent && mutation.is_removal() {
            debug!(group, op = mutation.name(), "Group absent, nothing to remove");
            return Ok(());
        }

        let mut record = existing.unwrap_or_default();
        let changed = mutation.apply(&mut record);
        if !changed && !absent {
            debug!(group, op = mutation.name(), "Record unchanged");
            return Ok(());
        }

        self.kv.put(&self.record_key(group), &record.to_json()?)?;
        debug!(group, op = mutation.name(), "Record written");
        Ok(())
    }
}

impl Store for DistributedStore {
    fn add_target(&self, group: &str, target: &str) -> Result<()> {
        check_target(group, target)?;
        self.mutate(group, GroupMutation::AddTarget(target.to_string()))
    }

    fn remove_target(&self, group: &str, target: &str) -> Result<()> {
        validate_group(group)?;
        self.mutate(group, GroupMutation::RemoveTarget(target.to_string()))
    }

    fn remove_group(&self, group: &str) -> Result<()> {
        validate_group(group)?;
        let _op = self.gate.enter()?;
        let _lock = self.locker.acquire(group)?;
        self.kv.delete(&self.record_key(group))?;
        debug!(group, "Removed target group");
        Ok(())
    }

    fn add_labels(&self, group: &str, labels: &Labels) -> Result<()> {
        check_labels(group, labels)?;
        self.mutate(group, GroupMutation::AddLabels(labels.clone()))
    }

    fn remove_label(&self, group: &str, label: &str) -> Result<()> {
        validate_group(group)?;
        self.mutate(group, GroupMutation::RemoveLabel(label.to_string()))
    }

    fn get_labels(&self, group: &str) -> Result<Labels> {
        validate_group(group)?;
        let _op = self.gate.enter()?;
        Ok(self
            .read_record(group)?
            .map(|record| record.labels)
            .unwrap_or_default())
    }

    fn list_groups(&self) -> Result<Vec<NamedGroup>> {
        let _op = self.gate.enter()?;
        let mut groups = Vec::new();

        for key in self.kv.keys(&self.records_prefix)? {
            let name = match key.strip_prefix(&self.records_prefix) {
                Some(name) if !name.is_empty() && !name.contains('/') => name,
                _ => continue,
            };
            match self.read_record(name) {
                Ok(Some(group)) => groups.push(NamedGroup {
                    name: name.to_string(),
                    group,
                }),
                // Deleted between listing and fetching.
                Ok(None) => {}
                Err(SdError::RecordDecode { group, reason }) => {
                    warn!(group = %group, reason = %reason, "Skipping undecodable record");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(groups)
    }

    fn shutdown(&self) -> Result<()> {
        self.gate.close_and_drain()?;
        info!("Distributed store closed");
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "consul"
    }
}
