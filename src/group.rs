//! Target group entity
//!
//! A target group is a named set of scrape endpoints plus a label map. The
//! value type here carries no reference to any engine; engines own the
//! persisted state and hand out copies.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdError};

/// Label key -> label value
pub type Labels = BTreeMap<String, String>;

/// Targets and labels of one group.
///
/// The group name is not part of the serialized record: the production
/// snapshot omits it, and engines key records by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    #[serde(default)]
    pub targets: BTreeSet<String>,

    #[serde(default)]
    pub labels: Labels,
}

impl TargetGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty() && self.labels.is_empty()
    }

    /// Decode a persisted JSON record
    pub fn from_json(group: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| SdError::RecordDecode {
            group: group.to_string(),
            reason: e.to_string(),
        })
    }

    /// Encode as a persisted JSON record
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A group paired with its name, as enumerated for a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedGroup {
    pub name: String,
    pub group: TargetGroup,
}

/// In-memory mutation of one group's record.
///
/// Kept free of I/O so the read-modify-write cycle of the distributed engine
/// can be tested without a coordination service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupMutation {
    AddTarget(String),
    RemoveTarget(String),
    AddLabels(Labels),
    RemoveLabel(String),
}

impl GroupMutation {
    /// Apply to `group`, returning whether anything changed
    pub fn apply(&self, group: &mut TargetGroup) -> bool {
        match self {
            GroupMutation::AddTarget(target) => group.targets.insert(target.clone()),
            GroupMutation::RemoveTarget(target) => group.targets.remove(target),
            GroupMutation::AddLabels(labels) => {
                let mut changed = false;
                for (k, v) in labels {
                    if group.labels.get(k) != Some(v) {
                        group.labels.insert(k.clone(), v.clone());
                        changed = true;
                    }
                }
                changed
            }
            GroupMutation::RemoveLabel(label) => group.labels.remove(label).is_some(),
        }
    }

    /// Whether the mutation is a removal (tolerated on an absent group)
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            GroupMutation::RemoveTarget(_) | GroupMutation::RemoveLabel(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            GroupMutation::AddTarget(_) => "add_target",
            GroupMutation::RemoveTarget(_) => "remove_target",
            GroupMutation::AddLabels(_) => "add_labels",
            GroupMutation::RemoveLabel(_) => "remove_label",
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

fn label_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("label name pattern is valid")
    })
}

fn target_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(([a-z0-9]|[a-z0-9][a-z0-9\-]*[a-z0-9])\.)*([a-z0-9]|[a-z0-9][a-z0-9\-]*[a-z0-9])(:[0-9]+)?$",
        )
        .expect("target pattern is valid")
    })
}

pub fn is_valid_label_name(name: &str) -> bool {
    label_name_re().is_match(name)
}

pub fn is_valid_target(target: &str) -> bool {
    target_re().is_match(target)
}

/// Group names become the last segment of a KV key, so `/` is not allowed.
/// `.` and `..` are dot-segments that URL path handling drops or resolves.
pub fn validate_group(group: &str) -> Result<()> {
    if group.is_empty() || group.contains('/') || group == "." || group == ".." {
        return Err(SdError::InvalidGroup(group.to_string()));
    }
    Ok(())
}

pub fn validate_target(target: &str) -> Result<()> {
    if !is_valid_target(target) {
        return Err(SdError::InvalidTarget(target.to_string()));
    }
    Ok(())
}

pub fn validate_label_name(label: &str) -> Result<()> {
    if !is_valid_label_name(label) {
        return Err(SdError::InvalidLabel(label.to_string()));
    }
    Ok(())
}

pub fn validate_labels(labels: &Labels) -> Result<()> {
    labels.keys().try_for_each(|k| validate_label_name(k))
}
