//! Snapshot serializer
//!
//! Projects the enumerated target groups into the two output shapes:
//!
//! ```text
//! production (debug = false)          debug (debug = true)
//! [                                   {
//!     {                                   "targets": {
//!         "targets": ["a:9100"],              "web": {
//!         "labels": {"env": "prod"}               "targets": ["a:9100"],
//!     }                                           "labels": {"env": "prod"}
//! ]                                           }
//!                                         }
//!                                     }
//! ```
//!
//! The production form is what the Prometheus HTTP SD poller consumes: field
//! names, nesting and the absence of the group name are part of the contract.
//!
//! Groups are emitted sorted by name and targets sorted lexicographically.
//! That order is a property of this renderer, not a promise of the store
//! contract; consumers should treat both as unordered sets.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::error::Result;
use crate::group::{NamedGroup, TargetGroup};

#[derive(Serialize)]
struct DebugView<'a> {
    targets: BTreeMap<&'a str, &'a TargetGroup>,
}

/// Render a snapshot in production or debug shape
pub fn render(groups: &[NamedGroup], debug: bool) -> Result<String> {
    if debug {
        let view = DebugView {
            targets: groups.iter().map(|g| (g.name.as_str(), &g.group)).collect(),
        };
        return to_pretty_json(&view);
    }

    let mut sorted: Vec<&NamedGroup> = groups.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    let list: Vec<&TargetGroup> = sorted.into_iter().map(|g| &g.group).collect();
    to_pretty_json(&list)
}

/// Empty production snapshot, served when the store cannot be listed
pub const EMPTY: &str = "[]";

fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| crate::SdError::Serialization(e.to_string()))
}
