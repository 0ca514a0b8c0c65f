//! Request metrics
//!
//! Names follow the `httpsdserver_` family existing dashboards query.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;

pub const REQ_DURATION: &str = "httpsdserver_req_duration_seconds";
pub const TARGET_GROUP_UPDATES: &str = "httpsdserver_target_group_updates";
pub const TARGET_GROUP_UPDATES_FAILED: &str = "httpsdserver_target_group_updates_failed";
pub const TARGET_DELETE: &str = "httpsdserver_target_delete";
pub const TARGET_DELETE_FAILED: &str = "httpsdserver_target_delete_failed";
pub const LABELS_UPDATES: &str = "httpsdserver_target_group_labels_updates";
pub const LABELS_UPDATES_FAILED: &str = "httpsdserver_target_group_labels_updates_failed";

/// Success and failure counters of one kind of mutation
#[derive(Debug, Clone, Copy)]
pub struct Counters {
    pub ok: &'static str,
    pub failed: &'static str,
}

pub const TARGET_UPDATE: Counters = Counters {
    ok: TARGET_GROUP_UPDATES,
    failed: TARGET_GROUP_UPDATES_FAILED,
};

pub const DELETE: Counters = Counters {
    ok: TARGET_DELETE,
    failed: TARGET_DELETE_FAILED,
};

pub const LABELS_UPDATE: Counters = Counters {
    ok: LABELS_UPDATES,
    failed: LABELS_UPDATES_FAILED,
};

impl Counters {
    pub fn success(&self) {
        metrics::counter!(self.ok).increment(1);
    }

    pub fn failure(&self) {
        metrics::counter!(self.failed).increment(1);
    }
}

/// Record request duration labeled by route pattern
pub async fn track_duration(path: Option<MatchedPath>, req: Request, next: Next) -> Response {
    let path = path
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();
    let response = next.run(req).await;
    metrics::histogram!(REQ_DURATION, "path" => path).record(start.elapsed().as_secs_f64());
    response
}
