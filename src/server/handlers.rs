//! Route handlers

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

use super::metrics::{self, Counters};
use super::AppState;
use crate::error::{Result, SdError};
use crate::group::Labels;
use crate::snapshot;
use crate::store::Store;

const JSON: &str = "application/json";

/// Run a store call on the blocking pool
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T>
where
    F: FnOnce(&dyn Store) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| SdError::Storage(format!("store task failed: {e}")))?
}

fn error_response(e: &SdError) -> Response {
    let status = if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else if matches!(e, SdError::Closed) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, format!("{e}\n")).into_response()
}

fn mutation_response(result: Result<()>, counters: Counters, what: &str) -> Response {
    match result {
        Ok(()) => {
            counters.success();
            (StatusCode::OK, "OK\n").into_response()
        }
        Err(e) if e.is_client_error() => {
            warn!(error = %e, "Rejected {}", what);
            error_response(&e)
        }
        Err(e) => {
            error!(error = %e, "Could not {}", what);
            counters.failure();
            error_response(&e)
        }
    }
}

pub async fn add_target(
    State(state): State<AppState>,
    Path((group, target)): Path<(String, String)>,
) -> Response {
    let result = blocking(&state, move |s| s.add_target(&group, &target)).await;
    mutation_response(result, metrics::TARGET_UPDATE, "add target")
}

pub async fn remove_target(
    State(state): State<AppState>,
    Path((group, target)): Path<(String, String)>,
) -> Response {
    let result = blocking(&state, move |s| s.remove_target(&group, &target)).await;
    mutation_response(result, metrics::DELETE, "remove target")
}

pub async fn remove_group(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> Response {
    let result = blocking(&state, move |s| s.remove_group(&group)).await;
    mutation_response(result, metrics::DELETE, "remove target group")
}

/// `?labels=k=v&labels=k2=v2`; other query keys are ignored
pub async fn add_labels(
    State(state): State<AppState>,
    Path(group): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let labels = match parse_labels(&params) {
        Ok(labels) => labels,
        Err(e) => return error_response(&e),
    };
    let result = blocking(&state, move |s| s.add_labels(&group, &labels)).await;
    mutation_response(result, metrics::LABELS_UPDATE, "add labels")
}

pub async fn remove_label(
    State(state): State<AppState>,
    Path((group, label)): Path<(String, String)>,
) -> Response {
    let result = blocking(&state, move |s| s.remove_label(&group, &label)).await;
    mutation_response(result, metrics::LABELS_UPDATE, "remove label")
}

pub async fn get_labels(State(state): State<AppState>, Path(group): Path<String>) -> Response {
    match blocking(&state, move |s| s.get_labels(&group)).await {
        Ok(labels) => Json(labels).into_response(),
        Err(e) => {
            if !e.is_client_error() {
                error!(error = %e, "Could not read labels");
            }
            error_response(&e)
        }
    }
}

/// Production snapshot. A store failure degrades to an empty list so the
/// poller keeps its last good view instead of erroring.
pub async fn targets(State(state): State<AppState>) -> Response {
    let body = match blocking(&state, |s| s.serialize(false)).await {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "Could not serialize target groups");
            snapshot::EMPTY.to_string()
        }
    };
    ([(header::CONTENT_TYPE, JSON)], format!("{body}\n")).into_response()
}

pub async fn debug_targets(State(state): State<AppState>) -> Response {
    match blocking(&state, |s| s.serialize(true)).await {
        Ok(body) => ([(header::CONTENT_TYPE, JSON)], format!("{body}\n")).into_response(),
        Err(e) => {
            error!(error = %e, "Could not serialize target groups");
            error_response(&e)
        }
    }
}

pub async fn debug_config(State(state): State<AppState>) -> Response {
    match state.config.to_yaml() {
        Ok(yaml) => ([(header::CONTENT_TYPE, "application/yaml")], yaml).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn render_metrics(State(state): State<AppState>) -> Response {
    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
        .into_response()
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK\n")
}

fn parse_labels(params: &[(String, String)]) -> Result<Labels> {
    let mut labels = Labels::new();
    for (key, value) in params {
        if key != "labels" {
            continue;
        }
        let (name, val) = value
            .split_once('=')
            .ok_or_else(|| SdError::InvalidLabel(value.clone()))?;
        labels.insert(name.to_string(), val.to_string());
    }
    Ok(labels)
}
