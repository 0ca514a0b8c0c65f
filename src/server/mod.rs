//! HTTP Server Module
//!
//! The request layer in front of a [`Store`](crate::Store).
//!
//! ## Architecture
//! - `axum` router on a multi-threaded `tokio` runtime
//! - Store calls are synchronous and run on the blocking pool
//! - Graceful shutdown: stop accepting, finish in-flight requests, return
//!
//! ## Routes
//! | Method | Path                                 | Operation                  |
//! |--------|--------------------------------------|----------------------------|
//! | POST   | `/api/target/{group}/{target}`       | add target                 |
//! | DELETE | `/api/target/{group}/{target}`       | remove target              |
//! | DELETE | `/api/target/{group}`                | remove group               |
//! | POST   | `/api/labels/update/{group}?labels=k=v` | add labels              |
//! | DELETE | `/api/labels/update/{group}/{label}` | remove label               |
//! | GET    | `/api/labels/{group}`                | read labels                |
//! | GET    | `/api/targets`                       | production snapshot        |
//! | GET    | `/debug_targets`                     | debug snapshot             |
//! | GET    | `/debug_config`                      | effective config (YAML)    |
//! | GET    | `/metrics`                           | Prometheus exposition      |
//! | GET    | `/health`                            | liveness                   |

mod handlers;
pub mod metrics;
mod state;

pub use state::AppState;

use std::future::Future;

use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use tokio::net::TcpListener;

use crate::error::Result;

/// Build the router over `state`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/target/:group/:target",
            post(handlers::add_target).delete(handlers::remove_target),
        )
        .route("/api/target/:group", delete(handlers::remove_group))
        .route("/api/labels/update/:group", post(handlers::add_labels))
        .route(
            "/api/labels/update/:group/:label",
            delete(handlers::remove_label),
        )
        .route("/api/labels/:group", get(handlers::get_labels))
        .route("/api/targets", get(handlers::targets))
        .route("/debug_targets", get(handlers::debug_targets))
        .route("/debug_config", get(handlers::debug_config))
        .route("/metrics", get(handlers::render_metrics))
        .route("/health", get(handlers::health))
        .route_layer(middleware::from_fn(metrics::track_duration))
        .with_state(state)
}

/// Serve on `listener` until `shutdown` resolves, then drain connections
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, store = state.store.kind(), "HTTP server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("HTTP server stopped accepting connections");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, initiating shutdown..."),
        _ = terminate => tracing::info!("Received SIGTERM, initiating shutdown..."),
    }
}
