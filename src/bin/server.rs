//! promsd Server Binary
//!
//! Serves the Prometheus HTTP SD endpoint and the group management API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use promsd::server::{self, AppState};
use promsd::{Backend, Config, Store};
use tracing_subscriber::{fmt, EnvFilter};

/// promsd Server
#[derive(Parser, Debug)]
#[command(name = "promsd-server")]
#[command(about = "Prometheus HTTP service discovery target registry")]
#[command(version)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    conf_path: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize tracing/logging
    let default_filter = if args.debug {
        "info,promsd=debug"
    } else {
        "info,promsd=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    tracing::info!("promsd Server v{}", promsd::VERSION);
    tracing::info!("Config file: {}", args.conf_path.display());

    let config = match Config::load_from_file(&args.conf_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // Opened before the runtime exists: the Consul client is blocking.
    let store: Arc<dyn Store> = match Backend::open(&config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("Failed to open {:?} store: {}", config.store_type, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Store initialized successfully ({})", store.kind());

    let listen = config.listen_addr();
    let mut state = AppState::new(Arc::clone(&store), config);
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => tracing::warn!("Metrics disabled: {}", e),
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let served = runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&listen).await?;
        server::serve(listener, state, server::shutdown_signal()).await
    });
    drop(runtime);

    let mut exit_code = 0;
    if let Err(e) = served {
        tracing::error!("Server error: {}", e);
        exit_code = 1;
    }

    if let Err(e) = store.shutdown() {
        tracing::error!("Store shutdown failed: {}", e);
        exit_code = 1;
    }

    tracing::info!("Server stopped");
    std::process::exit(exit_code);
}
