//! # promsd
//!
//! A registry of Prometheus HTTP service-discovery target groups with:
//! - An embedded engine: write-ahead log, checkpoints, snapshot reads
//! - A distributed engine over Consul with a per-group lock on writes
//! - The HTTP SD snapshot format Prometheus polls
//! - An HTTP API to mutate and read groups
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    HTTP API (axum)                          │
//! │             /api/target  /api/labels  /api/targets          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Arc<dyn Store>
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Store contract                           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────┐
//!   │  Embedded   │          │ Distributed  │
//!   │ WAL + state │          │ lock + KV    │
//!   └──────┬──────┘          └──────┬───────┘
//!          │                        │
//!          ▼                        ▼
//!   ┌─────────────┐          ┌──────────────┐
//!   │ Checkpoint  │          │   Consul     │
//!   └─────────────┘          └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod checkpoint;
mod clock;
pub mod coord;
pub mod group;
pub mod partition;
pub mod server;
pub mod snapshot;
pub mod store;
pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use error::{Result, SdError};
pub use group::{Labels, NamedGroup, TargetGroup};
pub use store::{Backend, DistributedStore, EmbeddedStore, Store};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of promsd
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
