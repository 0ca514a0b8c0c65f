//! Coordination Module
//!
//! Access to the shared KV + session service behind the distributed engine.
//!
//! ## Responsibilities
//! - [`KvBackend`]: the KV and session calls the engine needs
//! - [`ConsulClient`]: the backend over Consul's HTTP API
//! - [`MemoryKv`]: an in-process backend with session TTL expiry
//! - [`GroupLocker`]: the per-group mutual-exclusion protocol
//!
//! ## Lock Protocol
//! ```text
//! create session (TTL, behavior=release) ──► renew every TTL/2
//!        │
//!        ▼
//! acquire <prefix>-lock/targetGroup/<g> ──► retry until granted or deadline
//!        │ granted                              │ deadline / error
//!        ▼                                      ▼
//!   LockGuard ── drop ──► release, destroy   destroy session, fail
//! ```
//!
//! If the holder dies, its session stops being renewed and the service
//! frees the lock once the TTL lapses.

mod consul;
mod lock;
mod memory;

pub use consul::ConsulClient;
pub use lock::{GroupLocker, LockGuard, LockOptions};
pub use memory::MemoryKv;

use std::time::Duration;

use crate::error::Result;

/// What happens to keys held by a session when it is invalidated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBehavior {
    /// Held locks are released, values kept
    Release,
    /// Held keys are deleted
    Delete,
}

impl SessionBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionBehavior::Release => "release",
            SessionBehavior::Delete => "delete",
        }
    }
}

/// Parameters for a new session
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub name: String,
    pub ttl: Duration,
    pub behavior: SessionBehavior,
}

/// KV and session operations of the coordination service.
///
/// All calls block. Network and service failures surface as
/// [`SdError::Http`](crate::SdError::Http).
pub trait KvBackend: Send + Sync {
    /// Raw value of `key`, `None` if absent
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Delete `key`; absent keys are not an error
    fn delete(&self, key: &str) -> Result<()>;

    /// All keys starting with `prefix`
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Create a session, returning its id
    fn create_session(&self, spec: &SessionSpec) -> Result<String>;

    /// Extend a session's TTL; `false` if the session no longer exists
    fn renew_session(&self, id: &str) -> Result<bool>;

    fn destroy_session(&self, id: &str) -> Result<()>;

    /// Try to take the lock on `key` for `session`, writing `value` on success
    fn acquire(&self, key: &str, value: &[u8], session: &str) -> Result<bool>;

    /// Release the lock on `key` if `session` holds it
    fn release(&self, key: &str, session: &str) -> Result<bool>;
}
