//! Per-group lock
//!
//! Each acquisition runs in its own session so that a crashed holder's lock
//! is reclaimed by TTL alone. The session is renewed from a background
//! thread for as long as the guard lives.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use super::{KvBackend, SessionBehavior, SessionSpec};
use crate::clock::unix_millis;
use crate::config::ConsulConfig;
use crate::error::{Result, SdError};

/// Lock timing
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Session TTL; also bounds how long a crashed holder blocks others
    pub session_ttl: Duration,

    /// Give up after this long; `None` waits until granted
    pub wait_timeout: Option<Duration>,

    /// Pause between attempts while the lock is held elsewhere
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self::from(&ConsulConfig::default())
    }
}

impl From<&ConsulConfig> for LockOptions {
    fn from(config: &ConsulConfig) -> Self {
        Self {
            session_ttl: config.session_ttl(),
            wait_timeout: config.lock_wait_timeout(),
            retry_interval: config.lock_retry_interval(),
        }
    }
}

/// Hands out per-group locks under `<prefix>-lock/targetGroup/`
pub struct GroupLocker {
    kv: Arc<dyn KvBackend>,
    prefix: String,
    options: LockOptions,
}

impl GroupLocker {
    pub fn new(kv: Arc<dyn KvBackend>, key_prefix: &str, options: LockOptions) -> Self {
        Self {
            kv,
            prefix: key_prefix.trim_matches('/').to_string(),
            options,
        }
    }

    pub fn lock_key(&self, group: &str) -> String {
        format!("{}-lock/targetGroup/{}", self.prefix, group)
    }

    /// Block until the group's lock is held or the wait bound passes.
    ///
    /// On failure no lock state is left behind: the session created for the
    /// attempt is destroyed and nothing is released.
    pub fn acquire(&self, group: &str) -> Result<LockGuard> {
        let key = self.lock_key(group);
        let fail = |reason: String| SdError::LockAcquisition {
            group: group.to_string(),
            reason,
        };

        let session = self
            .kv
            .create_session(&SessionSpec {
                name: key.clone(),
                ttl: self.options.session_ttl,
                behavior: SessionBehavior::Release,
            })
            .map_err(|e| fail(format!("could not create session: {e}")))?;

        // Renew while waiting too: a long wait must not outlive the session.
        let renewer = Renewer::start(Arc::clone(&self.kv), session.clone(), self.options.session_ttl);

        let value = serde_json::json!({ "set_at": unix_millis() }).to_string();
        let deadline = self.options.wait_timeout.map(|t| Instant::now() + t);
        let started = Instant::now();

        loop {
            match self.kv.acquire(&key, value.as_bytes(), &session) {
                Ok(true) => break,
                Ok(false) => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        self.abandon(renewer, &session);
                        return Err(fail(format!(
                            "still held by another writer after {:?}",
                            started.elapsed()
                        )));
                    }
                    thread::sleep(self.options.retry_interval);
                }
                Err(e) => {
                    self.abandon(renewer, &session);
                    return Err(fail(e.to_string()));
                }
            }
        }

        debug!(group, session = %session, waited = ?started.elapsed(), "Lock acquired");
        Ok(LockGuard {
            kv: Arc::clone(&self.kv),
            key,
            session,
            renewer: Some(renewer),
        })
    }

    fn abandon(&self, renewer: Renewer, session: &str) {
        renewer.stop();
        if let Err(e) = self.kv.destroy_session(session) {
            warn!(session, error = %e, "Could not destroy session after failed lock attempt");
        }
    }
}

/// A held group lock. Dropping it releases the lock and ends its session.
pub struct LockGuard {
    kv: Arc<dyn KvBackend>,
    key: String,
    session: String,
    renewer: Option<Renewer>,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn session(&self) -> &str {
        &self.session
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(renewer) = self.renewer.take() {
            renewer.stop();
        }
        match self.kv.release(&self.key, &self.session) {
            Ok(true) => debug!(key = %self.key, "Lock released"),
            Ok(false) => warn!(key = %self.key, "Lock was no longer held at release"),
            Err(e) => warn!(key = %self.key, error = %e, "Could not release lock"),
        }
        // The session TTL frees the lock if both calls failed.
        if let Err(e) = self.kv.destroy_session(&self.session) {
            warn!(session = %self.session, error = %e, "Could not destroy session");
        }
    }
}

/// Background session renewal at TTL/2
struct Renewer {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Renewer {
    fn start(kv: Arc<dyn KvBackend>, session: String, ttl: Duration) -> Self {
        let (stop, stopped) = channel::bounded::<()>(1);
        let interval = ttl / 2;
        let handle = thread::spawn(move || loop {
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => match kv.renew_session(&session) {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(session = %session, "Session expired before renewal");
                        return;
                    }
                    Err(e) => warn!(session = %session, error = %e, "Session renewal failed"),
                },
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        });
        Self { stop, handle }
    }

    fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            warn!("Session renewer panicked");
        }
    }
}
