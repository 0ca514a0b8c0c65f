//! In-memory coordination backend
//!
//! Implements the KV and session semantics the distributed engine relies on,
//! including session TTL expiry, inside one process. Several engines sharing
//! one `Arc<MemoryKv>` behave like cooperating instances sharing a cluster.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use parking_lot::Mutex;

use super::{KvBackend, SessionBehavior, SessionSpec};
use crate::error::{Result, SdError};

#[derive(Debug)]
struct KvEntry {
    value: Vec<u8>,
    session: Option<String>,
}

#[derive(Debug)]
struct Session {
    spec: SessionSpec,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    kv: BTreeMap<String, KvEntry>,
    sessions: HashMap<String, Session>,
    next_session: u64,
    unavailable: bool,
}

impl State {
    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(SdError::Http("coordination service unavailable".into()));
        }
        Ok(())
    }

    /// Invalidate sessions whose TTL has lapsed
    fn reap(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.invalidate(&id);
        }
    }

    fn invalidate(&mut self, id: &str) {
        let Some(session) = self.sessions.remove(id) else {
            return;
        };
        match session.spec.behavior {
            SessionBehavior::Release => {
                for entry in self.kv.values_mut() {
                    if entry.session.as_deref() == Some(id) {
                        entry.session = None;
                    }
                }
            }
            SessionBehavior::Delete => {
                self.kv.retain(|_, e| e.session.as_deref() != Some(id));
            }
        }
    }
}

/// In-process [`KvBackend`]
#[derive(Debug, Default)]
pub struct MemoryKv {
    state: Mutex<State>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the service were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Invalidate a session now, as if its TTL had lapsed
    pub fn expire_session(&self, id: &str) {
        self.state.lock().invalidate(id);
    }

    /// Live sessions
    pub fn session_count(&self) -> usize {
        let mut state = self.state.lock();
        state.reap();
        state.sessions.len()
    }

    /// Session currently holding the lock on `key`
    pub fn lock_holder(&self, key: &str) -> Option<String> {
        let mut state = self.state.lock();
        state.reap();
        state.kv.get(key).and_then(|e| e.session.clone())
    }
}

impl KvBackend for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.reap();
        Ok(state.kv.get(key).map(|e| e.value.clone()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.reap();
        state
            .kv
            .entry(key.to_string())
            .and_modify(|e| e.value = value.to_vec())
            .or_insert_with(|| KvEntry {
                value: value.to_vec(),
                session: None,
            });
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.kv.remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.reap();
        Ok(state
            .kv
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn create_session(&self, spec: &SessionSpec) -> Result<String> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.next_session += 1;
        let id = format!("session-{}", state.next_session);
        state.sessions.insert(
            id.clone(),
            Session {
                spec: spec.clone(),
                expires_at: Instant::now() + spec.ttl,
            },
        );
        Ok(id)
    }

    fn renew_session(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.reap();
        match state.sessions.get_mut(id) {
            Some(session) => {
                session.expires_at = Instant::now() + session.spec.ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn destroy_session(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.invalidate(id);
        Ok(())
    }

    fn acquire(&self, key: &str, value: &[u8], session: &str) -> Result<bool> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.reap();
        if !state.sessions.contains_key(session) {
            return Err(SdError::Http(format!("invalid session {session:?}")));
        }
        match state.kv.get_mut(key) {
            Some(entry) => match entry.session.as_deref() {
                Some(holder) if holder != session => Ok(false),
                _ => {
                    entry.value = value.to_vec();
                    entry.session = Some(session.to_string());
                    Ok(true)
                }
            },
            None => {
                state.kv.insert(
                    key.to_string(),
                    KvEntry {
                        value: value.to_vec(),
                        session: Some(session.to_string()),
                    },
                );
                Ok(true)
            }
        }
    }

    fn release(&self, key: &str, session: &str) -> Result<bool> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.reap();
        match state.kv.get_mut(key) {
            Some(entry) if entry.session.as_deref() == Some(session) => {
                entry.session = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
