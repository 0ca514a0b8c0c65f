//! Shutdown gate with in-flight operation tracking.
//!
//! Every store operation holds an [`OpGuard`] while it runs. Closing the
//! gate rejects new operations and blocks until the running ones finish.

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, SdError};

#[derive(Debug, Default)]
struct GateState {
    closed: bool,
    in_flight: usize,
}

/// Admission control for store operations
#[derive(Debug, Default)]
pub struct DrainGate {
    state: Mutex<GateState>,
    drained: Condvar,
}

impl DrainGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit one operation, or fail with [`SdError::Closed`] after shutdown.
    pub fn enter(&self) -> Result<OpGuard<'_>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SdError::Closed);
        }
        state.in_flight += 1;
        Ok(OpGuard { gate: self })
    }

    /// Stop admitting operations and wait for in-flight ones to finish.
    ///
    /// Fails with [`SdError::Closed`] if the gate was already closed, so the
    /// caller's teardown runs exactly once.
    pub fn close_and_drain(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SdError::Closed);
        }
        state.closed = true;
        while state.in_flight > 0 {
            self.drained.wait(&mut state);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }
}

/// RAII guard for one admitted operation; released on drop, including
/// during unwinding.
#[derive(Debug)]
pub struct OpGuard<'a> {
    gate: &'a DrainGate,
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.gate.drained.notify_all();
        }
    }
}
