use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct ShutdownState {
    requested: Mutex<bool>,
    signal: Condvar,
}

/// Trips the run-wide interrupt flag.
///
/// Once tripped the flag stays set for the rest of the process. Jobs that are already running are
/// never cancelled by it, the scheduler only uses it to stop launching new work.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    state: Arc<ShutdownState>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdown(&self) {
        let mut requested = self.state.requested.lock();
        if *requested {
            log::debug!("Shutdown was already requested");
            return;
        }

        *requested = true;
        self.state.signal.notify_all();
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener {
            state: self.state.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    state: Arc<ShutdownState>,
}

impl DelegatedShutdownListener {
    /// Point in time check if the shutdown signal has been received.
    ///
    /// Unlike a channel receiver this does not consume the signal, every listener observes it and
    /// keeps observing it on later calls.
    pub fn should_shutdown(&self) -> bool {
        *self.state.requested.lock()
    }

    /// Block the current thread for up to `timeout`, returning early if shutdown is requested.
    ///
    /// Returns `true` if shutdown has been requested.
    pub fn wait_for_shutdown(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut requested = self.state.requested.lock();
        while !*requested {
            if self.state.signal.wait_until(&mut requested, deadline).timed_out() {
                break;
            }
        }
        *requested
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "Regression run interrupted by shutdown signal".to_string(),
        }
    }
}
