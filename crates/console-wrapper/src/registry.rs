//! Process-wide registry of live wrapped children
//!
//! Replaces implicit host-runtime exit hooks with an explicit singleton:
//! `execute` registers every child here and termination deregisters it. A
//! host that wants crash/exit protection calls
//! [`global()`](global)`.terminate_all()` from its own shutdown or signal
//! handling, which force-kills every child still registered at that moment.
//!
//! The singleton is initialized lazily on first use and lives for the
//! lifetime of the host process; there is nothing to tear down beyond
//! calling `terminate_all` once on the way out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Identifier handed back by [`WrapperRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

/// Registry of children that are still executing
#[derive(Debug, Default)]
pub struct WrapperRegistry {
    children: Mutex<HashMap<u64, u32>>,
    next_id: AtomicU64,
}

static GLOBAL: OnceLock<WrapperRegistry> = OnceLock::new();

/// The process-wide registry of live wrapped children
pub fn global() -> &'static WrapperRegistry {
    GLOBAL.get_or_init(WrapperRegistry::new)
}

impl WrapperRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live child; the id deregisters it later
    pub fn register(&self, pid: u32) -> RegistrationId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, pid);
        debug!(pid, "registered wrapped child");
        RegistrationId(id)
    }

    /// Remove a child that has terminated or been handed off
    pub fn deregister(&self, id: RegistrationId) {
        self.children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id.0);
    }

    /// Pids of every child currently registered
    pub fn live_pids(&self) -> Vec<u32> {
        self.children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .copied()
            .collect()
    }

    /// Force-terminate every registered child
    ///
    /// Intended for a single top-level exit handler. Children that are
    /// already gone are logged and skipped.
    pub fn terminate_all(&self) {
        let children: Vec<(u64, u32)> = self
            .children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();

        for (_, pid) in children {
            match force_kill(pid) {
                Ok(()) => debug!(pid, "terminated child at shutdown"),
                Err(e) => warn!(pid, error = %e, "failed to terminate child at shutdown"),
            }
        }
    }
}

/// Send an unconditional kill to a pid
#[cfg(unix)]
pub(crate) fn force_kill(pid: u32) -> Result<()> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL)
        .map_err(|e| Error::signal_failed(9, e.to_string()))
}

/// Send an unconditional kill to a pid
#[cfg(not(unix))]
pub(crate) fn force_kill(pid: u32) -> Result<()> {
    let _ = pid;
    Err(Error::signal_failed(
        -1,
        "pid-based kill is not supported on this platform",
    ))
}
