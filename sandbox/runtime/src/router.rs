//! Routing from process identifiers to live processes.
//!
//! [`Router`] is the only thing a dispatcher needs from process lifecycle
//! management. [`Registry`] is the in-memory implementation: an explicit
//! value created once at startup and shared by reference, never a global.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use ww_wire::{Pid, PidError};

use crate::error::{Result, RuntimeError};
use crate::process::Process;

/// Routing failures.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The address does not parse as a Pid.
    #[error("invalid pid: {0}")]
    InvalidPid(#[from] PidError),

    /// No live process has this Pid.
    #[error("process not found: {0}")]
    NotFound(Pid),

    /// The router could not answer.
    #[error("router unavailable: {0}")]
    Unavailable(String),
}

/// Lookup from a process address to a live process.
pub trait Router: Send + Sync {
    /// Resolve `pid` (string form) to a process.
    fn get_proc(&self, pid: &str) -> std::result::Result<Arc<Process>, RouteError>;
}

impl<R: Router + ?Sized> Router for Arc<R> {
    fn get_proc(&self, pid: &str) -> std::result::Result<Arc<Process>, RouteError> {
        (**self).get_proc(pid)
    }
}

/// Configuration for a [`Registry`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of live processes.
    pub max_procs: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_procs: 1024 }
    }
}

/// Table of live processes keyed by Pid.
///
/// Lookups take a shard read lock only, so workers resolving calls do not
/// contend with each other.
#[derive(Debug)]
pub struct Registry {
    config: RegistryConfig,
    procs: DashMap<Pid, Arc<Process>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            procs: DashMap::new(),
        }
    }

    /// Instantiate `bytecode` under a fresh Pid and register it.
    pub fn spawn(&self, bytecode: impl AsRef<[u8]>) -> Result<Arc<Process>> {
        self.check_capacity()?;
        let process = Arc::new(Process::new(Pid::new(), bytecode)?);
        self.insert(Arc::clone(&process))?;
        Ok(process)
    }

    /// Register an existing process.
    pub fn insert(&self, process: Arc<Process>) -> Result<()> {
        self.check_capacity()?;
        let pid = process.pid();
        match self.procs.entry(pid) {
            Entry::Occupied(_) => Err(RuntimeError::AlreadyRegistered(pid)),
            Entry::Vacant(slot) => {
                slot.insert(process);
                debug!(%pid, "process registered");
                Ok(())
            }
        }
    }

    /// Unregister a process. In-flight calls keep their handle.
    pub fn remove(&self, pid: &Pid) -> Option<Arc<Process>> {
        let removed = self.procs.remove(pid).map(|(_, process)| process);
        if removed.is_some() {
            debug!(%pid, "process removed");
        }
        removed
    }

    /// Look up a process.
    pub fn get(&self, pid: &Pid) -> Option<Arc<Process>> {
        self.procs.get(pid).map(|entry| Arc::clone(entry.value()))
    }

    /// All registered Pids.
    pub fn pids(&self) -> Vec<Pid> {
        self.procs.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of registered processes.
    pub fn len(&self) -> usize {
        self.procs.len()
    }

    /// True if no processes are registered.
    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    fn check_capacity(&self) -> Result<()> {
        if self.procs.len() >= self.config.max_procs {
            return Err(RuntimeError::Capacity(self.config.max_procs));
        }
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl Router for Registry {
    fn get_proc(&self, pid: &str) -> std::result::Result<Arc<Process>, RouteError> {
        let pid = Pid::parse(pid)?;
        self.get(&pid).ok_or(RouteError::NotFound(pid))
    }
}
