//! Identity-query interception management.
//!
//! [`HookManager`] installs and removes the two identity-query
//! redirections as single all-or-nothing transactions over a
//! [`HookEngine`] backend. The redirection handlers never reach for a
//! process-wide controller: each install binds an [`Arc<SpoofContext>`]
//! into the handler, and every read goes through a snapshot.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};
use thiserror::Error;

use idveil_protocol::SpoofedIdentifiers;

use crate::liveness::ProcessMonitor;
use crate::store::IdentifierStore;

/// The two identity queries subject to redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryHook {
    /// Volume-information query (serial number out-parameter). Mandatory:
    /// installation fails if it cannot be resolved.
    VolumeInformation,
    /// Adapter-enumeration query (hardware address records). Optional:
    /// skipped when its owning module is not loaded.
    AdapterEnumeration,
}

impl QueryHook {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryHook::VolumeInformation => "volume information",
            QueryHook::AdapterEnumeration => "adapter enumeration",
        }
    }
}

/// Outcome of resolving a hook's real entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved,
    /// The owning module is not loaded in this process.
    ModuleAbsent,
    /// The module is loaded but the entry point is missing from it.
    EntryPointMissing,
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("{0} entry point could not be resolved")]
    EntryPointMissing(&'static str),

    #[error("module owning the {0} entry point is not loaded")]
    ModuleAbsent(&'static str),

    #[error("backend rejected attach of the {hook} redirection: {reason}")]
    AttachRejected { hook: &'static str, reason: String },

    #[error("redirection transaction failed to commit: {0}")]
    CommitFailed(String),

    #[error("interception is not supported on this platform")]
    Unsupported,
}

/// Transactional attach/detach capability for redirecting named entry
/// points to spoofing handlers.
///
/// `commit` applies everything staged since `begin_transaction`, or
/// nothing: a failed commit leaves the process-wide redirection table
/// untouched. That table is the one truly shared mutable resource in the
/// engine, and install/remove transactions are its only writers.
pub trait HookEngine: Send + Sync {
    /// Locate the real entry point for `hook`.
    fn resolve(&self, hook: QueryHook) -> Resolution;

    /// Open a transaction, discarding any previously staged work.
    fn begin_transaction(&self);

    /// Stage redirection of `hook` to its spoofing handler, bound to `ctx`.
    fn attach(&self, hook: QueryHook, ctx: &Arc<SpoofContext>) -> Result<(), HookError>;

    /// Stage removal of a previously committed redirection.
    fn detach(&self, hook: QueryHook) -> Result<(), HookError>;

    /// Apply the staged operations together, or roll everything back.
    fn commit(&self) -> Result<(), HookError>;

    /// Discard staged work without touching the redirection table.
    fn abort(&self);
}

/// Backend for platforms without an interception implementation.
///
/// Resolution always fails, so installation never proceeds and apply
/// calls fail cleanly instead of pretending to spoof.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedHookEngine;

impl HookEngine for UnsupportedHookEngine {
    fn resolve(&self, _hook: QueryHook) -> Resolution {
        Resolution::ModuleAbsent
    }

    fn begin_transaction(&self) {}

    fn attach(&self, _hook: QueryHook, _ctx: &Arc<SpoofContext>) -> Result<(), HookError> {
        Err(HookError::Unsupported)
    }

    fn detach(&self, _hook: QueryHook) -> Result<(), HookError> {
        Err(HookError::Unsupported)
    }

    fn commit(&self) -> Result<(), HookError> {
        Ok(())
    }

    fn abort(&self) {}
}

/// State shared between the controller and the interception handlers.
///
/// Handlers run on whatever target thread triggers an intercepted query,
/// concurrently with the controller and each other; everything they need
/// is behind the store's snapshot contract.
pub struct SpoofContext {
    store: IdentifierStore,
    monitor: Arc<dyn ProcessMonitor>,
}

impl SpoofContext {
    pub(crate) fn new(monitor: Arc<dyn ProcessMonitor>) -> Self {
        Self {
            store: IdentifierStore::new(),
            monitor,
        }
    }

    pub(crate) fn store(&self) -> &IdentifierStore {
        &self.store
    }

    pub(crate) fn process_alive(&self, pid: u32) -> bool {
        self.monitor.is_alive(pid)
    }

    /// Snapshot of the current spoof set, but only while it is observable:
    /// staged, still active, and its owner process still alive. Liveness is
    /// evaluated here, at read time — a dead owner silently turns every
    /// interception into a pass-through.
    pub fn observable_snapshot(&self) -> Option<SpoofedIdentifiers> {
        let snapshot = self.store.spoofed_snapshot()?;
        if !snapshot.active {
            return None;
        }
        if !self.monitor.is_alive(snapshot.owner_pid) {
            return None;
        }
        Some(snapshot)
    }
}

// ============================================================================
// Handler rewrite rules
// ============================================================================
// Backends invoke the real query first and let it populate all
// out-parameters, then post-process with these rules. Real error codes are
// passed through untouched.

/// The snapshot's volume serial parsed as base-16.
///
/// `None` when the snapshot carries no volume serial or the value is not
/// valid hex — the caller keeps the real serial in that case, and the
/// parse failure is never surfaced to the intercepted caller.
pub fn spoofed_volume_serial(snapshot: &SpoofedIdentifiers) -> Option<u32> {
    if snapshot.volume_serial.is_empty() {
        return None;
    }
    match u32::from_str_radix(&snapshot.volume_serial, 16) {
        Ok(value) => Some(value),
        Err(_) => {
            debug!(
                "spoof volume serial {:?} is not valid hex; keeping real value",
                snapshot.volume_serial
            );
            None
        }
    }
}

/// Overwrite one adapter record's hardware address in place.
///
/// At most the first six bytes change, bounded by the record's reported
/// address length. The spoof string decodes two hex characters per byte;
/// the first byte that fails to decode stops the overwrite for this
/// record, leaving its remaining bytes at their real values.
pub fn overwrite_hardware_address(address: &mut [u8], reported_len: usize, mac: &str) {
    let count = reported_len.min(6).min(address.len());
    for i in 0..count {
        let byte = mac
            .get(i * 2..i * 2 + 2)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok());
        match byte {
            Some(value) => address[i] = value,
            None => break,
        }
    }
}

/// Installs and removes the identity-query redirections.
pub struct HookManager {
    engine: Arc<dyn HookEngine>,
    installed: Mutex<Vec<QueryHook>>,
}

impl HookManager {
    pub fn new(engine: Arc<dyn HookEngine>) -> Self {
        Self {
            engine,
            installed: Mutex::new(Vec::new()),
        }
    }

    fn installed(&self) -> MutexGuard<'_, Vec<QueryHook>> {
        self.installed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install the redirections as one transaction.
    ///
    /// The volume-information entry point must resolve; the
    /// adapter-enumeration redirection is skipped with a warning when it
    /// cannot. Installing while already installed is a no-op success.
    pub fn install(&self, ctx: &Arc<SpoofContext>) -> Result<(), HookError> {
        let mut installed = self.installed();
        if !installed.is_empty() {
            return Ok(());
        }

        let mut selected = Vec::new();
        match self.engine.resolve(QueryHook::VolumeInformation) {
            Resolution::Resolved => selected.push(QueryHook::VolumeInformation),
            Resolution::ModuleAbsent => {
                return Err(HookError::ModuleAbsent(
                    QueryHook::VolumeInformation.as_str(),
                ))
            }
            Resolution::EntryPointMissing => {
                return Err(HookError::EntryPointMissing(
                    QueryHook::VolumeInformation.as_str(),
                ))
            }
        }
        match self.engine.resolve(QueryHook::AdapterEnumeration) {
            Resolution::Resolved => selected.push(QueryHook::AdapterEnumeration),
            Resolution::ModuleAbsent => {
                warn!("adapter enumeration module not loaded; skipping its interception");
            }
            Resolution::EntryPointMissing => {
                warn!("adapter enumeration entry point missing; skipping its interception");
            }
        }

        self.engine.begin_transaction();
        for &hook in &selected {
            if let Err(e) = self.engine.attach(hook, ctx) {
                self.engine.abort();
                return Err(e);
            }
        }
        self.engine.commit()?;

        debug!("installed {} interception(s)", selected.len());
        *installed = selected;
        Ok(())
    }

    /// Remove whatever is installed, as one transaction.
    ///
    /// A no-op success when nothing is installed.
    pub fn remove(&self) -> Result<(), HookError> {
        let mut installed = self.installed();
        if installed.is_empty() {
            return Ok(());
        }

        self.engine.begin_transaction();
        for &hook in installed.iter() {
            if let Err(e) = self.engine.detach(hook) {
                self.engine.abort();
                return Err(e);
            }
        }
        self.engine.commit()?;

        debug!("removed {} interception(s)", installed.len());
        installed.clear();
        Ok(())
    }

    pub fn is_installed(&self) -> bool {
        !self.installed().is_empty()
    }
}
