//! idveil engine — per-process identity spoofing via identity-query
//! interception.
//!
//! A [`Spoofer`] is initialized for one target process, captures the
//! machine's real identifiers, and can then install interceptions that
//! make that process observe spoofed values until they are restored.
//! Every other process keeps seeing real identifiers throughout, and the
//! spoof stops being observable the moment the target dies.
//!
//! Controller operations are synchronous and not internally serialized —
//! the embedding layer must not call into one instance concurrently.
//! Interception handlers run on the target's threads at arbitrary times
//! between install and removal; they only ever clone snapshots out of the
//! bound [`SpoofContext`].

pub mod hooks;
pub mod identity;
pub mod liveness;
pub mod random;
pub mod store;
#[cfg(windows)]
pub mod windows;

#[cfg(test)]
mod test_utils;

pub use hooks::{
    HookEngine, HookError, HookManager, QueryHook, Resolution, SpoofContext,
    UnsupportedHookEngine,
};
pub use identity::{IdentitySource, SystemIdentitySource};
pub use liveness::{ProcessMonitor, SystemProcessMonitor};
pub use random::{generate_identifiers, generate_identifiers_with, SerialLengths};
pub use store::IdentifierStore;

use std::sync::Arc;

use log::{error, info, warn};

use idveil_protocol::{
    ApplyReport, CategoryOutcome, CategoryReport, IdentityCategory, OriginalIdentifiers,
    SpoofStatus, SpoofedIdentifiers,
};

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Initialized { pid: u32 },
    SpoofActive { pid: u32 },
}

/// Top-level spoofing controller; one instance drives one target process.
///
/// Public operations never panic and never abort the caller: failures are
/// logged and reported through return values.
pub struct Spoofer {
    state: State,
    ctx: Arc<SpoofContext>,
    hooks: HookManager,
    source: Arc<dyn IdentitySource>,
}

impl Spoofer {
    /// Controller over explicit collaborators.
    ///
    /// The hook engine, identity source, and liveness monitor are bound
    /// here; interception handlers receive their context through the
    /// install transaction rather than through any process-wide state, so
    /// independent controller instances can coexist.
    pub fn new(
        engine: Arc<dyn HookEngine>,
        source: Arc<dyn IdentitySource>,
        monitor: Arc<dyn ProcessMonitor>,
    ) -> Self {
        Self {
            state: State::Uninitialized,
            ctx: Arc::new(SpoofContext::new(monitor)),
            hooks: HookManager::new(engine),
            source,
        }
    }

    /// Controller wired to the running system.
    ///
    /// On non-Windows builds the interception backend reports the identity
    /// entry points as unavailable, so `apply_spoofing` fails cleanly.
    pub fn native() -> Self {
        #[cfg(windows)]
        let engine: Arc<dyn HookEngine> = Arc::new(windows::WinHookEngine::new());
        #[cfg(not(windows))]
        let engine: Arc<dyn HookEngine> = Arc::new(UnsupportedHookEngine);

        Self::new(
            engine,
            Arc::new(SystemIdentitySource),
            Arc::new(SystemProcessMonitor),
        )
    }

    /// Bind the controller to a target process, capturing the machine's
    /// original identifiers on the first transition for that pid.
    ///
    /// Re-initializing with the same pid is a no-op success, even while a
    /// spoof is active. Switching to a different pid is allowed while
    /// merely initialized (the originals are re-captured) and rejected
    /// while a spoof for another pid is live — callers must restore or
    /// clean up first.
    pub fn initialize_for_process(&mut self, pid: u32) -> bool {
        match self.state {
            State::SpoofActive { pid: current } if current != pid => {
                warn!(
                    "refusing to re-initialize for pid {pid} while a spoof for pid {current} is active"
                );
                false
            }
            State::SpoofActive { .. } => true,
            State::Initialized { pid: current } if current == pid => true,
            State::Uninitialized | State::Initialized { .. } => {
                let original = self.source.capture();
                self.ctx.store().set_original(original);
                self.state = State::Initialized { pid };
                info!("initialized for pid {pid}");
                true
            }
        }
    }

    /// Stage `identifiers` for the target and install the interceptions.
    ///
    /// Fails with no state change when the controller is uninitialized;
    /// fails with the staged set marked inactive when installation does
    /// not commit. On success the report accounts for every category:
    /// empty fields are skipped, volume serial and MAC are rewritten by
    /// the installed interceptions, and the categories with no effective
    /// rewrite at this layer report [`CategoryOutcome::Unsupported`].
    pub fn apply_spoofing(&mut self, identifiers: SpoofedIdentifiers) -> ApplyReport {
        let pid = match self.state {
            State::Uninitialized => {
                warn!("apply_spoofing called before initialize_for_process");
                return ApplyReport::failure();
            }
            State::Initialized { pid } | State::SpoofActive { pid } => pid,
        };

        let mut staged = identifiers;
        staged.owner_pid = pid;
        staged.active = true;
        self.ctx.store().set_spoofed(staged.clone());

        if let Err(e) = self.hooks.install(&self.ctx) {
            error!("interception install failed: {e}");
            self.ctx.store().deactivate_spoofed();
            return ApplyReport::failure();
        }

        let mut categories = Vec::with_capacity(IdentityCategory::ALL.len());
        for category in IdentityCategory::ALL {
            let outcome = match staged.value(category) {
                None => CategoryOutcome::Skipped,
                Some(_) => self.apply_category(category),
            };
            categories.push(CategoryReport { category, outcome });
        }

        self.state = State::SpoofActive { pid };
        info!("spoofing active for pid {pid}");
        ApplyReport {
            success: true,
            categories,
        }
    }

    /// Per-category application once the interceptions are installed.
    fn apply_category(&self, category: IdentityCategory) -> CategoryOutcome {
        match category {
            IdentityCategory::MacAddress => {
                if self.can_safe_mac_spoof() {
                    CategoryOutcome::Applied
                } else {
                    // Policy gate: leave the address alone rather than
                    // disturb live connections.
                    CategoryOutcome::Skipped
                }
            }
            IdentityCategory::VolumeSerial => CategoryOutcome::Applied,
            IdentityCategory::DiskSerial
            | IdentityCategory::GpuId
            | IdentityCategory::BiosSerial
            | IdentityCategory::MotherboardSerial => {
                warn!(
                    "{} spoofing has no effective rewrite at this layer; reporting unsupported",
                    category.as_str()
                );
                CategoryOutcome::Unsupported
            }
        }
    }

    /// Remove the interceptions and mark the spoof set inactive.
    ///
    /// A no-op success when initialized with nothing applied; fails (and
    /// stays active) if removal does not commit, since the redirections
    /// would still be live.
    pub fn restore_original_values(&mut self) -> bool {
        match self.state {
            State::Uninitialized => {
                warn!("restore_original_values called before initialize_for_process");
                false
            }
            State::Initialized { .. } => true,
            State::SpoofActive { pid } => {
                if let Err(e) = self.hooks.remove() {
                    error!("interception removal failed: {e}");
                    return false;
                }
                self.ctx.store().deactivate_spoofed();
                self.state = State::Initialized { pid };
                info!("original identifiers restored for pid {pid}");
                true
            }
        }
    }

    /// Restore, then discard all captured state. Always reports success.
    ///
    /// Removal is best-effort here: even if it fails, the store is
    /// cleared, which blinds any remaining handler into passing real
    /// values through.
    pub fn cleanup(&mut self) -> bool {
        if matches!(self.state, State::SpoofActive { .. }) {
            if let Err(e) = self.hooks.remove() {
                error!("interception removal failed during cleanup: {e}");
            }
        }
        self.ctx.store().clear();
        self.state = State::Uninitialized;
        true
    }

    /// True while a spoof set is installed and its owner process is still
    /// alive. Liveness is evaluated on every call, never cached.
    pub fn is_spoofing_active(&self) -> bool {
        match self.state {
            State::SpoofActive { pid } => self.ctx.process_alive(pid),
            _ => false,
        }
    }

    /// Current status for the host: whether spoofing is observable, plus
    /// the applied identifiers while it is.
    pub fn status(&self) -> SpoofStatus {
        let active = self.is_spoofing_active();
        SpoofStatus {
            active,
            identifiers: if active {
                self.ctx.store().spoofed_snapshot()
            } else {
                None
            },
        }
    }

    /// The original identifiers captured at initialize time, if any.
    pub fn original_identifiers(&self) -> Option<OriginalIdentifiers> {
        self.ctx.store().original()
    }

    /// Whether rewriting the hardware address is considered safe.
    ///
    /// Deliberately an always-allow policy: no connection-activity
    /// detection runs before the address rewrite.
    pub fn can_safe_mac_spoof(&self) -> bool {
        true
    }
}
