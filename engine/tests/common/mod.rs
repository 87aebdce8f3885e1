//! Fake-system harness for the integration suite.
//!
//! `FakeSystem` stands in for the operating system: it carries the "real"
//! identifier values, implements the transactional hook backend, and lets
//! tests issue the identity queries the way the target process would —
//! real value first, then the engine's published rewrite rules whenever
//! the corresponding redirection is installed and a context is bound.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use idveil_engine::hooks::{overwrite_hardware_address, spoofed_volume_serial};
use idveil_engine::{
    HookEngine, HookError, IdentitySource, ProcessMonitor, QueryHook, Resolution, SpoofContext,
    Spoofer,
};
use idveil_protocol::OriginalIdentifiers;

pub const TARGET_PID: u32 = 4242;

pub const REAL_VOLUME_SERIAL: u32 = 0x1A2B_3C4D;
pub const REAL_MAC: [u8; 6] = [0x52, 0x54, 0x00, 0x12, 0x34, 0x56];

/// One record of the fake adapter enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeAdapter {
    pub address: [u8; 8],
    pub address_len: u32,
}

impl FakeAdapter {
    pub fn new(bytes: [u8; 6]) -> Self {
        let mut address = [0u8; 8];
        address[..6].copy_from_slice(&bytes);
        Self {
            address,
            address_len: 6,
        }
    }

    pub fn with_len(bytes: [u8; 6], address_len: u32) -> Self {
        let mut adapter = Self::new(bytes);
        adapter.address_len = address_len;
        adapter
    }
}

enum Staged {
    Attach(QueryHook, Arc<SpoofContext>),
    Detach(QueryHook),
}

#[derive(Default)]
struct HookState {
    staged: Vec<Staged>,
    installed: Vec<QueryHook>,
    bound: Option<Arc<SpoofContext>>,
}

/// A stand-in operating system.
pub struct FakeSystem {
    pub real_volume_serial: u32,
    pub real_adapters: Vec<FakeAdapter>,
    hooks: Mutex<HookState>,
    fail_commit: AtomicBool,
    adapter_module_absent: AtomicBool,
    volume_entry_missing: AtomicBool,
}

impl FakeSystem {
    pub fn new() -> Self {
        Self::with_adapters(vec![
            FakeAdapter::new(REAL_MAC),
            FakeAdapter::new([0xDE, 0xAD, 0x00, 0xBE, 0xEF, 0x01]),
        ])
    }

    pub fn with_adapters(real_adapters: Vec<FakeAdapter>) -> Self {
        Self {
            real_volume_serial: REAL_VOLUME_SERIAL,
            real_adapters,
            hooks: Mutex::new(HookState::default()),
            fail_commit: AtomicBool::new(false),
            adapter_module_absent: AtomicBool::new(false),
            volume_entry_missing: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, HookState> {
        self.hooks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_next_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    pub fn set_adapter_module_absent(&self) {
        self.adapter_module_absent.store(true, Ordering::SeqCst);
    }

    pub fn set_volume_entry_missing(&self) {
        self.volume_entry_missing.store(true, Ordering::SeqCst);
    }

    pub fn installed_hooks(&self) -> Vec<QueryHook> {
        self.state().installed.clone()
    }

    /// What a volume-information query issued inside the target would
    /// report for the serial out-parameter.
    pub fn query_volume_serial(&self) -> u32 {
        let mut serial = self.real_volume_serial;
        let state = self.state();
        if state.installed.contains(&QueryHook::VolumeInformation) {
            if let Some(ctx) = &state.bound {
                if let Some(snapshot) = ctx.observable_snapshot() {
                    if let Some(spoofed) = spoofed_volume_serial(&snapshot) {
                        serial = spoofed;
                    }
                }
            }
        }
        serial
    }

    /// What an adapter-enumeration query issued inside the target would
    /// return.
    pub fn query_adapters(&self) -> Vec<FakeAdapter> {
        let mut records = self.real_adapters.clone();
        let state = self.state();
        if state.installed.contains(&QueryHook::AdapterEnumeration) {
            if let Some(ctx) = &state.bound {
                if let Some(snapshot) = ctx.observable_snapshot() {
                    if !snapshot.mac_address.is_empty() {
                        for record in &mut records {
                            overwrite_hardware_address(
                                &mut record.address,
                                record.address_len as usize,
                                &snapshot.mac_address,
                            );
                        }
                    }
                }
            }
        }
        records
    }
}

impl HookEngine for FakeSystem {
    fn resolve(&self, hook: QueryHook) -> Resolution {
        match hook {
            QueryHook::VolumeInformation => {
                if self.volume_entry_missing.load(Ordering::SeqCst) {
                    Resolution::EntryPointMissing
                } else {
                    Resolution::Resolved
                }
            }
            QueryHook::AdapterEnumeration => {
                if self.adapter_module_absent.load(Ordering::SeqCst) {
                    Resolution::ModuleAbsent
                } else {
                    Resolution::Resolved
                }
            }
        }
    }

    fn begin_transaction(&self) {
        self.state().staged.clear();
    }

    fn attach(&self, hook: QueryHook, ctx: &Arc<SpoofContext>) -> Result<(), HookError> {
        self.state().staged.push(Staged::Attach(hook, ctx.clone()));
        Ok(())
    }

    fn detach(&self, hook: QueryHook) -> Result<(), HookError> {
        self.state().staged.push(Staged::Detach(hook));
        Ok(())
    }

    fn commit(&self) -> Result<(), HookError> {
        let mut state = self.state();
        let staged = std::mem::take(&mut state.staged);
        if self.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(HookError::CommitFailed("injected failure".to_string()));
        }
        for op in staged {
            match op {
                Staged::Attach(hook, ctx) => {
                    state.installed.push(hook);
                    state.bound = Some(ctx);
                }
                Staged::Detach(hook) => {
                    state.installed.retain(|&installed| installed != hook);
                }
            }
        }
        if state.installed.is_empty() {
            state.bound = None;
        }
        Ok(())
    }

    fn abort(&self) {
        self.state().staged.clear();
    }
}

impl IdentitySource for FakeSystem {
    fn capture(&self) -> OriginalIdentifiers {
        let mac_address = self
            .real_adapters
            .iter()
            .find(|adapter| adapter.address_len == 6)
            .map(|adapter| {
                adapter.address[..6]
                    .iter()
                    .map(|byte| format!("{byte:02X}"))
                    .collect::<Vec<_>>()
                    .join(":")
            })
            .unwrap_or_else(|| "00:00:00:00:00:00".to_string());

        OriginalIdentifiers {
            mac_address,
            volume_serial: format!("{:X}", self.real_volume_serial),
            ..Default::default()
        }
    }
}

/// Scriptable process table.
pub struct FakePidTable {
    alive: Mutex<HashSet<u32>>,
}

impl FakePidTable {
    pub fn with(pid: u32) -> Self {
        Self {
            alive: Mutex::new(HashSet::from([pid])),
        }
    }

    pub fn terminate(&self, pid: u32) {
        self.alive
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&pid);
    }
}

impl ProcessMonitor for FakePidTable {
    fn is_alive(&self, pid: u32) -> bool {
        self.alive
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&pid)
    }
}

pub struct Harness {
    pub system: Arc<FakeSystem>,
    pub pids: Arc<FakePidTable>,
    pub spoofer: Spoofer,
}

pub fn harness() -> Harness {
    harness_with(FakeSystem::new())
}

pub fn harness_with(system: FakeSystem) -> Harness {
    let _ = env_logger::try_init();
    let system = Arc::new(system);
    let pids = Arc::new(FakePidTable::with(TARGET_PID));
    let spoofer = Spoofer::new(system.clone(), system.clone(), pids.clone());
    Harness {
        system,
        pids,
        spoofer,
    }
}
