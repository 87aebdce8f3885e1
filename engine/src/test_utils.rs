//! Shared fakes for the engine's unit tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use idveil_protocol::OriginalIdentifiers;

use crate::hooks::{HookEngine, HookError, QueryHook, Resolution, SpoofContext};
use crate::identity::IdentitySource;
use crate::liveness::ProcessMonitor;

/// Scriptable process table.
pub struct PidTable {
    alive: Mutex<HashSet<u32>>,
}

impl PidTable {
    pub fn with(pids: &[u32]) -> Self {
        Self {
            alive: Mutex::new(pids.iter().copied().collect()),
        }
    }

    /// Simulate the process dying.
    pub fn terminate(&self, pid: u32) {
        self.alive.lock().unwrap_or_else(|e| e.into_inner()).remove(&pid);
    }
}

impl ProcessMonitor for PidTable {
    fn is_alive(&self, pid: u32) -> bool {
        self.alive
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&pid)
    }
}

/// Identity source returning a fixed capture.
pub struct StaticSource(pub OriginalIdentifiers);

impl IdentitySource for StaticSource {
    fn capture(&self) -> OriginalIdentifiers {
        self.0.clone()
    }
}

#[derive(Default)]
struct EngineState {
    staged_attach: Vec<QueryHook>,
    staged_detach: Vec<QueryHook>,
    committed: Vec<QueryHook>,
    bound: Option<Arc<SpoofContext>>,
    volume: Option<Resolution>,
    adapters: Option<Resolution>,
    rejected: Vec<QueryHook>,
    fail_commit: bool,
    transactions: usize,
    aborts: usize,
}

/// Hook engine that records transactions; resolution, attach, and commit
/// outcomes are scriptable per test.
#[derive(Default)]
pub struct RecordingEngine {
    state: Mutex<EngineState>,
}

impl RecordingEngine {
    pub fn resolving_all() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_volume_resolution(&self, resolution: Resolution) {
        self.state().volume = Some(resolution);
    }

    pub fn set_adapter_resolution(&self, resolution: Resolution) {
        self.state().adapters = Some(resolution);
    }

    pub fn reject_attach(&self, hook: QueryHook) {
        self.state().rejected.push(hook);
    }

    pub fn fail_next_commit(&self) {
        self.state().fail_commit = true;
    }

    pub fn committed(&self) -> Vec<QueryHook> {
        self.state().committed.clone()
    }

    pub fn bound_context(&self) -> Option<Arc<SpoofContext>> {
        self.state().bound.clone()
    }

    pub fn transactions(&self) -> usize {
        self.state().transactions
    }

    pub fn aborts(&self) -> usize {
        self.state().aborts
    }
}

impl HookEngine for RecordingEngine {
    fn resolve(&self, hook: QueryHook) -> Resolution {
        let state = self.state();
        match hook {
            QueryHook::VolumeInformation => state.volume.unwrap_or(Resolution::Resolved),
            QueryHook::AdapterEnumeration => state.adapters.unwrap_or(Resolution::Resolved),
        }
    }

    fn begin_transaction(&self) {
        let mut state = self.state();
        state.staged_attach.clear();
        state.staged_detach.clear();
        state.transactions += 1;
    }

    fn attach(&self, hook: QueryHook, ctx: &Arc<SpoofContext>) -> Result<(), HookError> {
        let mut state = self.state();
        if state.rejected.contains(&hook) {
            return Err(HookError::AttachRejected {
                hook: hook.as_str(),
                reason: "scripted rejection".to_string(),
            });
        }
        state.staged_attach.push(hook);
        state.bound = Some(ctx.clone());
        Ok(())
    }

    fn detach(&self, hook: QueryHook) -> Result<(), HookError> {
        self.state().staged_detach.push(hook);
        Ok(())
    }

    fn commit(&self) -> Result<(), HookError> {
        let mut state = self.state();
        if state.fail_commit {
            state.fail_commit = false;
            state.staged_attach.clear();
            state.staged_detach.clear();
            state.bound = None;
            return Err(HookError::CommitFailed("scripted failure".to_string()));
        }
        let attached = std::mem::take(&mut state.staged_attach);
        state.committed.extend(attached);
        for hook in std::mem::take(&mut state.staged_detach) {
            state.committed.retain(|&h| h != hook);
        }
        if state.committed.is_empty() {
            state.bound = None;
        }
        Ok(())
    }

    fn abort(&self) {
        let mut state = self.state();
        state.staged_attach.clear();
        state.staged_detach.clear();
        state.aborts += 1;
    }
}
