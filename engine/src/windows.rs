//! Windows interception backend and direct identity queries.
//!
//! Redirects `GetVolumeInformationA` (kernel32, mandatory) and
//! `GetAdaptersInfo` (iphlpapi, optional) through retour static detours.
//! Each handler calls the real entry point first, lets it populate every
//! out-parameter, and then post-processes with the rules in
//! [`crate::hooks`]; real error codes pass through untouched.
//!
//! The patched entry table is process-wide, so at most one spoof context
//! is bound at a time: the install transaction binds it, removal clears
//! it, and handlers only ever clone the `Arc` out before touching any
//! snapshot.

use std::ffi::CStr;
use std::sync::{Arc, Mutex, MutexGuard};

use log::warn;
use retour::static_detour;
use windows_sys::core::{PCSTR, PSTR};
use windows_sys::Win32::Foundation::{BOOL, ERROR_BUFFER_OVERFLOW, ERROR_SUCCESS};
use windows_sys::Win32::NetworkManagement::IpHelper::{GetAdaptersInfo, IP_ADAPTER_INFO};
use windows_sys::Win32::Storage::FileSystem::GetVolumeInformationA;
use windows_sys::Win32::System::LibraryLoader::{GetModuleHandleA, GetProcAddress};

use idveil_protocol::OriginalIdentifiers;

use crate::hooks::{
    overwrite_hardware_address, spoofed_volume_serial, HookEngine, HookError, QueryHook,
    Resolution, SpoofContext,
};

const VOLUME_MODULE: &CStr = c"kernel32.dll";
const VOLUME_SYMBOL: &CStr = c"GetVolumeInformationA";
const ADAPTERS_MODULE: &CStr = c"iphlpapi.dll";
const ADAPTERS_SYMBOL: &CStr = c"GetAdaptersInfo";

/// Root path whose volume serial stands in for "the volume serial".
const VOLUME_ROOT: &CStr = c"C:\\";

type VolumeInformationFn = unsafe extern "system" fn(
    PCSTR,
    PSTR,
    u32,
    *mut u32,
    *mut u32,
    *mut u32,
    PSTR,
    u32,
) -> BOOL;
type AdaptersInfoFn = unsafe extern "system" fn(*mut IP_ADAPTER_INFO, *mut u32) -> u32;

static_detour! {
    static VolumeInformationDetour: unsafe extern "system" fn(
        PCSTR, PSTR, u32, *mut u32, *mut u32, *mut u32, PSTR, u32
    ) -> BOOL;
    static AdaptersInfoDetour: unsafe extern "system" fn(*mut IP_ADAPTER_INFO, *mut u32) -> u32;
}

/// Context bound by the current install transaction.
///
/// Scoped like the redirection table itself (process-wide); handlers take
/// a clone of the `Arc` and never hold the slot lock across their rewrite
/// logic.
static BOUND_CONTEXT: Mutex<Option<Arc<SpoofContext>>> = Mutex::new(None);

fn bound_context() -> Option<Arc<SpoofContext>> {
    BOUND_CONTEXT
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

fn set_bound_context(ctx: Option<Arc<SpoofContext>>) {
    *BOUND_CONTEXT.lock().unwrap_or_else(|e| e.into_inner()) = ctx;
}

fn resolve_entry(module: &CStr, symbol: &CStr) -> (Resolution, usize) {
    unsafe {
        let handle = GetModuleHandleA(module.as_ptr().cast());
        if handle.is_null() {
            return (Resolution::ModuleAbsent, 0);
        }
        match GetProcAddress(handle, symbol.as_ptr().cast()) {
            Some(addr) => (Resolution::Resolved, addr as usize),
            None => (Resolution::EntryPointMissing, 0),
        }
    }
}

/// Replacement handler for `GetVolumeInformationA`.
///
/// The serial out-parameter is rewritten whenever it was provided and an
/// observable spoof supplies a parseable serial; everything else keeps the
/// values the real call produced.
unsafe fn hooked_volume_information(
    root: PCSTR,
    volume_name: PSTR,
    volume_name_len: u32,
    serial: *mut u32,
    max_component_len: *mut u32,
    fs_flags: *mut u32,
    fs_name: PSTR,
    fs_name_len: u32,
) -> BOOL {
    let result = VolumeInformationDetour.call(
        root,
        volume_name,
        volume_name_len,
        serial,
        max_component_len,
        fs_flags,
        fs_name,
        fs_name_len,
    );

    if !serial.is_null() {
        if let Some(ctx) = bound_context() {
            if let Some(snapshot) = ctx.observable_snapshot() {
                if let Some(spoofed) = spoofed_volume_serial(&snapshot) {
                    *serial = spoofed;
                }
            }
        }
    }

    result
}

/// Replacement handler for `GetAdaptersInfo`.
///
/// On a successful real call, every returned record's hardware address is
/// overwritten from the spoof string, bounded by that record's reported
/// address length.
unsafe fn hooked_adapters_info(info: *mut IP_ADAPTER_INFO, size: *mut u32) -> u32 {
    let result = AdaptersInfoDetour.call(info, size);

    if result == ERROR_SUCCESS && !info.is_null() {
        if let Some(ctx) = bound_context() {
            if let Some(snapshot) = ctx.observable_snapshot() {
                if !snapshot.mac_address.is_empty() {
                    let mut record = info;
                    while !record.is_null() {
                        let adapter = &mut *record;
                        let reported_len = adapter.AddressLength as usize;
                        overwrite_hardware_address(
                            &mut adapter.Address,
                            reported_len,
                            &snapshot.mac_address,
                        );
                        record = adapter.Next;
                    }
                }
            }
        }
    }

    result
}

enum StagedOp {
    Enable(QueryHook, Arc<SpoofContext>),
    Disable(QueryHook),
}

/// Transactional detour backend over the two Win32 identity queries.
pub struct WinHookEngine {
    staged: Mutex<Vec<StagedOp>>,
}

impl WinHookEngine {
    pub fn new() -> Self {
        Self {
            staged: Mutex::new(Vec::new()),
        }
    }

    fn staged(&self) -> MutexGuard<'_, Vec<StagedOp>> {
        self.staged.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// First-time initialization of a static detour for its resolved
    /// target. Re-initialization after a previous install cycle is fine —
    /// the redirection target never changes.
    fn initialize_detour(hook: QueryHook, addr: usize) -> Result<(), HookError> {
        let result = unsafe {
            match hook {
                QueryHook::VolumeInformation => {
                    let target: VolumeInformationFn = std::mem::transmute(addr);
                    VolumeInformationDetour
                        .initialize(target, |a, b, c, d, e, f, g, h| unsafe {
                            hooked_volume_information(a, b, c, d, e, f, g, h)
                        })
                        .map(|_| ())
                }
                QueryHook::AdapterEnumeration => {
                    let target: AdaptersInfoFn = std::mem::transmute(addr);
                    AdaptersInfoDetour
                        .initialize(target, |info, size| unsafe {
                            hooked_adapters_info(info, size)
                        })
                        .map(|_| ())
                }
            }
        };

        match result {
            Ok(()) | Err(retour::Error::AlreadyInitialized) => Ok(()),
            Err(e) => Err(HookError::AttachRejected {
                hook: hook.as_str(),
                reason: e.to_string(),
            }),
        }
    }

    fn enable_detour(hook: QueryHook) -> Result<(), retour::Error> {
        unsafe {
            match hook {
                QueryHook::VolumeInformation => VolumeInformationDetour.enable(),
                QueryHook::AdapterEnumeration => AdaptersInfoDetour.enable(),
            }
        }
    }

    fn disable_detour(hook: QueryHook) -> Result<(), retour::Error> {
        unsafe {
            match hook {
                QueryHook::VolumeInformation => {
                    if VolumeInformationDetour.is_enabled() {
                        VolumeInformationDetour.disable()?;
                    }
                }
                QueryHook::AdapterEnumeration => {
                    if AdaptersInfoDetour.is_enabled() {
                        AdaptersInfoDetour.disable()?;
                    }
                }
            }
        }
        Ok(())
    }

    fn any_enabled() -> bool {
        VolumeInformationDetour.is_enabled() || AdaptersInfoDetour.is_enabled()
    }

    /// Undo one committed operation during rollback. Best-effort: a
    /// rollback failure is logged, not propagated, because the commit
    /// error is the one the caller needs.
    fn undo(op: &StagedOp) {
        let result = match op {
            StagedOp::Enable(hook, _) => Self::disable_detour(*hook),
            StagedOp::Disable(hook) => Self::enable_detour(*hook),
        };
        if let Err(e) = result {
            warn!("rollback of a staged redirection failed: {e}");
        }
    }
}

impl Default for WinHookEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HookEngine for WinHookEngine {
    fn resolve(&self, hook: QueryHook) -> Resolution {
        let (resolution, _) = match hook {
            QueryHook::VolumeInformation => resolve_entry(VOLUME_MODULE, VOLUME_SYMBOL),
            QueryHook::AdapterEnumeration => resolve_entry(ADAPTERS_MODULE, ADAPTERS_SYMBOL),
        };
        resolution
    }

    fn begin_transaction(&self) {
        self.staged().clear();
    }

    fn attach(&self, hook: QueryHook, ctx: &Arc<SpoofContext>) -> Result<(), HookError> {
        let (resolution, addr) = match hook {
            QueryHook::VolumeInformation => resolve_entry(VOLUME_MODULE, VOLUME_SYMBOL),
            QueryHook::AdapterEnumeration => resolve_entry(ADAPTERS_MODULE, ADAPTERS_SYMBOL),
        };
        match resolution {
            Resolution::Resolved => {}
            Resolution::ModuleAbsent => return Err(HookError::ModuleAbsent(hook.as_str())),
            Resolution::EntryPointMissing => {
                return Err(HookError::EntryPointMissing(hook.as_str()))
            }
        }

        Self::initialize_detour(hook, addr)?;
        self.staged().push(StagedOp::Enable(hook, ctx.clone()));
        Ok(())
    }

    fn detach(&self, hook: QueryHook) -> Result<(), HookError> {
        self.staged().push(StagedOp::Disable(hook));
        Ok(())
    }

    fn commit(&self) -> Result<(), HookError> {
        let ops = std::mem::take(&mut *self.staged());

        for (index, op) in ops.iter().enumerate() {
            let result = match op {
                StagedOp::Enable(hook, ctx) => {
                    set_bound_context(Some(ctx.clone()));
                    Self::enable_detour(*hook)
                }
                StagedOp::Disable(hook) => Self::disable_detour(*hook),
            };

            if let Err(e) = result {
                for applied in ops[..index].iter().rev() {
                    Self::undo(applied);
                }
                if !Self::any_enabled() {
                    set_bound_context(None);
                }
                return Err(HookError::CommitFailed(e.to_string()));
            }
        }

        if !Self::any_enabled() {
            set_bound_context(None);
        }
        Ok(())
    }

    fn abort(&self) {
        self.staged().clear();
    }
}

// ============================================================================
// Direct identity queries (original-set capture)
// ============================================================================

/// Direct, non-intercepted queries used at initialize time.
///
/// Runs while no spoof is installed, so the plain entry points report real
/// values. Categories without a direct query here stay empty.
pub(crate) fn capture_identifiers() -> OriginalIdentifiers {
    OriginalIdentifiers {
        mac_address: current_mac_address().unwrap_or_else(|| "00:00:00:00:00:00".to_string()),
        volume_serial: current_volume_serial().unwrap_or_else(|| "00000000".to_string()),
        ..Default::default()
    }
}

fn current_volume_serial() -> Option<String> {
    let mut serial = 0u32;
    let ok = unsafe {
        GetVolumeInformationA(
            VOLUME_ROOT.as_ptr().cast(),
            std::ptr::null_mut(),
            0,
            &mut serial,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            0,
        )
    };
    (ok != 0).then(|| format!("{serial:X}"))
}

/// First six-byte hardware address reported by adapter enumeration, as
/// uppercase colon-hex.
fn current_mac_address() -> Option<String> {
    unsafe {
        let mut size = 0u32;
        if GetAdaptersInfo(std::ptr::null_mut(), &mut size) != ERROR_BUFFER_OVERFLOW || size == 0 {
            return None;
        }

        let mut buffer = vec![0u8; size as usize];
        let info = buffer.as_mut_ptr() as *mut IP_ADAPTER_INFO;
        if GetAdaptersInfo(info, &mut size) != ERROR_SUCCESS {
            return None;
        }

        let mut record = info;
        while !record.is_null() {
            let adapter = &*record;
            if adapter.AddressLength == 6 {
                let rendered = adapter.Address[..6]
                    .iter()
                    .map(|byte| format!("{byte:02X}"))
                    .collect::<Vec<_>>()
                    .join(":");
                return Some(rendered);
            }
            record = adapter.Next;
        }
        None
    }
}
