//! Target-process liveness checks.

/// Answers whether a given process id is still running.
///
/// Spoof observability is derived from this at read time — nothing watches
/// the target proactively, and a dead owner simply makes every subsequent
/// check read false.
pub trait ProcessMonitor: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Liveness against the operating system's process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessMonitor;

#[cfg(unix)]
impl ProcessMonitor for SystemProcessMonitor {
    fn is_alive(&self, pid: u32) -> bool {
        // pid 0 would address the caller's process group, not a process.
        if pid == 0 {
            return false;
        }
        // Signal 0 probes existence without delivering anything; EPERM
        // still means the process exists.
        let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
        rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}

#[cfg(windows)]
impl ProcessMonitor for SystemProcessMonitor {
    fn is_alive(&self, pid: u32) -> bool {
        use windows_sys::Win32::Foundation::{CloseHandle, STILL_ACTIVE};
        use windows_sys::Win32::System::Threading::{
            GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
        };

        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle.is_null() {
                return false;
            }
            let mut exit_code = 0u32;
            let alive = GetExitCodeProcess(handle, &mut exit_code) != 0
                && exit_code == STILL_ACTIVE as u32;
            CloseHandle(handle);
            alive
        }
    }
}

#[cfg(not(any(unix, windows)))]
impl ProcessMonitor for SystemProcessMonitor {
    fn is_alive(&self, _pid: u32) -> bool {
        false
    }
}
