//! Platform-specific process management.
//!
//! Liveness checks, graceful and forced termination, and the process-wide
//! exit cleanup that keeps engine processes from outliving the client.

use crate::error::{PlanitError, Result};
use std::collections::HashSet;
use std::sync::{LazyLock, Mutex, Once};
use tracing::{debug, warn};

/// Engine pids to kill if the client is interrupted.
static EXIT_CLEANUP_PIDS: LazyLock<Mutex<HashSet<u32>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

static INSTALL_HANDLER: Once = Once::new();

/// Exit status used after an interrupt, as a shell would report SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Check if a process with the given PID is alive.
///
/// # Platform Behavior
/// - **Linux/macOS**: `kill(pid, 0)` signal check
/// - **Windows**: `OpenProcess` with `PROCESS_QUERY_LIMITED_INFORMATION`
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        // No signal: only checks that the pid can be signalled.
        match kill(Pid::from_raw(raw), None::<Signal>) {
            Ok(()) => true,
            Err(nix::errno::Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(windows)]
    {
        is_process_alive_windows(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        warn!("Process alive check not implemented for this platform");
        true
    }
}

#[cfg(windows)]
#[allow(unsafe_code)]
fn is_process_alive_windows(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    // SAFETY: OpenProcess has no preconditions; a non-null handle is owned here
    // and closed exactly once.
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if !handle.is_null() {
            CloseHandle(handle);
            true
        } else {
            false
        }
    }
}

/// Ask a process to stop without forcing it.
///
/// Returns `false` when no graceful request exists on this platform or the
/// signal could not be delivered; callers then fall back to a forced kill.
pub fn request_graceful_stop(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        debug!("Sending SIGTERM to process {}", pid);
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => true,
            Err(e) => {
                if e != nix::errno::Errno::ESRCH {
                    warn!("Failed to send SIGTERM to {}: {}", pid, e);
                }
                false
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// Terminate a process gracefully, then forcefully if needed.
///
/// Blocks the calling thread; used from the interrupt handler where no runtime
/// is available.
///
/// # Platform Behavior
/// - **Linux/macOS**: SIGTERM, wait up to `timeout_ms`, then SIGKILL
/// - **Windows**: `taskkill /PID {pid} /F /T`
///
/// # Returns
/// `true` if the process was terminated (or wasn't running)
pub fn terminate_process(pid: u32, timeout_ms: u64) -> Result<bool> {
    if !is_process_alive(pid) {
        debug!("Process {} is not running", pid);
        return Ok(true);
    }

    #[cfg(unix)]
    {
        terminate_process_unix(pid, timeout_ms)
    }

    #[cfg(windows)]
    {
        let _ = timeout_ms;
        terminate_process_windows(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = timeout_ms;
        Err(PlanitError::Other(
            "Process termination not implemented for this platform".into(),
        ))
    }
}

#[cfg(unix)]
fn terminate_process_unix(pid: u32, timeout_ms: u64) -> Result<bool> {
    use nix::sys::signal::{kill, Signal};
    use nix::sys::wait::{waitpid, WaitPidFlag};
    use nix::unistd::Pid;
    use std::thread::sleep;
    use std::time::Duration;

    let raw = i32::try_from(pid)
        .map_err(|_| PlanitError::Other(format!("Invalid process id {}", pid)))?;
    let nix_pid = Pid::from_raw(raw);

    if !request_graceful_stop(pid) && !is_process_alive(pid) {
        return Ok(true);
    }

    let wait_interval = Duration::from_millis(100);
    let iterations = (timeout_ms / 100).max(1);

    for _ in 0..iterations {
        sleep(wait_interval);
        let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));
        if !is_process_alive(pid) {
            debug!("Process {} terminated gracefully", pid);
            return Ok(true);
        }
    }

    debug!("Process {} still running, sending SIGKILL", pid);
    if let Err(e) = kill(nix_pid, Signal::SIGKILL) {
        if e == nix::errno::Errno::ESRCH {
            return Ok(true);
        }
        return Err(PlanitError::Other(format!(
            "Failed to kill process {}: {}",
            pid, e
        )));
    }

    sleep(Duration::from_millis(100));

    // ECHILD is fine: the process is not ours to reap.
    match waitpid(nix_pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(status) => debug!("Reaped process {}: {:?}", pid, status),
        Err(e) if e != nix::errno::Errno::ECHILD => {
            debug!("waitpid({}) failed: {}", pid, e);
        }
        Err(_) => {}
    }

    Ok(!is_process_alive(pid))
}

#[cfg(windows)]
fn terminate_process_windows(pid: u32) -> Result<bool> {
    use std::process::Command;

    debug!("Terminating process {} with taskkill", pid);

    let output = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F", "/T"])
        .output()
        .map_err(|e| PlanitError::Other(format!("Failed to run taskkill: {}", e)))?;

    if output.status.success() {
        Ok(true)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not found") || stderr.contains("not running") {
            Ok(true)
        } else {
            warn!("taskkill failed for {}: {}", pid, stderr);
            Ok(false)
        }
    }
}

/// Register an engine pid to be killed if the client is interrupted.
///
/// The first registration installs a process-wide interrupt handler. If the
/// host application already installed its own, only a warning is logged and
/// cleanup relies on the child's parent-death signal and kill-on-drop.
pub fn register_exit_cleanup(pid: u32) {
    INSTALL_HANDLER.call_once(|| {
        if let Err(e) = ctrlc::set_handler(run_exit_cleanup) {
            warn!("Could not install engine cleanup handler: {}", e);
        }
    });

    if let Ok(mut pids) = EXIT_CLEANUP_PIDS.lock() {
        pids.insert(pid);
    }
}

/// Forget a pid once its engine has been stopped normally.
pub fn unregister_exit_cleanup(pid: u32) {
    if let Ok(mut pids) = EXIT_CLEANUP_PIDS.lock() {
        pids.remove(&pid);
    }
}

/// Pids currently registered for exit cleanup.
pub fn exit_cleanup_pids() -> Vec<u32> {
    EXIT_CLEANUP_PIDS
        .lock()
        .map(|pids| pids.iter().copied().collect())
        .unwrap_or_default()
}

fn run_exit_cleanup() {
    let pids: Vec<u32> = EXIT_CLEANUP_PIDS
        .lock()
        .map(|mut pids| pids.drain().collect())
        .unwrap_or_default();

    for pid in pids {
        if let Err(e) = terminate_process(pid, 0) {
            warn!("Failed to stop engine process {}: {}", pid, e);
        }
    }
    std::process::exit(INTERRUPTED_EXIT_CODE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_self() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(4_000_000_000));
    }

    #[test]
    fn test_terminate_nonexistent() {
        let result = terminate_process(4_000_000_000, 100);
        assert!(result.unwrap());
    }

    #[test]
    fn test_exit_cleanup_registration() {
        let pid = 3_999_999_001;
        register_exit_cleanup(pid);
        assert!(exit_cleanup_pids().contains(&pid));

        unregister_exit_cleanup(pid);
        assert!(!exit_cleanup_pids().contains(&pid));
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_child_process() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id();

        assert!(terminate_process(pid, 500).unwrap());
        let _ = child.wait();
        assert!(!is_process_alive(pid));
    }
}
