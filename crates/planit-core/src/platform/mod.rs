//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific process handling live here.
//!
//! # Supported Platforms
//!
//! - **Linux**: Full support, including the parent-death signal for engines
//! - **macOS**: Full support without the parent-death signal
//! - **Windows**: Liveness checks and forced termination

pub mod process;

pub use process::{
    is_process_alive, register_exit_cleanup, request_graceful_stop, terminate_process,
    unregister_exit_cleanup,
};

/// Returns the current platform name.
pub fn current_platform() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(target_os = "windows")]
    {
        "windows"
    }
    #[cfg(target_os = "macos")]
    {
        "macos"
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        "unknown"
    }
}
