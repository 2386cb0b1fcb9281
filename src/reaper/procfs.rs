// src/reaper/procfs.rs

//! Platform backends for [`ProcessTreeKiller`].
//!
//! - `ProcEnvironKiller` (Linux) reads `/proc/<pid>/environ` and signals
//!   every process whose environment contains the token entry.
//! - `DirectChildOnly` is used where the process table cannot be inspected;
//!   only the direct child, which the orchestrator kills itself, is handled.

use std::sync::Arc;

use tracing::debug;

use super::{ProcessTreeKiller, ReaperToken};

/// Pick the best backend for the current platform.
pub fn default_killer() -> Arc<dyn ProcessTreeKiller> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(ProcEnvironKiller::default())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Arc::new(DirectChildOnly)
    }
}

/// Fallback backend: descendants are left to terminate on their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectChildOnly;

impl ProcessTreeKiller for DirectChildOnly {
    fn kill_all(&self, token: &ReaperToken) -> usize {
        debug!(
            token = %token.value(),
            "descendant discovery unsupported on this platform; only the direct child is reaped"
        );
        0
    }
}

/// Send a kill signal to a single process id. Errors (already gone, not
/// permitted) are ignored.
pub fn kill_pid(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        if pid <= 0 {
            return false;
        }
        // SAFETY: kill(2) has no memory-safety preconditions.
        unsafe { libc::kill(pid, libc::SIGKILL) == 0 }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

#[cfg(target_os = "linux")]
pub use linux::ProcEnvironKiller;

#[cfg(target_os = "linux")]
mod linux {
    use std::fs;
    use std::path::{Path, PathBuf};

    use tracing::{debug, trace};

    use super::{ProcessTreeKiller, ReaperToken, kill_pid};

    /// Scans the Linux process table through procfs.
    #[derive(Debug, Clone)]
    pub struct ProcEnvironKiller {
        proc_root: PathBuf,
        max_passes: usize,
    }

    impl Default for ProcEnvironKiller {
        fn default() -> Self {
            Self {
                proc_root: PathBuf::from("/proc"),
                max_passes: 3,
            }
        }
    }

    impl ProcEnvironKiller {
        /// Use an alternative procfs mount point.
        pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
            Self {
                proc_root: proc_root.into(),
                ..Self::default()
            }
        }

        /// Pids whose environment carries `token`, excluding our own.
        pub fn find(&self, token: &ReaperToken) -> Vec<u32> {
            let needle = token.env_entry().into_bytes();
            let own_pid = std::process::id();

            let Ok(entries) = fs::read_dir(&self.proc_root) else {
                debug!(root = ?self.proc_root, "cannot read process table");
                return Vec::new();
            };

            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().to_str()?.parse::<u32>().ok())
                .filter(|pid| *pid != own_pid)
                .filter(|pid| environ_contains(&self.proc_root, *pid, &needle))
                .collect()
        }
    }

    impl ProcessTreeKiller for ProcEnvironKiller {
        fn kill_all(&self, token: &ReaperToken) -> usize {
            let mut killed = 0;

            // Repeat while something was found: a process may fork while we
            // are scanning.
            for pass in 0..self.max_passes {
                let pids = self.find(token);
                if pids.is_empty() {
                    break;
                }
                for pid in pids {
                    if kill_pid(pid) {
                        trace!(pid, pass, "killed process carrying reaper token");
                        killed += 1;
                    }
                }
            }

            killed
        }
    }

    fn environ_contains(root: &Path, pid: u32, needle: &[u8]) -> bool {
        // Unreadable (exited, other user) entries are skipped.
        match fs::read(root.join(pid.to_string()).join("environ")) {
            Ok(bytes) => bytes.split(|b| *b == 0).any(|entry| entry == needle),
            Err(_) => false,
        }
    }

}
