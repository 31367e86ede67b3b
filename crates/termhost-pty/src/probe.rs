//! Process tree and working directory probing.
//!
//! Backed by `sysinfo`, so it works wherever that crate can list processes.
//! On unsupported platforms the probes return `None` and nothing is reported.

use std::path::{Path, PathBuf};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// Whether `pid` currently has child processes.
///
/// `None` when `pid` is not running or the platform cannot be probed.
pub fn has_subprocs(pid: u32) -> Option<bool> {
    if !sysinfo::IS_SUPPORTED_SYSTEM {
        return None;
    }

    let root = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());
    system.process(root)?;

    Some(
        system
            .processes()
            .values()
            .any(|process| process.parent() == Some(root)),
    )
}

/// Current working directory of `pid`.
pub fn working_dir(pid: u32) -> Option<PathBuf> {
    if !sysinfo::IS_SUPPORTED_SYSTEM {
        return None;
    }

    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::new().with_cwd(UpdateKind::Always),
    );
    system
        .process(pid)?
        .cwd()
        .filter(|cwd| !cwd.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
