//! Process-control helpers shared by the executor and the supervisor.
//!
//! The executor places each shell child in its own process group
//! (`set_process_group` runs in `pre_exec`) so a timeout can reap the whole
//! command tree, not just the shell (`kill_process_group_by_pid`). The
//! supervisor uses the single-process helpers to escalate from SIGTERM to
//! SIGKILL and to probe worker liveness by PID.
//!
//! On non-Unix platforms these helpers are no-ops.

use std::io;

#[cfg(unix)]
/// Put the calling process into its own process group.
///
/// Intended for use in `pre_exec` so the child becomes the group leader.
pub fn set_process_group() -> io::Result<()> {
    let result = unsafe { libc::setpgid(0, 0) };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(unix))]
/// No-op on non-Unix platforms.
pub fn set_process_group() -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
/// Kill the process group for the given PID (best-effort).
///
/// This resolves the PGID for `pid` and sends SIGKILL to the whole group.
pub fn kill_process_group_by_pid(pid: u32) -> io::Result<()> {
    use std::io::ErrorKind;

    let pid = pid as libc::pid_t;
    let pgid = unsafe { libc::getpgid(pid) };
    if pgid == -1 {
        let err = io::Error::last_os_error();
        if err.kind() != ErrorKind::NotFound {
            return Err(err);
        }
        return Ok(());
    }

    let result = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if result == -1 {
        let err = io::Error::last_os_error();
        if err.kind() != ErrorKind::NotFound {
            return Err(err);
        }
    }

    Ok(())
}

#[cfg(not(unix))]
/// No-op on non-Unix platforms.
pub fn kill_process_group_by_pid(_pid: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
/// Request graceful termination of a single process (SIGTERM, best-effort).
pub fn terminate_process(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
/// No-op on non-Unix platforms.
pub fn terminate_process(_pid: u32) {}

#[cfg(unix)]
/// Forcibly kill a single process (SIGKILL, best-effort).
pub fn force_kill_process(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
/// No-op on non-Unix platforms.
pub fn force_kill_process(_pid: u32) {}

#[cfg(unix)]
/// Whether a process with this PID currently exists (signal-0 probe).
pub fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
/// Always false on non-Unix platforms.
pub fn process_alive(_pid: u32) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn own_process_is_alive() {
        assert!(process_alive(std::process::id()));
    }

    #[test]
    fn out_of_range_pid_is_not_alive() {
        // Linux caps PIDs well below i32::MAX, so this can never exist.
        assert!(!process_alive(i32::MAX as u32));
    }
}
