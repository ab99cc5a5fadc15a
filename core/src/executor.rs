use crate::process_group;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Wall-clock budget for a single job command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// POSIX shells report an unresolvable command with this exit status.
const NOT_FOUND_EXIT_CODE: i32 = 127;

/// Classification of a single command run. Everything here is a job
/// outcome, not an error; only spawn-level failures surface as `Err` from
/// [`execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Completed,
    Failed { exit_code: Option<i32> },
    TimedOut,
    NotFound,
}

impl ExecOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, ExecOutcome::Completed)
    }
}

/// Run `command` through the shell and classify the result.
///
/// The child is made leader of a fresh process group; on timeout the whole
/// group is killed so backgrounded children do not outlive the job. Captured
/// stdout/stderr are used for diagnostics only and never persisted.
pub async fn execute(command: &str, timeout: Duration) -> io::Result<ExecOutcome> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(process_group::set_process_group);
    }

    let child = cmd.spawn()?;
    let child_pid = child.id();

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            match output.status.code() {
                Some(0) => Ok(ExecOutcome::Completed),
                Some(NOT_FOUND_EXIT_CODE) => {
                    debug!("command not found: {}", stderr.trim_end());
                    Ok(ExecOutcome::NotFound)
                }
                code => {
                    debug!("command exited with {:?}: {}", output.status, stderr.trim_end());
                    Ok(ExecOutcome::Failed { exit_code: code })
                }
            }
        }
        Ok(Err(err)) => Err(err),
        Err(_elapsed) => {
            if let Some(pid) = child_pid {
                if let Err(err) = process_group::kill_process_group_by_pid(pid) {
                    debug!("failed to kill process group {pid}: {err}");
                }
            }
            Ok(ExecOutcome::TimedOut)
        }
    }
}
