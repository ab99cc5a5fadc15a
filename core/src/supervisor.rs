use crate::error::QueueError;
use crate::process_group;
use crate::stop_signal::StopSignal;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::process::Child;
use std::process::Command;
use std::process::Stdio;
use std::time::Duration;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub const PID_LEDGER_FILE: &str = "workers.json";

const GRACEFUL_EXIT_WAIT: Duration = Duration::from_secs(5);
const TERMINATE_WAIT: Duration = Duration::from_secs(2);
const LEDGER_TERMINATE_WAIT: Duration = Duration::from_secs(1);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// On-disk record of the worker PIDs spawned by the last `start`, so a
/// later control-plane invocation with no in-memory handles can still stop
/// them. Advisory only: a recorded PID may have been recycled.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PidLedger {
    #[serde(default)]
    pids: Vec<u32>,
}

/// Owns worker process lifetimes: spawning, the stop sentinel, the PID
/// ledger, and graceful-then-forced teardown.
pub struct WorkerSupervisor {
    queue_home: PathBuf,
    stop: StopSignal,
    handles: Vec<Child>,
}

impl WorkerSupervisor {
    pub fn new(queue_home: PathBuf) -> Self {
        let stop = StopSignal::new(queue_home.as_path());
        Self {
            queue_home,
            stop,
            handles: Vec::new(),
        }
    }

    /// Spawn `count` detached worker processes, replacing any that are
    /// already running. Returns the number actually started; spawn failures
    /// are logged and skipped so a partial pool keeps working.
    pub async fn start_workers(&mut self, count: usize) -> Result<usize, QueueError> {
        self.stop_workers().await;
        if let Err(err) = self.stop.clear() {
            return Err(QueueError::Supervisor(format!(
                "could not clear stop sentinel: {err}"
            )));
        }

        let exe = std::env::current_exe().map_err(|err| {
            QueueError::Supervisor(format!("could not resolve worker executable: {err}"))
        })?;
        std::fs::create_dir_all(&self.queue_home).map_err(|err| {
            QueueError::Supervisor(format!("could not create queue home: {err}"))
        })?;

        let supervisor_pid = std::process::id();
        let mut pids = Vec::new();
        for index in 0..count {
            let worker_id = format!("worker-{supervisor_pid}-{index}");
            let spawned = Command::new(&exe)
                .arg("worker")
                .arg("run")
                .arg("--worker-id")
                .arg(&worker_id)
                .arg("--queue-home")
                .arg(&self.queue_home)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn();
            match spawned {
                Ok(child) => {
                    info!(worker_id = %worker_id, pid = child.id(), "started worker");
                    pids.push(child.id());
                    self.handles.push(child);
                }
                Err(err) => {
                    warn!(worker_id = %worker_id, "failed to spawn worker: {err}");
                }
            }
        }

        if let Err(err) = self.save_ledger(&pids) {
            warn!("failed to write PID ledger: {err:#}");
        }
        Ok(self.handles.len())
    }

    /// Stop every worker this supervisor knows about: the in-memory handles
    /// from this invocation, plus any PIDs a previous invocation left in
    /// the ledger. Escalates from the stop sentinel to SIGTERM to SIGKILL.
    pub async fn stop_workers(&mut self) {
        if let Err(err) = self.stop.arm() {
            warn!("could not arm stop sentinel: {err}");
        }

        let mut covered: HashSet<u32> = HashSet::new();
        let mut handles = std::mem::take(&mut self.handles);
        for child in &mut handles {
            let pid = child.id();
            covered.insert(pid);
            if wait_for_exit(child, GRACEFUL_EXIT_WAIT).await {
                continue;
            }
            debug!(pid, "worker did not exit gracefully, terminating");
            process_group::terminate_process(pid);
            if wait_for_exit(child, TERMINATE_WAIT).await {
                continue;
            }
            debug!(pid, "worker ignored termination, killing");
            let _ = child.kill();
            let _ = child.wait();
        }

        // PIDs from a previous invocation; liveness is the OS's word, and
        // unsignalable processes are ignored silently.
        for pid in self.load_ledger() {
            if covered.contains(&pid) {
                continue;
            }
            if !process_group::process_alive(pid) {
                continue;
            }
            process_group::terminate_process(pid);
            tokio::time::sleep(LEDGER_TERMINATE_WAIT).await;
            if process_group::process_alive(pid) {
                debug!(pid, "ledger worker ignored termination, killing");
                process_group::force_kill_process(pid);
            }
        }

        self.clear_ledger();
    }

    /// Live workers: in-memory handles still running, plus ledger PIDs not
    /// already counted whose process the OS reports alive.
    pub fn active_worker_count(&mut self) -> usize {
        let mut seen: HashSet<u32> = HashSet::new();
        let mut count = 0;
        for child in &mut self.handles {
            seen.insert(child.id());
            if matches!(child.try_wait(), Ok(None)) {
                count += 1;
            }
        }
        for pid in self.load_ledger() {
            if !seen.contains(&pid) && process_group::process_alive(pid) {
                count += 1;
            }
        }
        count
    }

    fn ledger_path(&self) -> PathBuf {
        self.queue_home.join(PID_LEDGER_FILE)
    }

    fn load_ledger(&self) -> Vec<u32> {
        load_ledger_from(self.ledger_path().as_path())
    }

    fn save_ledger(&self, pids: &[u32]) -> anyhow::Result<()> {
        let ledger = PidLedger {
            pids: pids.to_vec(),
        };
        std::fs::write(self.ledger_path(), serde_json::to_string(&ledger)?)?;
        Ok(())
    }

    fn clear_ledger(&self) {
        if let Err(err) = std::fs::remove_file(self.ledger_path())
            && err.kind() != std::io::ErrorKind::NotFound
        {
            warn!("failed to remove PID ledger: {err}");
        }
    }
}

/// Absent ledger means no workers; a corrupt one is treated the same way.
fn load_ledger_from(path: &Path) -> Vec<u32> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_str::<PidLedger>(&contents) {
        Ok(ledger) => ledger.pids,
        Err(err) => {
            warn!("unreadable PID ledger at {}: {err}", path.display());
            Vec::new()
        }
    }
}

async fn wait_for_exit(child: &mut Child, wait: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) => {}
            // The handle is unusable; treat the process as gone.
            Err(_) => return true,
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
}
