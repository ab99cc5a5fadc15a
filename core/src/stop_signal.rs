use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

pub const STOP_SENTINEL_FILE: &str = "workers.stop";

const SENTINEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cross-process stop request, implemented as a sentinel file under the
/// queue home.
///
/// The supervisor arms it; worker processes poll it between loop
/// iterations, which preserves the finish-current-job-then-exit semantics:
/// an in-flight subprocess is never interrupted by the signal itself.
#[derive(Debug, Clone)]
pub struct StopSignal {
    path: PathBuf,
}

impl StopSignal {
    pub fn new(queue_home: &Path) -> Self {
        Self {
            path: queue_home.join(STOP_SENTINEL_FILE),
        }
    }

    pub fn arm(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, b"stop\n")
    }

    pub fn clear(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub fn is_set(&self) -> bool {
        self.path.exists()
    }

    /// Resolve once the signal is armed. Polls; workers only need
    /// iteration-boundary granularity.
    pub async fn wait(&self) {
        loop {
            if self.is_set() {
                return;
            }
            tokio::time::sleep(SENTINEL_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn arm_set_clear_cycle() {
        let home = TempDir::new().expect("tempdir");
        let signal = StopSignal::new(home.path());
        assert_eq!(signal.is_set(), false);

        signal.arm().expect("arm");
        assert_eq!(signal.is_set(), true);

        signal.clear().expect("clear");
        assert_eq!(signal.is_set(), false);
        signal.clear().expect("clear is idempotent");
    }

    #[tokio::test]
    async fn wait_resolves_after_arm() {
        let home = TempDir::new().expect("tempdir");
        let signal = StopSignal::new(home.path());

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };
        signal.arm().expect("arm");
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("wait should resolve once armed")
            .expect("waiter task");
    }
}
