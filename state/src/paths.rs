use std::path::Path;
use std::path::PathBuf;

pub(crate) const QUEUE_HOME_ENV_VAR: &str = "QUEUECTL_HOME";

/// Resolve the directory holding the database, config file, PID ledger, and
/// worker logs: `$QUEUECTL_HOME` when set and non-empty, otherwise
/// `~/.queuectl`.
pub fn find_queue_home() -> anyhow::Result<PathBuf> {
    match std::env::var(QUEUE_HOME_ENV_VAR) {
        Ok(value) if !value.is_empty() => Ok(PathBuf::from(value)),
        _ => {
            let home = dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("could not determine home directory"))?;
            Ok(home.join(".queuectl"))
        }
    }
}

pub fn state_db_path(queue_home: &Path) -> PathBuf {
    queue_home.join(crate::runtime::STATE_DB_FILENAME)
}
