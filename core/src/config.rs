use serde::Deserialize;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use tracing::warn;

pub const CONFIG_TOML_FILE: &str = "config.toml";

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: u32 = 2;

#[derive(Debug, Default, Deserialize)]
struct ConfigToml {
    max_retries: Option<u32>,
    backoff_base: Option<u32>,
}

/// Read-only view of `<queue_home>/config.toml`.
///
/// The file is re-read on every access: workers consult the provider when
/// they record an outcome, so an operator edit applies to the next retry
/// without a restart. A missing or unparseable file silently yields
/// defaults.
#[derive(Debug, Clone)]
pub struct ConfigProvider {
    path: PathBuf,
}

impl ConfigProvider {
    pub fn new(queue_home: &Path) -> Self {
        Self {
            path: queue_home.join(CONFIG_TOML_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Retry budget frozen into each job at enqueue.
    pub fn max_retries(&self) -> u32 {
        self.read().max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    /// Base for exponential backoff: the delay before retry `n` (1-indexed)
    /// is `backoff_base^n` seconds.
    pub fn backoff_base(&self) -> u32 {
        self.read().backoff_base.unwrap_or(DEFAULT_BACKOFF_BASE)
    }

    /// Raw lookup of any top-level key; `None` for unknown or unset keys.
    pub fn get(&self, key: &str) -> Option<toml::Value> {
        self.read_table().get(key).cloned()
    }

    /// Read-modify-write of a single top-level key, preserving the rest of
    /// the file.
    pub fn set(&self, key: &str, value: toml::Value) -> anyhow::Result<()> {
        let mut table = self.read_table();
        table.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string_pretty(&table)?)?;
        Ok(())
    }

    fn read(&self) -> ConfigToml {
        match self.read_contents() {
            Some(contents) => match toml::from_str::<ConfigToml>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    warn!("failed to parse {}: {err}", self.path.display());
                    ConfigToml::default()
                }
            },
            None => ConfigToml::default(),
        }
    }

    fn read_table(&self) -> toml::Table {
        match self.read_contents() {
            Some(contents) => match toml::from_str::<toml::Table>(&contents) {
                Ok(table) => table,
                Err(err) => {
                    warn!("failed to parse {}: {err}", self.path.display());
                    toml::Table::new()
                }
            },
            None => toml::Table::new(),
        }
    }

    fn read_contents(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Some(contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("{} not found, using defaults", self.path.display());
                None
            }
            Err(err) => {
                warn!("failed to read {}: {err}", self.path.display());
                None
            }
        }
    }
}
