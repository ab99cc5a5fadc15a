use clap::Args;
use clap::Parser;
use clap::Subcommand;
use queuectl_state::JobState;
use std::path::PathBuf;

/// Durable background job queue driven from the command line.
#[derive(Debug, Parser)]
#[clap(name = "queuectl", bin_name = "queuectl", version)]
pub struct QueuectlCli {
    /// Directory holding the job database, config, and worker state.
    /// Defaults to $QUEUECTL_HOME, then ~/.queuectl.
    #[clap(long, global = true, value_name = "DIR")]
    pub queue_home: Option<PathBuf>,

    #[clap(subcommand)]
    pub subcommand: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add a job to the queue.
    Enqueue(EnqueueArgs),

    /// List jobs, optionally filtered by state.
    List(ListArgs),

    /// Show per-state job counts and the active worker count.
    Status,

    /// Manage worker processes.
    #[clap(subcommand)]
    Worker(WorkerCommand),

    /// Inspect and revive dead-lettered jobs.
    #[clap(subcommand)]
    Dlq(DlqCommand),

    /// Read or write queue configuration.
    #[clap(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Args)]
pub struct EnqueueArgs {
    /// Job description as JSON: {"id": "...", "command": "...", "max_retries": N}
    #[clap(value_name = "JOB_JSON")]
    pub job_json: String,

    /// Retry budget for this job; overrides the JSON field and the
    /// configured default.
    #[clap(long, value_name = "N")]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only show jobs in this state
    /// (pending|processing|completed|failed|dead).
    #[clap(long, value_parser = parse_job_state, value_name = "STATE")]
    pub state: Option<JobState>,
}

#[derive(Debug, Subcommand)]
pub enum WorkerCommand {
    /// Start worker processes (stopping any that are already running).
    Start {
        /// Number of workers to spawn.
        #[clap(long, default_value_t = 1, value_name = "N")]
        count: usize,
    },

    /// Stop all running workers.
    Stop,

    /// Run a single worker loop in the foreground. Spawned by
    /// `worker start`; not intended to be invoked directly.
    #[clap(hide = true)]
    Run {
        #[clap(long, value_name = "ID")]
        worker_id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum DlqCommand {
    /// List jobs in the dead-letter queue.
    List,

    /// Reset a dead job to pending with a fresh retry budget.
    Retry {
        #[clap(value_name = "ID")]
        id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print a configuration value.
    Get {
        #[clap(value_name = "KEY")]
        key: String,
    },

    /// Set a configuration value.
    Set {
        #[clap(value_name = "KEY")]
        key: String,
        #[clap(value_name = "VALUE")]
        value: String,
    },
}

fn parse_job_state(value: &str) -> Result<JobState, String> {
    JobState::parse(value).map_err(|err| err.to_string())
}
