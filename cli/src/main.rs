mod cli;
mod render;

use crate::cli::Command;
use crate::cli::ConfigCommand;
use crate::cli::DlqCommand;
use crate::cli::EnqueueArgs;
use crate::cli::QueuectlCli;
use crate::cli::WorkerCommand;
use clap::Parser;
use queuectl_core::ConfigProvider;
use queuectl_core::QueueControl;
use queuectl_core::QueueError;
use queuectl_core::StopSignal;
use queuectl_core::Worker;
use queuectl_core::WorkerSupervisor;
use queuectl_core::config::DEFAULT_BACKOFF_BASE;
use queuectl_core::config::DEFAULT_MAX_RETRIES;
use queuectl_state::JobStore;
use queuectl_state::find_queue_home;
use serde::Deserialize;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = QueuectlCli::parse();
    match run_main(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_main(cli: QueuectlCli) -> anyhow::Result<()> {
    let queue_home = match cli.queue_home {
        Some(dir) => dir,
        None => find_queue_home()?,
    };

    // The detached worker logs to a file; everything else logs to stderr.
    let _log_guard = match &cli.subcommand {
        Command::Worker(WorkerCommand::Run { worker_id }) => {
            Some(init_worker_logging(queue_home.as_path(), worker_id)?)
        }
        _ => {
            init_cli_logging();
            None
        }
    };

    match cli.subcommand {
        Command::Enqueue(args) => enqueue(queue_home, args).await,
        Command::List(args) => list(queue_home, args.state).await,
        Command::Status => status(queue_home).await,
        Command::Worker(WorkerCommand::Start { count }) => worker_start(queue_home, count).await,
        Command::Worker(WorkerCommand::Stop) => worker_stop(queue_home).await,
        Command::Worker(WorkerCommand::Run { worker_id }) => {
            worker_run(queue_home, worker_id).await
        }
        Command::Dlq(DlqCommand::List) => dlq_list(queue_home).await,
        Command::Dlq(DlqCommand::Retry { id }) => dlq_retry(queue_home, &id).await,
        Command::Config(ConfigCommand::Get { key }) => config_get(queue_home.as_path(), &key),
        Command::Config(ConfigCommand::Set { key, value }) => {
            config_set(queue_home.as_path(), &key, &value)
        }
    }
}

/// The enqueue payload: `{"id": "...", "command": "...", "max_retries": N}`.
#[derive(Debug, Deserialize)]
struct EnqueueRequest {
    id: String,
    command: String,
    max_retries: Option<u32>,
}

async fn enqueue(queue_home: PathBuf, args: EnqueueArgs) -> anyhow::Result<()> {
    let request: EnqueueRequest = serde_json::from_str(&args.job_json)
        .map_err(|err| anyhow::anyhow!("invalid job JSON: {err}"))?;
    if request.id.is_empty() {
        anyhow::bail!("job id must not be empty");
    }
    if request.command.is_empty() {
        anyhow::bail!("job command must not be empty");
    }

    let control = queue_control(queue_home).await?;
    let max_retries = args.max_retries.or(request.max_retries);
    let job = control
        .enqueue(&request.id, &request.command, max_retries)
        .await?;
    println!("Enqueued job '{}' (max_retries: {})", job.id, job.max_retries);
    Ok(())
}

async fn list(queue_home: PathBuf, state: Option<queuectl_state::JobState>) -> anyhow::Result<()> {
    let control = queue_control(queue_home).await?;
    let jobs = control.list(state).await?;
    render::print_jobs_table(&jobs);
    Ok(())
}

async fn status(queue_home: PathBuf) -> anyhow::Result<()> {
    let control = queue_control(queue_home.clone()).await?;
    let stats = control.stats().await?;
    let mut supervisor = WorkerSupervisor::new(queue_home);
    render::print_status(&stats, supervisor.active_worker_count());
    Ok(())
}

async fn worker_start(queue_home: PathBuf, count: usize) -> anyhow::Result<()> {
    // Make sure the store exists before workers race to open it.
    let _store = JobStore::init(queue_home.clone()).await?;
    let mut supervisor = WorkerSupervisor::new(queue_home);
    let started = supervisor.start_workers(count).await?;
    println!("Started {started} worker(s)");
    if started < count {
        return Err(QueueError::Supervisor(format!(
            "only {started} of {count} workers started"
        ))
        .into());
    }
    Ok(())
}

async fn worker_stop(queue_home: PathBuf) -> anyhow::Result<()> {
    let mut supervisor = WorkerSupervisor::new(queue_home);
    supervisor.stop_workers().await;
    println!("All workers stopped");
    Ok(())
}

async fn worker_run(queue_home: PathBuf, worker_id: String) -> anyhow::Result<()> {
    let store = JobStore::init(queue_home.clone()).await?;
    let config = ConfigProvider::new(queue_home.as_path());
    let stop = StopSignal::new(queue_home.as_path());
    let worker = Worker::new(worker_id, store, config, stop);
    worker.run().await;
    Ok(())
}

async fn dlq_list(queue_home: PathBuf) -> anyhow::Result<()> {
    let control = queue_control(queue_home).await?;
    let jobs = control.dlq_list().await?;
    render::print_jobs_table(&jobs);
    Ok(())
}

async fn dlq_retry(queue_home: PathBuf, id: &str) -> anyhow::Result<()> {
    let control = queue_control(queue_home).await?;
    let job = control.dlq_retry(id).await?;
    println!("Requeued job '{}' from the DLQ", job.id);
    Ok(())
}

fn config_get(queue_home: &Path, key: &str) -> anyhow::Result<()> {
    let config = ConfigProvider::new(queue_home);
    let value = config.get(key).or(match key {
        "max_retries" => Some(toml::Value::Integer(i64::from(DEFAULT_MAX_RETRIES))),
        "backoff_base" => Some(toml::Value::Integer(i64::from(DEFAULT_BACKOFF_BASE))),
        _ => None,
    });
    match value {
        Some(value) => println!("{value}"),
        None => println!("null"),
    }
    Ok(())
}

fn config_set(queue_home: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let config = ConfigProvider::new(queue_home);
    config.set(key, parse_config_value(value))?;
    println!("Set {key} = {value}");
    Ok(())
}

/// Integers and booleans are stored typed; everything else is a string.
fn parse_config_value(value: &str) -> toml::Value {
    if let Ok(parsed) = value.parse::<i64>() {
        return toml::Value::Integer(parsed);
    }
    if let Ok(parsed) = value.parse::<bool>() {
        return toml::Value::Boolean(parsed);
    }
    toml::Value::String(value.to_string())
}

async fn queue_control(queue_home: PathBuf) -> anyhow::Result<QueueControl> {
    let config = ConfigProvider::new(queue_home.as_path());
    let store = JobStore::init(queue_home).await?;
    Ok(QueueControl::new(store, config))
}

fn init_cli_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

fn init_worker_logging(
    queue_home: &Path,
    worker_id: &str,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let logs_dir = queue_home.join("logs");
    std::fs::create_dir_all(&logs_dir)?;
    let appender = tracing_appender::rolling::never(&logs_dir, format!("{worker_id}.log"));
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}
