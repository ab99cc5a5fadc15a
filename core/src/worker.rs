use crate::config::ConfigProvider;
use crate::executor;
use crate::executor::ExecOutcome;
use crate::stop_signal::StopSignal;
use chrono::Duration as ChronoDuration;
use queuectl_state::Job;
use queuectl_state::JobState;
use queuectl_state::JobStore;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// Idle sleep between claim attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long a stopping worker lets its in-flight job run before exiting.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Pause after a store failure or processing fault before the next claim.
const FAULT_BACKOFF: Duration = Duration::from_secs(1);

/// A single job-processing loop: claim, execute, record, repeat.
///
/// One worker runs per worker OS process; concurrency comes from the
/// supervisor spawning several processes over the same store.
pub struct Worker {
    worker_id: String,
    store: Arc<JobStore>,
    config: ConfigProvider,
    stop: StopSignal,
}

impl Worker {
    pub fn new(
        worker_id: String,
        store: Arc<JobStore>,
        config: ConfigProvider,
        stop: StopSignal,
    ) -> Self {
        Self {
            worker_id,
            store,
            config,
            stop,
        }
    }

    pub fn worker_id(&self) -> &str {
        self.worker_id.as_str()
    }

    /// Run until the stop sentinel is armed or a termination signal
    /// arrives. Stop requests are honored between iterations; an in-flight
    /// job gets up to [`SHUTDOWN_GRACE`] to finish first.
    pub async fn run(&self) {
        let signal_flag = spawn_signal_listener();
        info!(worker_id = %self.worker_id, "worker started");

        loop {
            if self.should_stop(&signal_flag) {
                break;
            }

            let claimed = match self.store.claim_next(&self.worker_id).await {
                Ok(claimed) => claimed,
                Err(err) => {
                    warn!(worker_id = %self.worker_id, "claim failed: {err:#}");
                    tokio::time::sleep(FAULT_BACKOFF).await;
                    continue;
                }
            };
            let Some(job) = claimed else {
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            };

            let fut = self.process_job(job.clone());
            tokio::pin!(fut);
            tokio::select! {
                result = &mut fut => {
                    if let Err(err) = result {
                        self.record_fault(&job, &err).await;
                        tokio::time::sleep(FAULT_BACKOFF).await;
                    }
                }
                () = self.wait_for_stop(&signal_flag) => {
                    info!(worker_id = %self.worker_id, job_id = %job.id, "stop requested, finishing in-flight job");
                    match tokio::time::timeout(SHUTDOWN_GRACE, &mut fut).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => self.record_fault(&job, &err).await,
                        Err(_) => {
                            warn!(worker_id = %self.worker_id, job_id = %job.id, "shutdown grace expired with job still running");
                        }
                    }
                    break;
                }
            }
        }

        info!(worker_id = %self.worker_id, "worker stopped");
    }

    async fn process_job(&self, job: Job) -> anyhow::Result<()> {
        debug!(worker_id = %self.worker_id, job_id = %job.id, command = %job.command, "executing job");
        let outcome = executor::execute(&job.command, executor::DEFAULT_COMMAND_TIMEOUT).await?;
        self.record_outcome(job, outcome).await
    }

    /// Publish the result of one execution attempt.
    ///
    /// Success completes the job with attempts untouched. Any failure
    /// outcome burns one attempt: within budget the job is rescheduled
    /// `backoff_base^attempts` seconds out; past budget it goes to the DLQ.
    /// The backoff base is read from config here, at outcome time, so
    /// operator changes apply to the next retry.
    pub async fn record_outcome(&self, mut job: Job, outcome: ExecOutcome) -> anyhow::Result<()> {
        let now = self.store.now();
        match outcome {
            ExecOutcome::Completed => {
                job.state = JobState::Completed;
                info!(worker_id = %self.worker_id, job_id = %job.id, "job completed");
            }
            ExecOutcome::Failed { .. } | ExecOutcome::TimedOut | ExecOutcome::NotFound => {
                job.attempts += 1;
                if job.attempts <= job.max_retries {
                    let base = self.config.backoff_base();
                    let delay_seconds = i64::from(base.saturating_pow(job.attempts));
                    job.state = JobState::Failed;
                    job.next_retry_at = Some(now + ChronoDuration::seconds(delay_seconds));
                    info!(
                        worker_id = %self.worker_id,
                        job_id = %job.id,
                        attempts = job.attempts,
                        "job failed ({outcome:?}), retry in {delay_seconds}s"
                    );
                } else {
                    job.state = JobState::Dead;
                    job.next_retry_at = None;
                    warn!(
                        worker_id = %self.worker_id,
                        job_id = %job.id,
                        attempts = job.attempts,
                        "job failed ({outcome:?}), retry budget exhausted, moving to DLQ"
                    );
                }
            }
        }
        job.updated_at = now;
        self.store.update_job(&job, Some(&self.worker_id)).await
    }

    /// Best-effort FAILED write for a job whose processing faulted outside
    /// the normal outcome path. No retry is scheduled; the record stays
    /// visible for inspection.
    async fn record_fault(&self, job: &Job, err: &anyhow::Error) {
        warn!(worker_id = %self.worker_id, job_id = %job.id, "job processing fault: {err:#}");
        let mut failed = job.clone();
        failed.state = JobState::Failed;
        failed.updated_at = self.store.now();
        if let Err(update_err) = self.store.update_job(&failed, Some(&self.worker_id)).await {
            warn!(worker_id = %self.worker_id, job_id = %job.id, "could not record fault: {update_err:#}");
        }
    }

    fn should_stop(&self, signal_flag: &AtomicBool) -> bool {
        self.stop.is_set() || signal_flag.load(Ordering::Relaxed)
    }

    async fn wait_for_stop(&self, signal_flag: &Arc<AtomicBool>) {
        loop {
            if self.should_stop(signal_flag) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Flag that flips when SIGTERM or SIGINT arrives. The signal itself never
/// interrupts anything; the worker loop checks the flag at its own
/// boundaries.
fn spawn_signal_listener() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    {
        let flag = Arc::clone(&flag);
        tokio::spawn(async move {
            use tokio::signal::unix::SignalKind;
            use tokio::signal::unix::signal;

            let Ok(mut terminate) = signal(SignalKind::terminate()) else {
                return;
            };
            let Ok(mut interrupt) = signal(SignalKind::interrupt()) else {
                return;
            };
            tokio::select! {
                _ = terminate.recv() => {}
                _ = interrupt.recv() => {}
            }
            flag.store(true, Ordering::Relaxed);
        });
    }
    flag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigProvider;
    use chrono::DateTime;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use queuectl_state::Clock;
    use queuectl_state::ManualClock;
    use tempfile::TempDir;

    async fn manual_clock_worker() -> (Worker, Arc<JobStore>, Arc<ManualClock>, TempDir) {
        let home = TempDir::new().expect("tempdir");
        let clock = Arc::new(ManualClock::new(
            DateTime::<Utc>::from_timestamp(1_700_000_000, 0).expect("timestamp"),
        ));
        let store = JobStore::init_with_clock(home.path().to_path_buf(), clock.clone())
            .await
            .expect("init store");
        let worker = Worker::new(
            "worker-test-0".to_string(),
            store.clone(),
            ConfigProvider::new(home.path()),
            StopSignal::new(home.path()),
        );
        (worker, store, clock, home)
    }

    #[tokio::test]
    async fn success_completes_without_touching_attempts() {
        let (worker, store, clock, _home) = manual_clock_worker().await;
        let job = Job::new("ok".to_string(), "echo".to_string(), 3, clock.now());
        store.add_job(&job).await.expect("add");
        let claimed = store
            .claim_next(worker.worker_id())
            .await
            .expect("claim")
            .expect("job");

        worker
            .record_outcome(claimed, ExecOutcome::Completed)
            .await
            .expect("record");

        let stored = store.get_job("ok").await.expect("get").expect("present");
        assert_eq!(stored.state, JobState::Completed);
        assert_eq!(stored.attempts, 0);
        assert_eq!(stored.next_retry_at, None);
        assert_eq!(stored.worker_id.as_deref(), Some("worker-test-0"));
    }

    #[tokio::test]
    async fn failures_walk_the_exponential_backoff_ladder_into_the_dlq() {
        let (worker, store, clock, _home) = manual_clock_worker().await;
        let job = Job::new("flaky".to_string(), "exit 1".to_string(), 3, clock.now());
        store.add_job(&job).await.expect("add");

        // Attempts 1..=3 stay within budget: delays 2^1, 2^2, 2^3 seconds.
        for (attempt, delay_seconds) in [(1_u32, 2_i64), (2, 4), (3, 8)] {
            let claimed = store
                .claim_next(worker.worker_id())
                .await
                .expect("claim")
                .expect("job claimable");
            worker
                .record_outcome(claimed, ExecOutcome::Failed { exit_code: Some(1) })
                .await
                .expect("record");

            let stored = store.get_job("flaky").await.expect("get").expect("present");
            assert_eq!(stored.state, JobState::Failed);
            assert_eq!(stored.attempts, attempt);
            assert_eq!(
                stored.next_retry_at,
                Some(clock.now() + ChronoDuration::seconds(delay_seconds))
            );

            // Not claimable until the backoff elapses.
            assert_eq!(store.claim_next("other").await.expect("claim"), None);
            clock.advance(ChronoDuration::seconds(delay_seconds));
        }

        // Attempt 4 exhausts the budget.
        let claimed = store
            .claim_next(worker.worker_id())
            .await
            .expect("claim")
            .expect("job claimable");
        worker
            .record_outcome(claimed, ExecOutcome::TimedOut)
            .await
            .expect("record");

        let stored = store.get_job("flaky").await.expect("get").expect("present");
        assert_eq!(stored.state, JobState::Dead);
        assert_eq!(stored.attempts, 4);
        assert_eq!(stored.next_retry_at, None);
        assert_eq!(store.claim_next("other").await.expect("claim"), None);
    }

    #[tokio::test]
    async fn backoff_base_changes_apply_to_the_next_retry() {
        let (worker, store, clock, home) = manual_clock_worker().await;
        let job = Job::new("cfg".to_string(), "exit 1".to_string(), 3, clock.now());
        store.add_job(&job).await.expect("add");

        std::fs::write(
            home.path().join(crate::config::CONFIG_TOML_FILE),
            "backoff_base = 10\n",
        )
        .expect("write config");

        let claimed = store
            .claim_next(worker.worker_id())
            .await
            .expect("claim")
            .expect("job");
        worker
            .record_outcome(claimed, ExecOutcome::NotFound)
            .await
            .expect("record");

        let stored = store.get_job("cfg").await.expect("get").expect("present");
        assert_eq!(
            stored.next_retry_at,
            Some(clock.now() + ChronoDuration::seconds(10))
        );
    }

    #[tokio::test]
    async fn worker_loop_drains_jobs_end_to_end() {
        let home = TempDir::new().expect("tempdir");
        let store = JobStore::init(home.path().to_path_buf())
            .await
            .expect("init store");
        let stop = StopSignal::new(home.path());
        let worker = Worker::new(
            "worker-e2e-0".to_string(),
            store.clone(),
            ConfigProvider::new(home.path()),
            stop.clone(),
        );

        for id in ["e1", "e2"] {
            let job = Job::new(id.to_string(), "echo done".to_string(), 3, store.now());
            store.add_job(&job).await.expect("add");
        }

        let runner = tokio::spawn(async move { worker.run().await });

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let stats = store.stats().await.expect("stats");
            if stats.completed == 2 {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "jobs not drained in time: {stats:?}"
            );
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        stop.arm().expect("arm stop");
        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .expect("worker should exit after stop")
            .expect("worker task");
    }
}
