use crate::config::ConfigProvider;
use crate::error::QueueError;
use queuectl_state::Job;
use queuectl_state::JobState;
use queuectl_state::JobStats;
use queuectl_state::JobStore;
use std::sync::Arc;
use tracing::info;

/// Control-plane facade over the store for non-worker callers: enqueue,
/// listing, stats, and DLQ retry. Workers never go through this type.
pub struct QueueControl {
    store: Arc<JobStore>,
    config: ConfigProvider,
}

impl QueueControl {
    pub fn new(store: Arc<JobStore>, config: ConfigProvider) -> Self {
        Self { store, config }
    }

    /// Create a PENDING job. `max_retries` falls back to the configured
    /// default and is frozen into the record.
    pub async fn enqueue(
        &self,
        id: &str,
        command: &str,
        max_retries: Option<u32>,
    ) -> Result<Job, QueueError> {
        let max_retries = max_retries.unwrap_or_else(|| self.config.max_retries());
        let job = Job::new(
            id.to_string(),
            command.to_string(),
            max_retries,
            self.store.now(),
        );
        if self.store.add_job(&job).await? {
            info!(job_id = %job.id, "enqueued job");
            Ok(job)
        } else {
            Err(QueueError::Duplicate { id: id.to_string() })
        }
    }

    pub async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, QueueError> {
        Ok(self.store.list_jobs(state).await?)
    }

    pub async fn stats(&self) -> Result<JobStats, QueueError> {
        Ok(self.store.stats().await?)
    }

    pub async fn dlq_list(&self) -> Result<Vec<Job>, QueueError> {
        self.list(Some(JobState::Dead)).await
    }

    /// Revive a DEAD job: back to PENDING with a fresh retry budget, so the
    /// next claim picks it up like new work.
    pub async fn dlq_retry(&self, id: &str) -> Result<Job, QueueError> {
        let Some(mut job) = self.store.get_job(id).await? else {
            return Err(QueueError::NotFound { id: id.to_string() });
        };
        if job.state != JobState::Dead {
            return Err(QueueError::NotDead {
                id: id.to_string(),
                state: job.state,
            });
        }
        job.state = JobState::Pending;
        job.attempts = 0;
        job.next_retry_at = None;
        job.worker_id = None;
        job.updated_at = self.store.now();
        self.store.update_job(&job, None).await?;
        info!(job_id = %job.id, "requeued job from DLQ");
        Ok(job)
    }
}
