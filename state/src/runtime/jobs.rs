use super::*;
use crate::model::Job;
use crate::model::JobRow;
use crate::model::JobState;
use crate::model::JobStats;
use crate::model::format_utc;

const JOB_COLUMNS: &str = r#"
    id,
    command,
    state,
    attempts,
    max_retries,
    created_at,
    updated_at,
    next_retry_at,
    worker_id
"#;

impl JobStore {
    /// Insert a new record. Returns `false` iff a job with the same id
    /// already exists; any other failure is a store error.
    pub async fn add_job(&self, job: &Job) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
INSERT INTO jobs (
    id,
    command,
    state,
    attempts,
    max_retries,
    created_at,
    updated_at,
    next_retry_at,
    worker_id
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.as_str())
        .bind(job.command.as_str())
        .bind(job.state.as_str())
        .bind(i64::from(job.attempts))
        .bind(i64::from(job.max_retries))
        .bind(format_utc(job.created_at))
        .bind(format_utc(job.updated_at))
        .bind(job.next_retry_at.map(format_utc))
        .bind(job.worker_id.as_deref())
        .execute(self.pool())
        .await;
        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Snapshot read of a single record.
    pub async fn get_job(&self, job_id: &str) -> anyhow::Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"
        ))
        .bind(job_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(Job::try_from).transpose()
    }

    /// Unconditionally overwrite the mutable fields of a record. Workers use
    /// this to publish outcomes; the control plane uses it for DLQ retry.
    pub async fn update_job(&self, job: &Job, worker_id: Option<&str>) -> anyhow::Result<()> {
        sqlx::query(
            r#"
UPDATE jobs
SET state = ?, attempts = ?, updated_at = ?, next_retry_at = ?, worker_id = ?
WHERE id = ?
            "#,
        )
        .bind(job.state.as_str())
        .bind(i64::from(job.attempts))
        .bind(format_utc(job.updated_at))
        .bind(job.next_retry_at.map(format_utc))
        .bind(worker_id)
        .bind(job.id.as_str())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Atomically claim the next runnable job for `worker_id`.
    ///
    /// Candidates are evaluated against the store clock inside one immediate
    /// transaction: fresh PENDING work first, then FAILED jobs whose backoff
    /// has elapsed, FIFO by `created_at` within each set. The transition to
    /// PROCESSING compare-and-sets on `state`; if another claimer won the
    /// race this returns `None` and the caller retries on its poll interval.
    pub async fn claim_next(&self, worker_id: &str) -> anyhow::Result<Option<Job>> {
        let now = self.now();
        let now_text = format_utc(now);
        let mut tx = self.pool().begin_with("BEGIN IMMEDIATE").await?;

        let mut row: Option<JobRow> = sqlx::query_as::<_, JobRow>(&format!(
            r#"
SELECT {JOB_COLUMNS}
FROM jobs
WHERE state = ? AND (next_retry_at IS NULL OR next_retry_at <= ?)
ORDER BY created_at ASC
LIMIT 1
            "#
        ))
        .bind(JobState::Pending.as_str())
        .bind(now_text.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if row.is_none() {
            row = sqlx::query_as::<_, JobRow>(&format!(
                r#"
SELECT {JOB_COLUMNS}
FROM jobs
WHERE state = ? AND next_retry_at <= ?
ORDER BY created_at ASC
LIMIT 1
                "#
            ))
            .bind(JobState::Failed.as_str())
            .bind(now_text.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        }

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let result = sqlx::query(
            r#"
UPDATE jobs
SET state = ?, worker_id = ?, updated_at = ?
WHERE id = ? AND state = ?
            "#,
        )
        .bind(JobState::Processing.as_str())
        .bind(worker_id)
        .bind(now_text.as_str())
        .bind(row.id.as_str())
        .bind(row.state.as_str())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;

        let mut job = Job::try_from(row)?;
        job.state = JobState::Processing;
        job.worker_id = Some(worker_id.to_string());
        job.updated_at = now;
        Ok(Some(job))
    }

    /// All jobs, optionally filtered by state, newest first.
    pub async fn list_jobs(&self, state: Option<JobState>) -> anyhow::Result<Vec<Job>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {JOB_COLUMNS} FROM jobs"));
        if let Some(state) = state {
            builder.push(" WHERE state = ");
            builder.push_bind(state.as_str());
        }
        builder.push(" ORDER BY created_at DESC");
        let rows: Vec<JobRow> = builder
            .build_query_as::<JobRow>()
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(Job::try_from).collect()
    }

    /// Aggregate counts by state.
    pub async fn stats(&self) -> anyhow::Result<JobStats> {
        let row = sqlx::query(
            r#"
SELECT
    SUM(CASE WHEN state = ? THEN 1 ELSE 0 END) AS pending,
    SUM(CASE WHEN state = ? THEN 1 ELSE 0 END) AS processing,
    SUM(CASE WHEN state = ? THEN 1 ELSE 0 END) AS completed,
    SUM(CASE WHEN state = ? THEN 1 ELSE 0 END) AS failed,
    SUM(CASE WHEN state = ? THEN 1 ELSE 0 END) AS dead
FROM jobs
            "#,
        )
        .bind(JobState::Pending.as_str())
        .bind(JobState::Processing.as_str())
        .bind(JobState::Completed.as_str())
        .bind(JobState::Failed.as_str())
        .bind(JobState::Dead.as_str())
        .fetch_one(self.pool())
        .await?;

        let count = |name: &str| -> anyhow::Result<u64> {
            let value: Option<i64> = row.try_get(name)?;
            Ok(u64::try_from(value.unwrap_or_default()).unwrap_or_default())
        };
        Ok(JobStats {
            pending: count("pending")?,
            processing: count("processing")?,
            completed: count("completed")?,
            failed: count("failed")?,
            dead: count("dead")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_store;
    use crate::clock::Clock;
    use crate::model::Job;
    use crate::model::JobState;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn add_then_get_round_trips_every_field() {
        let (store, clock, _home) = test_store().await;
        let mut job = Job::new("t1".to_string(), "echo hi".to_string(), 3, clock.now());
        job.next_retry_at = Some(clock.now() + Duration::seconds(30));
        job.worker_id = Some("worker-1-0".to_string());

        assert_eq!(store.add_job(&job).await.expect("add"), true);
        let loaded = store.get_job("t1").await.expect("get").expect("present");
        assert_eq!(loaded, job);
    }

    #[tokio::test]
    async fn add_job_reports_duplicate_id_without_clobbering() {
        let (store, clock, _home) = test_store().await;
        let original = Job::new("dup".to_string(), "echo one".to_string(), 3, clock.now());
        assert_eq!(store.add_job(&original).await.expect("add"), true);

        let imposter = Job::new("dup".to_string(), "echo two".to_string(), 5, clock.now());
        assert_eq!(store.add_job(&imposter).await.expect("add dup"), false);

        let loaded = store.get_job("dup").await.expect("get").expect("present");
        assert_eq!(loaded.command, "echo one");
    }

    #[tokio::test]
    async fn get_job_returns_none_for_unknown_id() {
        let (store, _clock, _home) = test_store().await;
        assert_eq!(store.get_job("ghost").await.expect("get"), None);
    }

    #[tokio::test]
    async fn claim_marks_job_processing_and_records_claimant() {
        let (store, clock, _home) = test_store().await;
        let job = Job::new("c1".to_string(), "echo hi".to_string(), 3, clock.now());
        store.add_job(&job).await.expect("add");

        let claimed = store
            .claim_next("worker-9-0")
            .await
            .expect("claim")
            .expect("job available");
        assert_eq!(claimed.id, "c1");
        assert_eq!(claimed.state, JobState::Processing);
        assert_eq!(claimed.worker_id.as_deref(), Some("worker-9-0"));

        let stored = store.get_job("c1").await.expect("get").expect("present");
        assert_eq!(stored.state, JobState::Processing);
        assert_eq!(stored.worker_id.as_deref(), Some("worker-9-0"));
    }

    #[tokio::test]
    async fn claim_is_fifo_by_created_at() {
        let (store, clock, _home) = test_store().await;
        for id in ["first", "second", "third"] {
            let job = Job::new(id.to_string(), "echo".to_string(), 3, clock.now());
            store.add_job(&job).await.expect("add");
            clock.advance(Duration::milliseconds(5));
        }

        for expected in ["first", "second", "third"] {
            let claimed = store
                .claim_next("w")
                .await
                .expect("claim")
                .expect("job available");
            assert_eq!(claimed.id, expected);
        }
        assert_eq!(store.claim_next("w").await.expect("claim"), None);
    }

    #[tokio::test]
    async fn claim_prefers_fresh_pending_over_retry_ready_failed() {
        let (store, clock, _home) = test_store().await;
        let mut failed = Job::new("old-fail".to_string(), "false".to_string(), 3, clock.now());
        store.add_job(&failed).await.expect("add");
        clock.advance(Duration::seconds(1));
        let pending = Job::new("fresh".to_string(), "echo".to_string(), 3, clock.now());
        store.add_job(&pending).await.expect("add");

        failed.state = JobState::Failed;
        failed.attempts = 1;
        failed.next_retry_at = Some(clock.now() - Duration::seconds(10));
        store.update_job(&failed, None).await.expect("update");

        let first = store.claim_next("w").await.expect("claim").expect("job");
        assert_eq!(first.id, "fresh");
        let second = store.claim_next("w").await.expect("claim").expect("job");
        assert_eq!(second.id, "old-fail");
    }

    #[tokio::test]
    async fn failed_job_is_not_claimable_until_backoff_elapses() {
        let (store, clock, _home) = test_store().await;
        let mut job = Job::new("r1".to_string(), "false".to_string(), 3, clock.now());
        store.add_job(&job).await.expect("add");

        job.state = JobState::Failed;
        job.attempts = 1;
        job.next_retry_at = Some(clock.now() + Duration::seconds(4));
        store.update_job(&job, Some("w0")).await.expect("update");

        assert_eq!(store.claim_next("w1").await.expect("claim"), None);
        clock.advance(Duration::seconds(5));
        let claimed = store.claim_next("w1").await.expect("claim").expect("job");
        assert_eq!(claimed.id, "r1");
    }

    #[tokio::test]
    async fn failed_job_without_retry_schedule_stays_parked() {
        let (store, clock, _home) = test_store().await;
        let mut job = Job::new("wedged".to_string(), "false".to_string(), 3, clock.now());
        store.add_job(&job).await.expect("add");

        job.state = JobState::Failed;
        store.update_job(&job, None).await.expect("update");

        clock.advance(Duration::days(1));
        assert_eq!(store.claim_next("w").await.expect("claim"), None);
    }

    #[tokio::test]
    async fn concurrent_claims_never_hand_out_the_same_job() {
        let (store, clock, _home) = test_store().await;
        let job = Job::new("solo".to_string(), "echo".to_string(), 3, clock.now());
        store.add_job(&job).await.expect("add");

        let (left, right) = tokio::join!(store.claim_next("w-left"), store.claim_next("w-right"));
        let left = left.expect("left claim");
        let right = right.expect("right claim");
        assert!(
            left.is_some() ^ right.is_some(),
            "exactly one claimer must win: left={left:?} right={right:?}"
        );
    }

    #[tokio::test]
    async fn terminal_states_are_never_claimed() {
        let (store, clock, _home) = test_store().await;
        for (id, state) in [("done", JobState::Completed), ("gone", JobState::Dead)] {
            let mut job = Job::new(id.to_string(), "echo".to_string(), 3, clock.now());
            store.add_job(&job).await.expect("add");
            job.state = state;
            store.update_job(&job, None).await.expect("update");
        }
        assert_eq!(store.claim_next("w").await.expect("claim"), None);
    }

    #[tokio::test]
    async fn list_jobs_orders_newest_first_and_filters_by_state() {
        let (store, clock, _home) = test_store().await;
        for id in ["a", "b", "c"] {
            let job = Job::new(id.to_string(), "echo".to_string(), 3, clock.now());
            store.add_job(&job).await.expect("add");
            clock.advance(Duration::seconds(1));
        }
        let mut b = store.get_job("b").await.expect("get").expect("present");
        b.state = JobState::Completed;
        store.update_job(&b, None).await.expect("update");

        let all = store.list_jobs(None).await.expect("list");
        let ids: Vec<&str> = all.iter().map(|job| job.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);

        let completed = store
            .list_jobs(Some(JobState::Completed))
            .await
            .expect("list completed");
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, "b");
    }

    #[tokio::test]
    async fn stats_counts_every_state() {
        let (store, clock, _home) = test_store().await;
        let states = [
            ("p1", JobState::Pending),
            ("p2", JobState::Pending),
            ("x1", JobState::Processing),
            ("c1", JobState::Completed),
            ("f1", JobState::Failed),
            ("d1", JobState::Dead),
        ];
        for (id, state) in states {
            let mut job = Job::new(id.to_string(), "echo".to_string(), 3, clock.now());
            store.add_job(&job).await.expect("add");
            if state != JobState::Pending {
                job.state = state;
                store.update_job(&job, None).await.expect("update");
            }
        }

        let stats = store.stats().await.expect("stats");
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.dead, 1);
    }

    #[tokio::test]
    async fn stats_on_empty_store_is_all_zero() {
        let (store, _clock, _home) = test_store().await;
        let stats = store.stats().await.expect("stats");
        assert_eq!(stats, crate::model::JobStats::default());
    }
}
