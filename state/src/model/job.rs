use anyhow::Result;
use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

impl JobState {
    pub const fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "dead" => Ok(Self::Dead),
            _ => Err(anyhow::anyhow!("invalid job state: {value}")),
        }
    }

    /// Completed and dead jobs never transition again (dead only via an
    /// explicit DLQ retry, which is not a worker transition).
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Dead)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued shell command and its retry bookkeeping. The sole persisted
/// entity; rows are created by enqueue and never deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub command: String,
    pub state: JobState,
    pub attempts: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
}

impl Job {
    pub fn new(id: String, command: String, max_retries: u32, now: DateTime<Utc>) -> Self {
        Self {
            id,
            command,
            state: JobState::Pending,
            attempts: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            next_retry_at: None,
            worker_id: None,
        }
    }
}

/// Aggregate per-state counts; every state is present even when zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub dead: u64,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct JobRow {
    pub(crate) id: String,
    pub(crate) command: String,
    pub(crate) state: String,
    pub(crate) attempts: i64,
    pub(crate) max_retries: i64,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) next_retry_at: Option<String>,
    pub(crate) worker_id: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = anyhow::Error;

    fn try_from(value: JobRow) -> Result<Self, Self::Error> {
        Ok(Self {
            state: JobState::parse(value.state.as_str())?,
            attempts: u32::try_from(value.attempts)
                .map_err(|_| anyhow::anyhow!("invalid attempts value: {}", value.attempts))?,
            max_retries: u32::try_from(value.max_retries)
                .map_err(|_| anyhow::anyhow!("invalid max_retries value: {}", value.max_retries))?,
            created_at: parse_utc(value.created_at.as_str())?,
            updated_at: parse_utc(value.updated_at.as_str())?,
            next_retry_at: value.next_retry_at.as_deref().map(parse_utc).transpose()?,
            id: value.id,
            command: value.command,
            worker_id: value.worker_id,
        })
    }
}

/// Serialize an instant the way the `jobs` table stores it: fixed-width
/// ISO-8601 UTC with microseconds and a single trailing `Z`. Fixed width
/// keeps SQL string comparison in agreement with chronological order.
pub fn format_utc(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Accepts both `Z` and `+00:00` suffixes.
pub fn parse_utc(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| anyhow::anyhow!("invalid timestamp {value:?}: {err}"))
}
