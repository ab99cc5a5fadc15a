use queuectl_state::JobState;
use thiserror::Error;

/// Operator-visible failures. Execution failures never appear here; workers
/// absorb them as job outcomes.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job with id '{id}' already exists")]
    Duplicate { id: String },

    #[error("no job with id '{id}'")]
    NotFound { id: String },

    #[error("job '{id}' is in state '{state}', not 'dead'")]
    NotDead { id: String, state: JobState },

    #[error("supervisor failure: {0}")]
    Supervisor(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
