//! SQLite-backed persistence for the job queue.
//!
//! This crate is intentionally small and focused: it owns the `jobs` table,
//! the atomic claim protocol workers race on, and the clock the queue keeps
//! time with. Execution, retry policy, and process supervision live in
//! `queuectl-core`.

mod clock;
mod migrations;
mod model;
mod paths;
mod runtime;

pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use model::Job;
pub use model::JobState;
pub use model::JobStats;
pub use model::format_utc;
pub use model::parse_utc;
pub use paths::find_queue_home;
pub use paths::state_db_path;
pub use runtime::JobStore;
pub use runtime::STATE_DB_FILENAME;
