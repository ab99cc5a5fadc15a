mod job;

pub use job::Job;
pub use job::JobState;
pub use job::JobStats;
pub use job::format_utc;
pub use job::parse_utc;

pub(crate) use job::JobRow;
