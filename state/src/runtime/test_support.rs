use crate::JobStore;
use crate::clock::ManualClock;
use chrono::DateTime;
use chrono::Utc;
use std::sync::Arc;
use tempfile::TempDir;

/// Store over a throwaway queue home with a manual clock pinned to a fixed
/// instant. The `TempDir` must be kept alive for the duration of the test.
pub(crate) async fn test_store() -> (Arc<JobStore>, Arc<ManualClock>, TempDir) {
    let home = TempDir::new().expect("create temp queue home");
    let clock = Arc::new(ManualClock::new(
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).expect("timestamp"),
    ));
    let store = JobStore::init_with_clock(home.path().to_path_buf(), clock.clone())
        .await
        .expect("initialize job store");
    (store, clock, home)
}
