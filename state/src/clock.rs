use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use std::sync::Mutex;

/// Time source for everything the queue stamps or compares.
///
/// The store evaluates claim eligibility against `now()`, workers schedule
/// retries from it, and `created_at` doubles as the FIFO tiebreaker, so the
/// clock must be injectable for deterministic tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock UTC, made strictly monotone within the process so two jobs
/// enqueued back-to-back never share a `created_at`.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut now = Utc::now();
        if let Some(prev) = *last
            && now <= prev
        {
            now = prev + Duration::microseconds(1);
        }
        *last = Some(now);
        now
    }
}

/// Manually advanced clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *now += delta;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *now = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
