use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::migrations::MIGRATOR;
use chrono::DateTime;
use chrono::Utc;
use log::LevelFilter;
use sqlx::ConnectOptions;
use sqlx::QueryBuilder;
use sqlx::Row;
use sqlx::Sqlite;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqliteJournalMode;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::sqlite::SqliteSynchronous;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

mod jobs;
#[cfg(test)]
mod test_support;

pub const STATE_DB_FILENAME: &str = "queue.sqlite";

/// Durable job store shared by the control plane and every worker process.
///
/// Concurrency safety across OS processes comes from SQLite itself: every
/// mutating call runs inside a transaction, and the claim path takes the
/// write lock up front (`BEGIN IMMEDIATE`) and compare-and-sets on `state`.
#[derive(Clone)]
pub struct JobStore {
    queue_home: PathBuf,
    pool: Arc<SqlitePool>,
    clock: Arc<dyn Clock>,
}

impl JobStore {
    /// Open (and migrate) the SQLite database at `queue_home/queue.sqlite`.
    pub async fn init(queue_home: PathBuf) -> anyhow::Result<Arc<Self>> {
        Self::init_with_clock(queue_home, Arc::new(SystemClock::default())).await
    }

    pub async fn init_with_clock(
        queue_home: PathBuf,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Arc<Self>> {
        tokio::fs::create_dir_all(&queue_home).await?;
        let db_path = crate::paths::state_db_path(queue_home.as_path());
        let pool = match open_sqlite(&db_path).await {
            Ok(pool) => Arc::new(pool),
            Err(err) => {
                warn!("failed to open job store at {}: {err}", db_path.display());
                return Err(err);
            }
        };
        Ok(Arc::new(Self {
            queue_home,
            pool,
            clock,
        }))
    }

    pub fn queue_home(&self) -> &Path {
        self.queue_home.as_path()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        self.pool.as_ref()
    }
}

async fn open_sqlite(path: &Path) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5))
        .log_statements(LevelFilter::Off);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}
