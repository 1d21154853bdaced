//! Shared SQLite connection setup (WAL mode, busy timeout) for `store` and
//! `queue`, which each run their own idempotent `CREATE TABLE IF NOT
//! EXISTS` migration against the same pool.

use std::str::FromStr;
use std::time::Duration;

use planner_core::error::PlannerError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

pub async fn connect(db_url: &str) -> Result<SqlitePool, PlannerError> {
    let options = SqliteConnectOptions::from_str(db_url)
        .map_err(|e| PlannerError::store(format!("invalid database url {}: {}", db_url, e)))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| PlannerError::store(format!("failed to connect to sqlite: {}", e)))
}
