//! SQLite-backed `Store`: users' accounts, positions, instruments, and
//! jobs (spec §4.5). WAL mode, idempotent `CREATE TABLE IF NOT EXISTS`
//! schema, same connection-pool shape as the queue.

use async_trait::async_trait;
use chrono::Utc;
use planner_core::domain::{
    Account, AllocationMap, ChartsPayload, ErrorDetail, Instrument, Job, JobId, JobKind,
    JobStatus, NarrativePayload, Position, PortfolioSnapshot, ProjectionsPayload, SummaryPayload,
    UserId,
};
use planner_core::error::{ErrorKind, PlannerError};
use planner_core::snapshot::build_snapshot;
use planner_core::traits::{JobPayload, Store};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, PlannerError> {
        let store = Self { pool };
        store.init_db().await?;
        Ok(store)
    }

    async fn init_db(&self) -> Result<(), PlannerError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                cash_balance REAL NOT NULL,
                cash_yield_rate REAL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PlannerError::store(format!("failed to create accounts table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS positions (
                account_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                quantity REAL NOT NULL,
                as_of TEXT NOT NULL,
                PRIMARY KEY (account_id, symbol)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PlannerError::store(format!("failed to create positions table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS instruments (
                symbol TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                kind_hint TEXT NOT NULL,
                current_price REAL,
                asset_class_map TEXT NOT NULL CHECK(json_valid(asset_class_map)),
                region_map TEXT NOT NULL CHECK(json_valid(region_map)),
                sector_map TEXT NOT NULL CHECK(json_valid(sector_map))
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PlannerError::store(format!("failed to create instruments table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL CHECK(status IN ('pending', 'running', 'completed', 'failed')),
                input_json TEXT NOT NULL,
                narrative_json TEXT,
                charts_json TEXT,
                projections_json TEXT,
                summary_json TEXT,
                error_kind TEXT,
                error_cause TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                updated_at TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PlannerError::store(format!("failed to create jobs table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_positions_account ON positions(account_id);")
            .execute(&self.pool)
            .await
            .ok();
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_accounts_owner ON accounts(owner);")
            .execute(&self.pool)
            .await
            .ok();

        Ok(())
    }

    fn row_to_job(row: &SqliteRow) -> Result<Job, PlannerError> {
        let status_str: String = row.get("status");
        let status = status_str
            .parse::<JobStatus>()
            .map_err(PlannerError::internal)?;
        let kind_str: String = row.get("kind");
        let kind = match kind_str.as_str() {
            "portfolio_analysis" => JobKind::PortfolioAnalysis,
            "rebalance" => JobKind::Rebalance,
            other => return Err(PlannerError::internal(format!("unknown job kind: {other}"))),
        };
        let id = row
            .get::<String, _>("id")
            .parse()
            .map_err(|e| PlannerError::internal(format!("corrupt job id: {e}")))?;
        let owner = UserId(
            row.get::<String, _>("owner")
                .parse()
                .map_err(|e| PlannerError::internal(format!("corrupt owner id: {e}")))?,
        );
        let input = serde_json::from_str(&row.get::<String, _>("input_json"))
            .map_err(|e| PlannerError::internal(format!("corrupt job input: {e}")))?;

        let narrative: Option<NarrativePayload> = decode_optional(row, "narrative_json")?;
        let charts: Option<ChartsPayload> = decode_optional(row, "charts_json")?;
        let projections: Option<ProjectionsPayload> = decode_optional(row, "projections_json")?;
        let summary: Option<SummaryPayload> = decode_optional(row, "summary_json")?;

        let error_kind: Option<String> = row.try_get("error_kind").ok();
        let error_cause: Option<String> = row.try_get("error_cause").ok();
        let error = match (error_kind, error_cause) {
            (Some(kind_str), Some(cause)) => Some(ErrorDetail {
                kind: parse_error_kind(&kind_str)?,
                cause,
            }),
            _ => None,
        };

        Ok(Job {
            id: JobId(id),
            owner,
            kind,
            status,
            input,
            narrative,
            charts,
            projections,
            summary,
            error,
            delivery_attempts: 0,
            created_at: parse_timestamp(row, "created_at")?,
            started_at: parse_optional_timestamp(row, "started_at")?,
            completed_at: parse_optional_timestamp(row, "completed_at")?,
            updated_at: parse_timestamp(row, "updated_at")?,
        })
    }
}

fn decode_optional<T: serde::de::DeserializeOwned>(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<T>, PlannerError> {
    let raw: Option<String> = row.try_get(column).ok();
    match raw {
        Some(s) => serde_json::from_str(&s)
            .map(Some)
            .map_err(|e| PlannerError::internal(format!("corrupt {column}: {e}"))),
        None => Ok(None),
    }
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<chrono::DateTime<Utc>, PlannerError> {
    let raw: String = row.get(column);
    chrono::DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PlannerError::internal(format!("corrupt timestamp {column}: {e}")))
}

fn parse_optional_timestamp(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<chrono::DateTime<Utc>>, PlannerError> {
    let raw: Option<String> = row.try_get(column).ok();
    match raw {
        Some(s) => chrono::DateTime::parse_from_rfc3339(&s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| PlannerError::internal(format!("corrupt timestamp {column}: {e}"))),
        None => Ok(None),
    }
}

fn parse_error_kind(s: &str) -> Result<ErrorKind, PlannerError> {
    match s {
        "not_found" => Ok(ErrorKind::NotFound),
        "transient" => Ok(ErrorKind::Transient),
        "validation" => Ok(ErrorKind::Validation),
        "permanent" => Ok(ErrorKind::Permanent),
        "timeout" => Ok(ErrorKind::Timeout),
        "poison" => Ok(ErrorKind::Poison),
        "internal" => Ok(ErrorKind::Internal),
        other => Err(PlannerError::internal(format!("unknown error kind: {other}"))),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_job(&self, id: JobId) -> Result<Job, PlannerError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PlannerError::store(format!("failed to fetch job {id}: {e}")))?;

        match row {
            Some(r) => Self::row_to_job(&r),
            None => Err(PlannerError::NotFound { job_id: id.to_string() }),
        }
    }

    async fn insert_job(&self, job: &Job) -> Result<(), PlannerError> {
        let input_json = serde_json::to_string(&job.input)
            .map_err(|e| PlannerError::internal(format!("failed to serialize job input: {e}")))?;
        let now = job.created_at.to_rfc3339();
        let kind_str = match job.kind {
            JobKind::PortfolioAnalysis => "portfolio_analysis",
            JobKind::Rebalance => "rebalance",
        };

        sqlx::query(
            "INSERT INTO jobs (id, owner, kind, status, input_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.id.to_string())
        .bind(job.owner.to_string())
        .bind(kind_str)
        .bind(job.status.to_string())
        .bind(input_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| PlannerError::store(format!("failed to insert job {}: {e}", job.id)))?;

        Ok(())
    }

    async fn set_job_status(&self, id: JobId, status: JobStatus) -> Result<(), PlannerError> {
        let now = Utc::now().to_rfc3339();
        let started_clause = if status == JobStatus::Running {
            ", started_at = COALESCE(started_at, ?)"
        } else {
            ""
        };
        let completed_clause = if status.is_terminal() { ", completed_at = ?" } else { "" };

        let sql = format!(
            "UPDATE jobs SET status = ?, updated_at = ?{started_clause}{completed_clause}
             WHERE id = ? AND status NOT IN ('completed', 'failed')"
        );

        let mut query = sqlx::query(&sql).bind(status.to_string()).bind(&now);
        if status == JobStatus::Running {
            query = query.bind(&now);
        }
        if status.is_terminal() {
            query = query.bind(&now);
        }
        let result = query
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PlannerError::store(format!("failed to set status for job {id}: {e}")))?;

        if result.rows_affected() == 0 {
            tracing::debug!(job_id = %id, "set_job_status no-op: job already terminal");
        }
        Ok(())
    }

    async fn write_job_payload(&self, id: JobId, payload: JobPayload) -> Result<(), PlannerError> {
        let now = Utc::now().to_rfc3339();
        let (column, json) = match payload {
            JobPayload::Narrative(p) => (
                "narrative_json",
                serde_json::to_string(&p).map_err(|e| PlannerError::internal(e.to_string()))?,
            ),
            JobPayload::Charts(p) => (
                "charts_json",
                serde_json::to_string(&p).map_err(|e| PlannerError::internal(e.to_string()))?,
            ),
            JobPayload::Projections(p) => (
                "projections_json",
                serde_json::to_string(&p).map_err(|e| PlannerError::internal(e.to_string()))?,
            ),
            JobPayload::Summary(p) => (
                "summary_json",
                serde_json::to_string(&p).map_err(|e| PlannerError::internal(e.to_string()))?,
            ),
        };

        let sql = format!("UPDATE jobs SET {column} = ?, updated_at = ? WHERE id = ?");
        sqlx::query(&sql)
            .bind(json)
            .bind(&now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PlannerError::store(format!("failed to write payload for job {id}: {e}")))?;

        Ok(())
    }

    async fn fail_job(&self, id: JobId, error: ErrorDetail) -> Result<(), PlannerError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE jobs SET status = 'failed', error_kind = ?, error_cause = ?, completed_at = ?, updated_at = ?
             WHERE id = ? AND status NOT IN ('completed', 'failed')",
        )
        .bind(error.kind.to_string())
        .bind(error.cause)
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| PlannerError::store(format!("failed to fail job {id}: {e}")))?;

        Ok(())
    }

    async fn get_portfolio(&self, owner: UserId) -> Result<PortfolioSnapshot, PlannerError> {
        let accounts = self.list_accounts(owner).await?;
        let mut positions = Vec::new();
        for account in &accounts {
            positions.extend(self.list_positions(account.id).await?);
        }
        let symbols: Vec<String> = positions.iter().map(|p| p.symbol.clone()).collect();
        let instruments = self.get_instruments(&symbols).await?;
        Ok(build_snapshot(&accounts, &positions, &instruments))
    }

    async fn list_accounts(&self, owner: UserId) -> Result<Vec<Account>, PlannerError> {
        let rows = sqlx::query("SELECT * FROM accounts WHERE owner = ?")
            .bind(owner.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PlannerError::store(format!("failed to list accounts for {owner}: {e}")))?;

        rows.iter()
            .map(|r| {
                Ok(Account {
                    id: r
                        .get::<String, _>("id")
                        .parse()
                        .map_err(|e| PlannerError::internal(format!("corrupt account id: {e}")))?,
                    owner,
                    cash_balance: r.get("cash_balance"),
                    cash_yield_rate: r.try_get("cash_yield_rate").ok(),
                })
            })
            .collect()
    }

    async fn list_positions(&self, account_id: Uuid) -> Result<Vec<Position>, PlannerError> {
        let rows = sqlx::query("SELECT * FROM positions WHERE account_id = ?")
            .bind(account_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PlannerError::store(format!("failed to list positions for {account_id}: {e}")))?;

        rows.iter()
            .map(|r| {
                Ok(Position {
                    account_id,
                    symbol: r.get("symbol"),
                    quantity: r.get("quantity"),
                    as_of: parse_timestamp(r, "as_of")?,
                })
            })
            .collect()
    }

    async fn get_instruments(&self, symbols: &[String]) -> Result<Vec<Instrument>, PlannerError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = symbols.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!("SELECT * FROM instruments WHERE symbol IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for symbol in symbols {
            query = query.bind(symbol);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PlannerError::store(format!("failed to fetch instruments: {e}")))?;

        rows.iter().map(row_to_instrument).collect()
    }

    async fn upsert_instruments(&self, instruments: &[Instrument]) -> Result<(), PlannerError> {
        for instrument in instruments {
            let asset_class = serde_json::to_string(&instrument.asset_class_map.0)
                .map_err(|e| PlannerError::internal(e.to_string()))?;
            let region = serde_json::to_string(&instrument.region_map.0)
                .map_err(|e| PlannerError::internal(e.to_string()))?;
            let sector = serde_json::to_string(&instrument.sector_map.0)
                .map_err(|e| PlannerError::internal(e.to_string()))?;

            sqlx::query(
                "INSERT INTO instruments (symbol, display_name, kind_hint, current_price, asset_class_map, region_map, sector_map)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(symbol) DO UPDATE SET
                    display_name = excluded.display_name,
                    kind_hint = excluded.kind_hint,
                    current_price = COALESCE(excluded.current_price, instruments.current_price),
                    asset_class_map = excluded.asset_class_map,
                    region_map = excluded.region_map,
                    sector_map = excluded.sector_map",
            )
            .bind(&instrument.symbol)
            .bind(&instrument.display_name)
            .bind(&instrument.kind_hint)
            .bind(instrument.current_price)
            .bind(asset_class)
            .bind(region)
            .bind(sector)
            .execute(&self.pool)
            .await
            .map_err(|e| PlannerError::store(format!("failed to upsert instrument {}: {e}", instrument.symbol)))?;
        }
        Ok(())
    }
}

fn row_to_instrument(row: &SqliteRow) -> Result<Instrument, PlannerError> {
    let asset_class: String = row.get("asset_class_map");
    let region: String = row.get("region_map");
    let sector: String = row.get("sector_map");

    Ok(Instrument {
        symbol: row.get("symbol"),
        display_name: row.get("display_name"),
        kind_hint: row.get("kind_hint"),
        current_price: row.try_get("current_price").ok(),
        asset_class_map: AllocationMap::new(
            serde_json::from_str(&asset_class).map_err(|e| PlannerError::internal(e.to_string()))?,
        ),
        region_map: AllocationMap::new(
            serde_json::from_str(&region).map_err(|e| PlannerError::internal(e.to_string()))?,
        ),
        sector_map: AllocationMap::new(
            serde_json::from_str(&sector).map_err(|e| PlannerError::internal(e.to_string()))?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use planner_core::domain::AnalysisRequest;

    async fn test_store() -> SqliteStore {
        let pool = crate::db::connect("sqlite::memory:").await.unwrap();
        SqliteStore::new(pool).await.unwrap()
    }

    fn sample_job() -> Job {
        Job {
            id: JobId::new(),
            owner: UserId(Uuid::new_v4()),
            kind: JobKind::PortfolioAnalysis,
            status: JobStatus::Pending,
            input: AnalysisRequest {
                retirement_horizon_years: 20,
                annual_income_target: 60_000.0,
                risk_profile: Some("moderate".to_string()),
            },
            narrative: None,
            charts: None,
            projections: None,
            summary: None,
            error: None,
            delivery_attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = test_store().await;
        let job = sample_job();
        store.insert_job(&job).await.unwrap();

        let fetched = store.get_job(job.id).await.unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn get_missing_job_is_not_found() {
        let store = test_store().await;
        let err = store.get_job(JobId::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn set_job_status_is_absorbing_once_terminal() {
        let store = test_store().await;
        let job = sample_job();
        store.insert_job(&job).await.unwrap();

        store.set_job_status(job.id, JobStatus::Running).await.unwrap();
        store.set_job_status(job.id, JobStatus::Failed).await.unwrap();
        store.set_job_status(job.id, JobStatus::Running).await.unwrap();

        let fetched = store.get_job(job.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn upsert_instruments_is_idempotent_by_symbol() {
        let store = test_store().await;
        let instrument = Instrument {
            symbol: "ACME".to_string(),
            display_name: "Acme Corp".to_string(),
            kind_hint: "equity".to_string(),
            current_price: Some(42.0),
            asset_class_map: AllocationMap::default(),
            region_map: AllocationMap::default(),
            sector_map: AllocationMap::default(),
        };
        store.upsert_instruments(&[instrument.clone()]).await.unwrap();
        store.upsert_instruments(&[instrument]).await.unwrap();

        let fetched = store.get_instruments(&["ACME".to_string()]).await.unwrap();
        assert_eq!(fetched.len(), 1);
    }
}
