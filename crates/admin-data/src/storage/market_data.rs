//! 시장 데이터 저장소 ([`DatabaseOperations`] 구현).

use super::schema::{self, BAR_TABLES, MANAGED_TABLES};
use super::timescale::Database;
use crate::error::{DataError, Result};
use admin_core::{
    split_contract_exchange, AdminResult, BarRecord, Cleanable, CleanupOutcome, DataStatistics,
    DatabaseConfig, DatabaseOperations, DatabaseSummary, DateRange, TableStatistics, TableSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

/// 기본 삽입 배치 크기.
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 500;

/// TimescaleDB 기반 데이터베이스 작업.
#[derive(Clone)]
pub struct TimescaleOperations {
    db: Database,
    batch_size: usize,
}

impl TimescaleOperations {
    /// 연결 풀로부터 생성합니다.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            batch_size: DEFAULT_INSERT_BATCH_SIZE,
        }
    }

    /// 설정으로부터 생성합니다. 실제 연결은 첫 작업 시점에 이루어집니다.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Ok(Self::new(Database::connect_lazy(config)?))
    }

    /// 삽입 배치 크기를 설정합니다 (최소 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// 내부 데이터베이스 핸들.
    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn server_version(&self) -> Result<String> {
        let (version,): (String,) = sqlx::query_as("SELECT version()")
            .fetch_one(self.db.pool())
            .await?;
        // "PostgreSQL 16.2 on x86_64-pc-linux-gnu, ..." → "PostgreSQL 16.2"
        Ok(version.split_whitespace().take(2).collect::<Vec<_>>().join(" "))
    }

    async fn timescale_version(&self) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT extversion FROM pg_extension WHERE extname = 'timescaledb'")
                .fetch_optional(self.db.pool())
                .await?;
        Ok(row.map(|(v,)| v))
    }

    async fn insert_bars(&self, records: &[BarRecord], table: &str) -> Result<u64> {
        if !schema::is_bar_table(table) {
            return Err(DataError::InvalidData(format!("Unknown bar table: {}", table)));
        }
        if records.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            r#"
            INSERT INTO {table}
                (timestamp, symbol, contract, exchange, exchange_code,
                 open, high, low, close, volume, data_quality_score, is_regular_hours)
            SELECT * FROM UNNEST(
                $1::timestamptz[], $2::text[], $3::text[], $4::text[], $5::text[],
                $6::numeric[], $7::numeric[], $8::numeric[], $9::numeric[],
                $10::bigint[], $11::float8[], $12::bool[]
            )
            ON CONFLICT (timestamp, symbol, contract, exchange) DO NOTHING
            "#
        );

        let mut tx = self.db.begin().await?;
        let mut inserted = 0u64;

        for chunk in records.chunks(self.batch_size) {
            let timestamps: Vec<DateTime<Utc>> = chunk.iter().map(|r| r.timestamp).collect();
            let symbols: Vec<&str> = chunk.iter().map(|r| r.symbol.as_str()).collect();
            let contracts: Vec<&str> = chunk.iter().map(|r| r.contract.as_str()).collect();
            let exchanges: Vec<&str> = chunk.iter().map(|r| r.exchange.as_str()).collect();
            let codes: Vec<&str> = chunk.iter().map(|r| r.exchange_code.as_str()).collect();
            let opens: Vec<Decimal> = chunk.iter().map(|r| r.open).collect();
            let highs: Vec<Decimal> = chunk.iter().map(|r| r.high).collect();
            let lows: Vec<Decimal> = chunk.iter().map(|r| r.low).collect();
            let closes: Vec<Decimal> = chunk.iter().map(|r| r.close).collect();
            let volumes: Vec<i64> = chunk.iter().map(|r| r.volume).collect();
            let scores: Vec<f64> = chunk.iter().map(|r| r.data_quality_score).collect();
            let regular: Vec<bool> = chunk.iter().map(|r| r.is_regular_hours).collect();

            let result = sqlx::query(&sql)
                .bind(&timestamps)
                .bind(&symbols)
                .bind(&contracts)
                .bind(&exchanges)
                .bind(&codes)
                .bind(&opens)
                .bind(&highs)
                .bind(&lows)
                .bind(&closes)
                .bind(&volumes)
                .bind(&scores)
                .bind(&regular)
                .execute(&mut *tx)
                .await
                .map_err(|e| DataError::InsertError(e.to_string()))?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn table_statistics(&self, table: &str, contract: &str) -> Result<TableStatistics> {
        let (symbol, exchange) = split_contract_exchange(contract);
        let explicit_exchange = contract.contains('.');

        let sql = if explicit_exchange {
            format!(
                "SELECT COUNT(*)::BIGINT, MIN(timestamp), MAX(timestamp) FROM {table} \
                 WHERE contract = $1 AND exchange = $2"
            )
        } else {
            format!(
                "SELECT COUNT(*)::BIGINT, MIN(timestamp), MAX(timestamp) FROM {table} \
                 WHERE contract = $1"
            )
        };

        let mut query = sqlx::query_as::<_, (i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>)>(&sql)
            .bind(&symbol);
        if explicit_exchange {
            query = query.bind(&exchange);
        }
        let (count, earliest, latest) = query.fetch_one(self.db.pool()).await?;

        Ok(TableStatistics {
            table: table.to_string(),
            records: count.max(0) as u64,
            date_range: earliest
                .zip(latest)
                .map(|(start, end)| DateRange { start, end }),
        })
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = $1)",
        )
        .bind(table)
        .fetch_one(self.db.pool())
        .await?;
        Ok(exists)
    }

    async fn hypertable_names(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT hypertable_name::TEXT FROM timescaledb_information.hypertables")
                .fetch_all(self.db.pool())
                .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn table_summary(&self, table: &str, hypertables: &[String]) -> Result<TableSummary> {
        let sql = format!("SELECT COUNT(*)::BIGINT, MIN(timestamp), MAX(timestamp) FROM {table}");
        let (row_count, earliest, latest): (i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>) =
            sqlx::query_as(&sql).fetch_one(self.db.pool()).await?;

        Ok(TableSummary {
            name: table.to_string(),
            row_count,
            is_hypertable: hypertables.iter().any(|h| h == table),
            earliest,
            latest,
        })
    }
}

#[async_trait]
impl DatabaseOperations for TimescaleOperations {
    #[instrument(skip(self))]
    async fn test_connection(&self) -> AdminResult<String> {
        self.db.health_check().await?;
        let version = self.server_version().await?;
        let message = match self.timescale_version().await? {
            Some(ts) => format!("Database connection successful ({}, TimescaleDB {})", version, ts),
            None => format!("Database connection successful ({}, TimescaleDB not installed)", version),
        };
        debug!(%message, "데이터베이스 연결 확인");
        Ok(message)
    }

    #[instrument(skip(self))]
    async fn initialize_database(&self) -> AdminResult<String> {
        let statements = schema::initialization_statements();
        let mut tx = self.db.begin().await?;

        for statement in &statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| DataError::SchemaError(e.to_string()))?;
        }

        tx.commit().await.map_err(DataError::from)?;

        info!(statements = statements.len(), "데이터베이스 초기화 완료");
        Ok(format!(
            "Database initialized: {} tables ready ({})",
            MANAGED_TABLES.len(),
            MANAGED_TABLES.join(", ")
        ))
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn bulk_insert(&self, records: &[BarRecord], table: &str) -> AdminResult<u64> {
        let inserted = self.insert_bars(records, table).await?;
        debug!(table, inserted, "바 데이터 저장");
        Ok(inserted)
    }

    async fn get_data_statistics(&self, contract: &str) -> AdminResult<DataStatistics> {
        let mut tables = Vec::with_capacity(BAR_TABLES.len());
        for table in BAR_TABLES {
            if !self.table_exists(table).await? {
                warn!(table, "테이블이 없습니다. `init`을 먼저 실행하세요");
                continue;
            }
            tables.push(self.table_statistics(table, contract).await?);
        }
        Ok(DataStatistics::from_tables(contract, tables))
    }

    async fn get_database_summary(&self) -> AdminResult<DatabaseSummary> {
        let server_version = self.server_version().await?;
        let timescale_version = self.timescale_version().await?;

        let (database_size,): (Option<String>,) =
            sqlx::query_as("SELECT pg_size_pretty(pg_database_size(current_database()))")
                .fetch_one(self.db.pool())
                .await
                .map_err(DataError::from)?;

        let hypertables = if timescale_version.is_some() {
            self.hypertable_names().await?
        } else {
            Vec::new()
        };

        let mut tables = Vec::new();
        for table in MANAGED_TABLES {
            if self.table_exists(table).await? {
                tables.push(self.table_summary(table, &hypertables).await?);
            }
        }

        Ok(DatabaseSummary {
            server_version,
            timescale_version,
            database_size,
            tables,
        })
    }
}

#[async_trait]
impl Cleanable for TimescaleOperations {
    fn component_name(&self) -> &'static str {
        "database"
    }

    async fn cleanup(&self) -> AdminResult<CleanupOutcome> {
        if self.db.is_closed() {
            return Ok(CleanupOutcome::NothingToRelease);
        }
        self.db.close().await;
        info!("데이터베이스 연결 풀 종료");
        Ok(CleanupOutcome::Released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy_ops() -> TimescaleOperations {
        let config = DatabaseConfig {
            min_connections: 0,
            ..Default::default()
        };
        TimescaleOperations::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_table_is_rejected_before_query() {
        let ops = lazy_ops();
        let err = ops.bulk_insert(&[], "orders").await.unwrap_err();
        assert_eq!(err.category(), admin_core::ErrorCategory::Validation);
    }

    #[tokio::test]
    async fn test_empty_insert_is_noop() {
        let ops = lazy_ops();
        assert_eq!(ops.bulk_insert(&[], "market_data_minutes").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let ops = lazy_ops().with_batch_size(0);
        assert_eq!(ops.batch_size, 1);
        assert_eq!(ops.cleanup().await.unwrap(), CleanupOutcome::Released);
        assert_eq!(ops.cleanup().await.unwrap(), CleanupOutcome::NothingToRelease);
    }
}
