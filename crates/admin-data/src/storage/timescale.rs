//! TimescaleDB 연결 풀.

use crate::error::{DataError, Result};
use admin_core::DatabaseConfig;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::info;

/// 데이터베이스 연결 풀 래퍼.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 새로운 데이터베이스 연결 풀을 생성합니다.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!(target_db = %config.display_target(), "데이터베이스 연결 중...");

        let pool = Self::pool_options(config)
            .connect(config.connection_url().expose_secret())
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        info!("데이터베이스 연결 완료");

        Ok(Self { pool })
    }

    /// 연결을 즉시 만들지 않는 풀을 생성합니다.
    ///
    /// 첫 쿼리 시점에 연결하므로 데이터베이스가 꺼져 있어도 생성은 성공합니다.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::pool_options(config)
            .connect_lazy(config.connection_url().expose_secret())
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;
        Ok(Self { pool })
    }

    fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
    }

    /// 기존 연결 풀에서 Database 인스턴스를 생성합니다.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 내부 연결 풀을 반환합니다.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 트랜잭션을 시작합니다.
    ///
    /// 커밋하지 않고 drop되면 롤백됩니다.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// 데이터베이스 상태를 확인합니다.
    pub async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(true)
    }

    /// 풀을 닫습니다. 이미 닫혀 있으면 아무것도 하지 않습니다.
    pub async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
        }
    }

    /// 풀이 닫혔는지 확인합니다.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
