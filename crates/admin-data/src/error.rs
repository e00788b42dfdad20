//! 데이터 모듈 오류 타입.

use admin_core::AdminError;
use thiserror::Error;

/// 데이터 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 데이터베이스 연결 오류
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// 쿼리 실행 오류
    #[error("Query error: {0}")]
    QueryError(String),

    /// 데이터 삽입 오류
    #[error("Insert error: {0}")]
    InsertError(String),

    /// 스키마 초기화 오류
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// 잘못된 데이터 또는 인자
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// 연결 풀 소진
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// 연결 풀이 닫힘
    #[error("Connection pool is closed")]
    PoolClosed,
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DataError::PoolExhausted,
            sqlx::Error::PoolClosed => DataError::PoolClosed,
            sqlx::Error::Io(e) => DataError::ConnectionError(e.to_string()),
            sqlx::Error::Tls(e) => DataError::ConnectionError(e.to_string()),
            sqlx::Error::Database(db_err) => DataError::QueryError(db_err.message().to_string()),
            _ => DataError::QueryError(err.to_string()),
        }
    }
}

impl From<DataError> for AdminError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::InvalidData(msg) => AdminError::Validation(msg),
            other => AdminError::Database(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
