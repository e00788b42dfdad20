//! 데이터베이스 작업 추상화.
//!
//! 관리자들은 SQL이나 스키마를 알지 못하고 이 trait만 사용합니다.
//! TimescaleDB 구현은 `admin-data` 크레이트에 있습니다.

use super::lifecycle::Cleanable;
use crate::error::AdminResult;
use crate::types::BarRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 기간.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// 두 기간을 합칩니다.
    pub fn merge(self, other: DateRange) -> DateRange {
        DateRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// 테이블별 계약 통계.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStatistics {
    pub table: String,
    pub records: u64,
    pub date_range: Option<DateRange>,
}

/// 계약 하나의 저장 데이터 통계.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStatistics {
    pub contract: String,
    pub total_records: u64,
    pub latest_timestamp: Option<DateTime<Utc>>,
    pub date_range: Option<DateRange>,
    pub tables: Vec<TableStatistics>,
}

impl DataStatistics {
    /// 테이블별 통계로부터 합계를 계산합니다.
    pub fn from_tables(contract: impl Into<String>, tables: Vec<TableStatistics>) -> Self {
        let total_records = tables.iter().map(|t| t.records).sum();
        let date_range = tables
            .iter()
            .filter_map(|t| t.date_range)
            .reduce(DateRange::merge);
        Self {
            contract: contract.into(),
            total_records,
            latest_timestamp: date_range.map(|r| r.end),
            date_range,
            tables,
        }
    }

    /// 저장된 데이터가 없는 계약.
    pub fn empty(contract: impl Into<String>) -> Self {
        Self::from_tables(contract, Vec::new())
    }
}

/// 테이블 요약.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    pub name: String,
    pub row_count: i64,
    pub is_hypertable: bool,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

/// 데이터베이스 전체 요약.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSummary {
    pub server_version: String,
    pub timescale_version: Option<String>,
    pub database_size: Option<String>,
    pub tables: Vec<TableSummary>,
}

impl DatabaseSummary {
    /// 전체 행 수.
    pub fn total_rows(&self) -> i64 {
        self.tables.iter().map(|t| t.row_count).sum()
    }
}

/// 데이터베이스 작업.
#[async_trait]
pub trait DatabaseOperations: Cleanable {
    /// 연결을 확인하고 서버 정보를 담은 메시지를 반환합니다.
    async fn test_connection(&self) -> AdminResult<String>;

    /// 확장, 테이블, 하이퍼테이블, 인덱스를 생성합니다.
    async fn initialize_database(&self) -> AdminResult<String>;

    /// 레코드를 일괄 삽입하고 삽입된 행 수를 반환합니다. 중복은 무시됩니다.
    async fn bulk_insert(&self, records: &[BarRecord], table: &str) -> AdminResult<u64>;

    /// 계약의 저장 데이터 통계.
    async fn get_data_statistics(&self, contract: &str) -> AdminResult<DataStatistics>;

    /// 데이터베이스 요약.
    async fn get_database_summary(&self) -> AdminResult<DatabaseSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_statistics_merge_tables() {
        let d = |day| Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap();
        let stats = DataStatistics::from_tables(
            "NQH24",
            vec![
                TableStatistics {
                    table: "market_data_seconds".to_string(),
                    records: 10,
                    date_range: Some(DateRange { start: d(3), end: d(5) }),
                },
                TableStatistics {
                    table: "market_data_minutes".to_string(),
                    records: 5,
                    date_range: Some(DateRange { start: d(1), end: d(4) }),
                },
            ],
        );

        assert_eq!(stats.total_records, 15);
        assert_eq!(stats.date_range, Some(DateRange { start: d(1), end: d(5) }));
        assert_eq!(stats.latest_timestamp, Some(d(5)));
    }

    #[test]
    fn test_empty_statistics() {
        let stats = DataStatistics::empty("ESM25");
        assert_eq!(stats.total_records, 0);
        assert!(stats.latest_timestamp.is_none());
    }
}
