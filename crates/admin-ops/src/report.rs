//! 작업 결과 텍스트 보고서.

use admin_core::{DataStatistics, DatabaseSummary, SymbolRecord, SystemStatus};
use admin_gateway::ConnectionStatusReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;

/// 선택된 심볼 하나와 데이터베이스 교차 확인 결과.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolCheck {
    pub record: SymbolRecord,
    pub statistics: Option<DataStatistics>,
    /// 통계 조회 실패 사유
    pub error: Option<String>,
}

impl SymbolCheck {
    pub fn has_data(&self) -> bool {
        self.statistics
            .as_ref()
            .map(|s| s.total_records > 0)
            .unwrap_or(false)
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// 심볼 검색 및 데이터베이스 확인 보고서.
pub fn format_symbol_report(
    term: &str,
    exchange: &str,
    total_found: usize,
    checks: &[SymbolCheck],
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Found {} symbols matching '{}' on {}, selected {}:",
        total_found,
        term,
        exchange,
        checks.len()
    );

    for check in checks {
        let record = &check.record;
        let expiry = record
            .expiration
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let name = record.full_name.as_deref().unwrap_or(&record.base_symbol);
        let _ = write!(
            out,
            "  {:<8} {:<6} expires {}  {}",
            record.symbol, record.exchange, expiry, name
        );

        match (&check.statistics, &check.error) {
            (Some(stats), _) if stats.total_records > 0 => {
                let range = stats
                    .date_range
                    .map(|r| format!("{} -> {}", format_timestamp(r.start), format_timestamp(r.end)))
                    .unwrap_or_else(|| "n/a".to_string());
                let _ = writeln!(out, "\n           {} records in database ({})", stats.total_records, range);
            }
            (Some(_), _) => {
                let _ = writeln!(out, "\n           no data in database");
            }
            (None, Some(err)) => {
                let _ = writeln!(out, "\n           database check failed: {}", err);
            }
            (None, None) => {
                let _ = writeln!(out, "\n           database not checked");
            }
        }
    }

    let with_data = checks.iter().filter(|c| c.has_data()).count();
    let _ = write!(
        out,
        "{} of {} selected contracts already have data",
        with_data,
        checks.len()
    );
    out
}

/// 데이터베이스 요약 보고서.
pub fn format_database_summary(summary: &DatabaseSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Server: {}", summary.server_version);
    let _ = writeln!(
        out,
        "TimescaleDB: {}",
        summary.timescale_version.as_deref().unwrap_or("not installed")
    );
    if let Some(size) = &summary.database_size {
        let _ = writeln!(out, "Database size: {}", size);
    }

    if summary.tables.is_empty() {
        let _ = write!(out, "No market data tables found (run `init` first)");
        return out;
    }

    let _ = writeln!(out, "Tables:");
    for table in &summary.tables {
        let range = match (table.earliest, table.latest) {
            (Some(start), Some(end)) => {
                format!("{} -> {}", format_timestamp(start), format_timestamp(end))
            }
            _ => "empty".to_string(),
        };
        let _ = writeln!(
            out,
            "  {:<22} {:>12} rows  {}{}",
            table.name,
            table.row_count,
            range,
            if table.is_hypertable { "  [hypertable]" } else { "" }
        );
    }
    let _ = write!(out, "Total rows: {}", summary.total_rows());
    out
}

/// 시스템 상태 보고서.
pub fn format_status(status: &SystemStatus, connection: &ConnectionStatusReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Status: {}", status.connection_summary());
    let _ = writeln!(
        out,
        "  gateway:  {} (attempts: {}, failures: {}, monitor: {})",
        connection.phase,
        connection.attempt_count,
        connection.consecutive_failures,
        if connection.monitor_running { "running" } else { "stopped" }
    );
    if let Some(uptime) = connection.uptime_secs {
        let _ = writeln!(out, "            uptime {}s", uptime);
    }
    let _ = writeln!(
        out,
        "  database: {}{}",
        status.database.phase,
        status
            .database
            .message
            .as_deref()
            .map(|m| format!(" ({})", m))
            .unwrap_or_default()
    );
    let _ = writeln!(out, "  active downloads: {}", status.active_downloads.len());
    for download in &status.active_downloads {
        let _ = writeln!(
            out,
            "    {} {}: {:.1}% ({} records)",
            download.contract_id,
            download.data_kind,
            download.progress_percent(),
            download.total_records
        );
    }
    let _ = write!(out, "  operations run: {}", status.operations_run);
    if let Some(err) = &status.last_error {
        let _ = write!(out, "\n  last error: {}", err);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use admin_core::{DateRange, TableSummary};
    use chrono::{NaiveDate, TimeZone};

    fn record(symbol: &str) -> SymbolRecord {
        SymbolRecord {
            symbol: symbol.to_string(),
            base_symbol: "NQ".to_string(),
            exchange: "CME".to_string(),
            product_code: "NQ".to_string(),
            full_name: Some("E-mini NASDAQ-100".to_string()),
            expiration: NaiveDate::from_ymd_opt(2024, 3, 15),
            trading_hours: None,
            tick_size: None,
            point_value: None,
            month_code: Some('H'),
            contract_year: Some(2024),
        }
    }

    #[test]
    fn test_symbol_report_lists_data_state() {
        let d = |day| Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap();
        let mut stats = DataStatistics::empty("NQH24");
        stats.total_records = 1200;
        stats.date_range = Some(DateRange { start: d(1), end: d(5) });

        let checks = vec![
            SymbolCheck {
                record: record("NQH24"),
                statistics: Some(stats),
                error: None,
            },
            SymbolCheck {
                record: record("NQM24"),
                statistics: Some(DataStatistics::empty("NQM24")),
                error: None,
            },
            SymbolCheck {
                record: record("NQU24"),
                statistics: None,
                error: Some("pool timed out".to_string()),
            },
        ];

        let report = format_symbol_report("NQ", "CME", 7, &checks);
        assert!(report.starts_with("Found 7 symbols matching 'NQ' on CME, selected 3:"));
        assert!(report.contains("1200 records in database (2024-03-01 00:00 UTC -> 2024-03-05 00:00 UTC)"));
        assert!(report.contains("no data in database"));
        assert!(report.contains("database check failed: pool timed out"));
        assert!(report.ends_with("1 of 3 selected contracts already have data"));
    }

    #[test]
    fn test_database_summary_without_tables() {
        let summary = DatabaseSummary {
            server_version: "PostgreSQL 16.2".to_string(),
            timescale_version: None,
            database_size: None,
            tables: Vec::new(),
        };
        let text = format_database_summary(&summary);
        assert!(text.contains("TimescaleDB: not installed"));
        assert!(text.contains("run `init` first"));
    }

    #[test]
    fn test_database_summary_totals() {
        let summary = DatabaseSummary {
            server_version: "PostgreSQL 16.2".to_string(),
            timescale_version: Some("2.14.2".to_string()),
            database_size: Some("42 MB".to_string()),
            tables: vec![
                TableSummary {
                    name: "market_data_minutes".to_string(),
                    row_count: 300,
                    is_hypertable: true,
                    earliest: None,
                    latest: None,
                },
                TableSummary {
                    name: "market_data_seconds".to_string(),
                    row_count: 700,
                    is_hypertable: true,
                    earliest: None,
                    latest: None,
                },
            ],
        };
        let text = format_database_summary(&summary);
        assert!(text.contains("[hypertable]"));
        assert!(text.ends_with("Total rows: 1000"));
    }
}
