//! TimescaleDB 스키마 정의.

/// 초봉 테이블.
pub const SECONDS_TABLE: &str = "market_data_seconds";
/// 분봉 테이블.
pub const MINUTES_TABLE: &str = "market_data_minutes";
/// 원시 틱 테이블.
pub const RAW_TICK_TABLE: &str = "raw_tick_data";

/// 바 데이터를 담는 테이블 (삽입/통계 대상).
pub const BAR_TABLES: [&str; 2] = [SECONDS_TABLE, MINUTES_TABLE];

/// 관리 대상 전체 테이블.
pub const MANAGED_TABLES: [&str; 3] = [SECONDS_TABLE, MINUTES_TABLE, RAW_TICK_TABLE];

/// 바 테이블 이름인지 확인합니다.
///
/// 테이블 이름은 SQL에 직접 들어가므로 이 목록에 있는 이름만 허용합니다.
pub fn is_bar_table(table: &str) -> bool {
    BAR_TABLES.contains(&table)
}

/// 바 테이블 DDL.
fn bar_table_ddl(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            timestamp          TIMESTAMPTZ      NOT NULL,
            symbol             TEXT             NOT NULL,
            contract           TEXT             NOT NULL,
            exchange           TEXT             NOT NULL,
            exchange_code      TEXT             NOT NULL,
            open               NUMERIC(18, 6)   NOT NULL,
            high               NUMERIC(18, 6)   NOT NULL,
            low                NUMERIC(18, 6)   NOT NULL,
            close              NUMERIC(18, 6)   NOT NULL,
            volume             BIGINT           NOT NULL DEFAULT 0,
            data_quality_score DOUBLE PRECISION NOT NULL DEFAULT 1.0,
            is_regular_hours   BOOLEAN          NOT NULL DEFAULT FALSE,
            created_at         TIMESTAMPTZ      NOT NULL DEFAULT NOW(),
            PRIMARY KEY (timestamp, symbol, contract, exchange)
        )
        "#
    )
}

fn raw_tick_ddl() -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {RAW_TICK_TABLE} (
            timestamp     TIMESTAMPTZ    NOT NULL,
            symbol        TEXT           NOT NULL,
            contract      TEXT           NOT NULL,
            exchange      TEXT           NOT NULL,
            exchange_code TEXT           NOT NULL,
            price         NUMERIC(18, 6) NOT NULL,
            size          BIGINT         NOT NULL,
            side          TEXT,
            created_at    TIMESTAMPTZ    NOT NULL DEFAULT NOW(),
            PRIMARY KEY (timestamp, symbol, contract, exchange)
        )
        "#
    )
}

/// 초기화 시 순서대로 실행할 문장들.
pub fn initialization_statements() -> Vec<String> {
    let mut statements = vec!["CREATE EXTENSION IF NOT EXISTS timescaledb".to_string()];

    for table in BAR_TABLES {
        statements.push(bar_table_ddl(table));
    }
    statements.push(raw_tick_ddl());

    for table in MANAGED_TABLES {
        statements.push(format!(
            "SELECT create_hypertable('{table}', 'timestamp', if_not_exists => TRUE)"
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_symbol_time ON {table} (symbol, timestamp DESC)"
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_contract_time ON {table} (contract, timestamp DESC)"
        ));
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_table_whitelist() {
        assert!(is_bar_table("market_data_seconds"));
        assert!(is_bar_table("market_data_minutes"));
        assert!(!is_bar_table("raw_tick_data"));
        assert!(!is_bar_table("market_data_minutes; DROP TABLE x"));
    }

    #[test]
    fn test_initialization_order() {
        let statements = initialization_statements();
        assert!(statements[0].contains("timescaledb"));

        let create_pos = statements
            .iter()
            .position(|s| s.contains("CREATE TABLE IF NOT EXISTS market_data_seconds"))
            .unwrap();
        let hyper_pos = statements
            .iter()
            .position(|s| s.contains("create_hypertable('market_data_seconds'"))
            .unwrap();
        assert!(create_pos < hyper_pos);

        let hypertables = statements.iter().filter(|s| s.contains("create_hypertable")).count();
        assert_eq!(hypertables, MANAGED_TABLES.len());
    }

    #[test]
    fn test_primary_key_matches_conflict_target() {
        let ddl = bar_table_ddl(MINUTES_TABLE);
        assert!(ddl.contains("PRIMARY KEY (timestamp, symbol, contract, exchange)"));
    }
}
