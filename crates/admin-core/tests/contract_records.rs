//! 계약 코드 → 심볼 레코드 → 정렬/필터 흐름 통합 테스트.

use admin_core::{
    instrument_spec, parse_contract_code, sort_by_expiration, OperationResult, SymbolRecord,
    SystemStatus,
};
use chrono::NaiveDate;

fn record(code: &str) -> SymbolRecord {
    let parsed = parse_contract_code(code).expect("valid contract code");
    let spec = instrument_spec(&parsed.base);
    SymbolRecord {
        symbol: parsed.code(),
        base_symbol: parsed.base.clone(),
        exchange: spec.map(|s| s.exchange.to_string()).unwrap_or_default(),
        product_code: parsed.base.clone(),
        full_name: spec.map(|s| s.full_name.to_string()),
        expiration: parsed.estimated_expiration(),
        trading_hours: spec.map(|s| s.trading_hours.to_string()),
        tick_size: spec.map(|s| s.tick_size),
        point_value: spec.map(|s| s.point_value),
        month_code: Some(parsed.month_code),
        contract_year: Some(parsed.year),
    }
}

#[test]
fn test_records_sort_by_expiration_and_filter_expired() {
    let mut records = vec![record("NQZ24"), record("NQH24"), record("NQU24"), record("NQM24")];
    sort_by_expiration(&mut records);

    let symbols: Vec<_> = records.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["NQH24", "NQM24", "NQU24", "NQZ24"]);

    let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
    let active: Vec<_> = records.iter().filter(|r| !r.is_expired(today)).collect();
    assert_eq!(active.len(), 2);
    assert_eq!(active[0].contract_id(), "NQU24.CME");
}

#[test]
fn test_quarterly_flag_comes_from_month_code() {
    assert!(record("ESM25").is_quarterly());
    assert!(!record("CLF25").is_quarterly());
}

#[test]
fn test_status_serializes_for_diagnostics() {
    let mut status = SystemStatus::new();
    status.record_result("search", &OperationResult::error("No symbols found matching 'ZZ' on CME"));

    let value = serde_json::to_value(&status).unwrap();
    assert_eq!(value["operations_run"], 1);
    assert_eq!(value["log"][0]["level"], "error");
}
