//! 심볼 검색과 과거 데이터 다운로드 통합 테스트.

use admin_core::{
    AdminResult, BarKind, BarRecord, Cleanable, CleanupOutcome, DataStatistics, DatabaseOperations,
    DatabaseSummary, ErrorCategory, GatewayConfig, ProgressSink,
};
use admin_gateway::{
    ConnectionManager, ConnectionSettings, GatewayError, HistoricalManager, HistoricalSettings,
    SimulatedBehavior, SimulatedClientFactory, SimulatedGateway, StaticCredentials, SymbolManager,
    SymbolSettings,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use secrecy::SecretString;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 메모리에 레코드를 쌓는 테스트용 데이터베이스.
#[derive(Default)]
struct MemoryDatabase {
    rows: Mutex<Vec<(String, BarRecord)>>,
}

impl MemoryDatabase {
    fn rows_in(&self, table: &str) -> usize {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == table)
            .count()
    }
}

#[async_trait]
impl Cleanable for MemoryDatabase {
    fn component_name(&self) -> &'static str {
        "memory-db"
    }

    async fn cleanup(&self) -> AdminResult<CleanupOutcome> {
        Ok(CleanupOutcome::NothingToRelease)
    }
}

#[async_trait]
impl DatabaseOperations for MemoryDatabase {
    async fn test_connection(&self) -> AdminResult<String> {
        Ok("memory".to_string())
    }

    async fn initialize_database(&self) -> AdminResult<String> {
        Ok("initialized".to_string())
    }

    async fn bulk_insert(&self, records: &[BarRecord], table: &str) -> AdminResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        rows.extend(records.iter().cloned().map(|r| (table.to_string(), r)));
        Ok(records.len() as u64)
    }

    async fn get_data_statistics(&self, contract: &str) -> AdminResult<DataStatistics> {
        Ok(DataStatistics::empty(contract))
    }

    async fn get_database_summary(&self) -> AdminResult<DatabaseSummary> {
        Ok(DatabaseSummary {
            server_version: "memory".to_string(),
            timescale_version: None,
            database_size: None,
            tables: Vec::new(),
        })
    }
}

struct Fixture {
    connection: ConnectionManager,
    gateway: Arc<SimulatedGateway>,
}

async fn connected(behavior: SimulatedBehavior) -> Fixture {
    let gateway = Arc::new(SimulatedGateway::new(behavior));
    let factory = Arc::new(SimulatedClientFactory::new(gateway.clone()));
    let credentials = Arc::new(StaticCredentials::new(GatewayConfig {
        user: "demo".to_string(),
        password: SecretString::from("demo".to_string()),
        ..Default::default()
    }));
    let connection = ConnectionManager::new(ConnectionSettings::default(), credentials, factory);
    connection.connect().await.unwrap();
    Fixture { connection, gateway }
}

fn listing_behavior() -> SimulatedBehavior {
    SimulatedBehavior {
        listing_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        ..Default::default()
    }
}

fn quick_settings() -> HistoricalSettings {
    HistoricalSettings {
        minute_chunk: chrono::Duration::days(1),
        second_request_delay: Duration::ZERO,
        minute_request_delay: Duration::ZERO,
        ..Default::default()
    }
}

fn utc(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

// =============================================================================
// 심볼 검색
// =============================================================================

#[tokio::test]
async fn test_wildcard_search_and_cache() {
    let fx = connected(listing_behavior()).await;
    let symbols = SymbolManager::new(fx.connection.clone(), SymbolSettings::default());

    let found = symbols.search_symbols("NQ?24", "CME").await.unwrap();
    let names: Vec<_> = found.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(names, vec!["NQH24", "NQM24", "NQU24", "NQZ24"]);
    assert!(found.iter().all(|r| r.full_name.as_deref() == Some("E-mini NASDAQ-100")));

    symbols.search_symbols("nq?24", "cme").await.unwrap();
    assert_eq!(fx.gateway.calls().search.load(Ordering::SeqCst), 1);

    assert_eq!(symbols.clear_cache().await, 1);
    symbols.search_symbols("NQ?24", "CME").await.unwrap();
    assert_eq!(fx.gateway.calls().search.load(Ordering::SeqCst), 2);

    fx.connection.disconnect().await;
}

#[tokio::test]
async fn test_search_without_connection_fails() {
    let fx = connected(listing_behavior()).await;
    fx.connection.disconnect().await;

    let symbols = SymbolManager::new(fx.connection.clone(), SymbolSettings::default());
    let err = symbols.search_symbols("NQ", "CME").await.unwrap_err();
    assert!(matches!(err, GatewayError::NotConnected(_)));
}

#[tokio::test]
async fn test_front_month_and_validation() {
    let fx = connected(listing_behavior()).await;
    let symbols = SymbolManager::new(fx.connection.clone(), SymbolSettings::default());
    let today = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

    let front = symbols.front_month_contract("ES", "CME", today).await.unwrap();
    assert_eq!(front.map(|r| r.symbol), Some("ESH24".to_string()));

    let results = symbols
        .validate_contracts(
            &["NQM24".to_string(), "NQZ23".to_string(), "ZZH24".to_string()],
            "CME",
            today,
        )
        .await;
    let valid: Vec<_> = results.iter().map(|r| r.valid).collect();
    assert_eq!(valid, vec![true, false, false]);
    assert_eq!(results[1].reason.as_deref(), Some("contract expired"));
    assert_eq!(results[2].reason.as_deref(), Some("not found"));

    fx.connection.disconnect().await;
}

// =============================================================================
// 과거 데이터
// =============================================================================

#[tokio::test]
async fn test_download_skips_closed_market_and_stores_bars() {
    let fx = connected(SimulatedBehavior::default()).await;
    let db = Arc::new(MemoryDatabase::default());
    let manager = HistoricalManager::new(
        fx.connection.clone(),
        Some(db.clone() as Arc<dyn DatabaseOperations>),
        quick_settings(),
    );

    let percents = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let percents = percents.clone();
        ProgressSink::new(move |_msg: &str, pct: f64| percents.lock().unwrap().push(pct))
    };

    // 토요일 00:00 UTC ~ 월요일 00:00 UTC: 토요일 청크는 휴장, 일요일 22:00 UTC 개장
    let summary = manager
        .download_range(
            &["NQH24.CME".to_string()],
            utc(9, 0),
            utc(11, 0),
            &[BarKind::Minutes],
            &sink,
        )
        .await
        .unwrap();

    assert_eq!(summary.contracts.len(), 1);
    let stats = &summary.contracts[0].stats;
    assert_eq!(stats.skipped_chunks, 1);
    assert_eq!(stats.api_calls, 1);
    assert_eq!(stats.successful_chunks, 1);
    assert_eq!(summary.total_bars(), 120);
    assert_eq!(db.rows_in("market_data_minutes"), 120);
    assert_eq!(fx.gateway.calls().bars.load(Ordering::SeqCst), 1);

    let percents = percents.lock().unwrap();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last().copied(), Some(100.0));
    assert!(manager.active_downloads().is_empty());

    let totals = manager.download_statistics(Some("NQH24"));
    assert_eq!(totals["NQH24"].bars_inserted, 120);
    manager.reset_statistics();
    assert!(manager.download_statistics(None).is_empty());

    fx.connection.disconnect().await;
}

#[tokio::test]
async fn test_download_without_database_is_explicit_error() {
    let fx = connected(SimulatedBehavior::default()).await;
    let manager = HistoricalManager::new(fx.connection.clone(), None, quick_settings());

    let err = manager
        .download_historical_data(&["NQH24".to_string()], 1, &[BarKind::Minutes], &ProgressSink::noop())
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Database);
    assert!(err.to_string().contains("Database operations not available"));
    assert_eq!(fx.gateway.calls().bars.load(Ordering::SeqCst), 0);

    fx.connection.disconnect().await;
}

#[tokio::test]
async fn test_failed_chunks_are_counted_without_retry() {
    let behavior = SimulatedBehavior {
        bars_error: Some(GatewayError::Api {
            code: 7,
            message: "no permission".to_string(),
        }),
        ..Default::default()
    };
    let fx = connected(behavior).await;
    let db = Arc::new(MemoryDatabase::default());
    let manager = HistoricalManager::new(
        fx.connection.clone(),
        Some(db.clone() as Arc<dyn DatabaseOperations>),
        quick_settings(),
    );

    // 화요일 00:00 UTC부터 이틀, 모두 개장 구간
    let summary = manager
        .download_range(
            &["ESH24".to_string()],
            utc(5, 0),
            utc(7, 0),
            &[BarKind::Minutes],
            &ProgressSink::noop(),
        )
        .await
        .unwrap();

    let stats = &summary.contracts[0].stats;
    assert_eq!(stats.api_calls, 2);
    assert_eq!(stats.failed_chunks, 2);
    assert_eq!(stats.errors.len(), 2);
    assert_eq!(summary.total_bars(), 0);
    assert_eq!(fx.gateway.calls().bars.load(Ordering::SeqCst), 2);
    assert_eq!(db.rows_in("market_data_minutes"), 0);

    fx.connection.disconnect().await;
}

#[tokio::test]
async fn test_cleanup_releases_database() {
    let fx = connected(SimulatedBehavior::default()).await;
    let db: Arc<dyn DatabaseOperations> = Arc::new(MemoryDatabase::default());
    let manager = HistoricalManager::new(fx.connection.clone(), Some(db), quick_settings());

    assert!(manager.has_database());
    assert_eq!(manager.cleanup().await.unwrap(), CleanupOutcome::Released);
    assert!(!manager.has_database());

    fx.connection.disconnect().await;
}
