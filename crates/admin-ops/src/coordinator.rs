//! 작업 코디네이터.
//!
//! 여러 관리자를 순서대로 호출하는 워크플로우를 실행하고, 결과를 하나의
//! [`OperationResult`]로 반환합니다. 모든 작업은 [`SystemStatus`]에 기록됩니다.
//!
//! # 의존 관계
//!
//! ```text
//! OperationsCoordinator
//!   ├── ConnectionManager  (게이트웨이 세션)
//!   ├── SymbolManager      (심볼 검색/선택)
//!   ├── HistoricalManager  (과거 데이터 다운로드)
//!   └── DatabaseOperations (선택적)
//! ```

use crate::report::{self, SymbolCheck};
use admin_core::{
    is_well_formed_contract, AdminError, AdminResult, AppConfig, BarKind, Cleanable,
    CleanupOutcome, ConnectionPhase, DatabaseOperations, DownloadConfig, OperationResult,
    ProgressSink, StatusLevel, SymbolRecord, SystemStatus,
};
use admin_gateway::{
    format_download_summary, ConnectionManager, DownloadSummary, HistoricalManager,
    HistoricalSettings, SymbolManager, SymbolSettings,
};
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{error, info, warn, Instrument};

const NO_DATABASE: &str = "Database Operations Not Available";
const NO_CONTRACTS: &str = "No Contracts Selected";

/// 작업 코디네이터.
pub struct OperationsCoordinator {
    connection: ConnectionManager,
    symbols: SymbolManager,
    historical: HistoricalManager,
    database: Option<Arc<dyn DatabaseOperations>>,
    download: DownloadConfig,
    status: Arc<RwLock<SystemStatus>>,
    progress: ProgressSink,
}

impl OperationsCoordinator {
    /// 설정과 주입된 의존성으로 코디네이터를 생성합니다.
    pub fn new(
        config: &AppConfig,
        connection: ConnectionManager,
        database: Option<Arc<dyn DatabaseOperations>>,
    ) -> Self {
        let status = Arc::new(RwLock::new(SystemStatus::new()));
        let progress = status_sink(status.clone(), ProgressSink::noop());

        let symbols = SymbolManager::new(connection.clone(), SymbolSettings::from_config(config))
            .with_progress(progress.clone());
        let historical = HistoricalManager::new(
            connection.clone(),
            database.clone(),
            HistoricalSettings::from_config(config),
        );

        Self {
            connection,
            symbols,
            historical,
            database,
            download: config.download.clone(),
            status,
            progress,
        }
    }

    /// 외부 진행 콜백(UI)을 연결합니다.
    ///
    /// 진행 메시지는 상태 로그에도 기록됩니다.
    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = status_sink(self.status.clone(), sink);
        self.symbols = self.symbols.with_progress(self.progress.clone());
        self
    }

    /// 과거 데이터 관리자 설정을 교체합니다.
    pub fn with_historical_settings(mut self, settings: HistoricalSettings) -> Self {
        self.historical =
            HistoricalManager::new(self.connection.clone(), self.database.clone(), settings);
        self
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn symbols(&self) -> &SymbolManager {
        &self.symbols
    }

    pub fn historical(&self) -> &HistoricalManager {
        &self.historical
    }

    // =========================================================================
    // 연결
    // =========================================================================

    /// 게이트웨이 연결을 보장합니다.
    ///
    /// 연결되어 있으면 상태를 확인해 필요할 때만 재연결하고, 아니면 연결합니다.
    pub async fn ensure_connection(&self) -> AdminResult<String> {
        let result = self.connection.ensure_connected().await;
        self.sync_gateway_status();
        result
    }

    /// 데이터베이스와 게이트웨이 연결을 동시에 테스트합니다.
    pub async fn test_connections(&self) -> OperationResult {
        let result = async {
            self.progress.report("Testing connections", 0.0);
            let (database, gateway) = tokio::join!(self.test_database(), self.test_gateway());

            {
                let mut status = write_status(&self.status);
                match &database {
                    Ok(msg) => status.database.update(ConnectionPhase::Connected, msg.as_str()),
                    Err(e) => status.database.update(ConnectionPhase::Disconnected, e.to_string()),
                }
            }
            self.sync_gateway_status();
            self.progress.report("Connection tests finished", 100.0);

            let mut failures = Vec::new();
            if let Err(e) = &database {
                failures.push(format!("Database: {}", e.user_message()));
            }
            if let Err(e) = &gateway {
                failures.push(format!("Gateway: {}", e.user_message()));
            }

            let result = if failures.is_empty() {
                OperationResult::success("All connections successful")
            } else {
                OperationResult::error(format!("Connection test failed: {}", failures.join("; ")))
            };
            result
                .with_detail("database", service_detail(&database))
                .with_detail("gateway", service_detail(&gateway))
        }
        .instrument(admin_core::operation_span!("test_connections"))
        .await;
        self.record("test_connections", result)
    }

    async fn test_database(&self) -> AdminResult<String> {
        match &self.database {
            Some(db) => db.test_connection().await,
            None => Err(AdminError::Database(NO_DATABASE.to_string())),
        }
    }

    async fn test_gateway(&self) -> AdminResult<String> {
        if !self.connection.is_connected() {
            self.connection.connect().await?;
        }
        let health = self.connection.test_connection().await;
        if health.healthy {
            Ok(health.message)
        } else {
            Err(health.to_error())
        }
    }

    // =========================================================================
    // 심볼
    // =========================================================================

    /// 심볼을 검색하고, 관련 계약을 선택해 데이터베이스 보유 현황을 확인합니다.
    pub async fn search_and_check_symbols(&self, term: &str, exchange: &str) -> OperationResult {
        let today = Utc::now().date_naive();
        let result = self
            .search_and_check_symbols_on(term, exchange, today)
            .instrument(admin_core::operation_span!("search_and_check_symbols"))
            .await;
        self.record("search_and_check_symbols", result)
    }

    async fn search_and_check_symbols_on(
        &self,
        term: &str,
        exchange: &str,
        today: NaiveDate,
    ) -> OperationResult {
        let term = term.trim().to_uppercase();
        let exchange = exchange.trim().to_uppercase();

        self.progress.report("Ensuring gateway connection", 0.0);
        if let Err(e) = self.ensure_connection().await {
            return OperationResult::from_error(&e);
        }

        self.progress
            .report(&format!("Searching symbols matching '{}'", term), 20.0);
        let found = match self.symbols.search_symbols(&term, &exchange).await {
            Ok(found) => found,
            Err(e) => return OperationResult::from_error(&AdminError::from(e)),
        };
        if found.is_empty() {
            return OperationResult::error(format!(
                "No symbols found matching '{}' on {}",
                term, exchange
            ));
        }

        let total_found = found.len();
        let selected =
            SymbolManager::select_relevant(found, today, self.download.max_selected_contracts);
        if selected.is_empty() {
            return OperationResult::error(format!(
                "No active contracts found matching '{}' on {} ({} expired)",
                term, exchange, total_found
            ));
        }
        info!(term = %term, found = total_found, selected = selected.len(), "심볼 선택 완료");

        self.progress.report("Checking database for existing data", 60.0);
        let checks = self.check_symbols(selected).await;
        self.progress.report("Symbol check finished", 100.0);

        let message = report::format_symbol_report(&term, &exchange, total_found, &checks);
        let symbols: Vec<Value> = checks
            .iter()
            .map(|c| serde_json::to_value(c).unwrap_or(Value::Null))
            .collect();
        OperationResult::success(message)
            .with_detail("total_found", total_found)
            .with_detail("selected", checks.len())
            .with_detail("symbols", symbols)
    }

    /// 선택된 심볼마다 데이터베이스 통계를 조회합니다.
    ///
    /// 통계 조회 실패는 해당 심볼에만 기록되고 전체 작업을 실패시키지 않습니다.
    async fn check_symbols(&self, selected: Vec<SymbolRecord>) -> Vec<SymbolCheck> {
        let Some(db) = &self.database else {
            return selected
                .into_iter()
                .map(|record| SymbolCheck {
                    record,
                    statistics: None,
                    error: Some(NO_DATABASE.to_string()),
                })
                .collect();
        };

        let lookups = selected.iter().map(|r| db.get_data_statistics(&r.symbol));
        let results = futures::future::join_all(lookups).await;

        selected
            .into_iter()
            .zip(results)
            .map(|(record, result)| match result {
                Ok(stats) => SymbolCheck {
                    record,
                    statistics: Some(stats),
                    error: None,
                },
                Err(e) => {
                    warn!(symbol = %record.symbol, error = %e, "데이터 통계 조회 실패");
                    SymbolCheck {
                        record,
                        statistics: None,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect()
    }

    // =========================================================================
    // 과거 데이터
    // =========================================================================

    /// 과거 데이터를 다운로드합니다.
    ///
    /// 입력, 데이터베이스, 게이트웨이 연결을 차례로 검증하며, 하나라도 실패하면
    /// 다운로드를 시작하지 않고 즉시 검증 실패를 반환합니다.
    pub async fn download_historical_data(
        &self,
        contracts: &[String],
        days: u32,
        kinds: &[BarKind],
    ) -> OperationResult {
        let result = async {
            let contracts = match self.validate_download(contracts, days, kinds).await {
                Ok(contracts) => contracts,
                Err(e) => return OperationResult::from_error(&e),
            };

            info!(contracts = ?contracts, days, kinds = ?kinds, "과거 데이터 다운로드 시작");
            match self
                .historical
                .download_historical_data(&contracts, days, kinds, &self.progress)
                .await
            {
                Ok(summary) => download_result(&summary),
                Err(e) => OperationResult::from_error(&e),
            }
        }
        .instrument(admin_core::operation_span!("download_historical_data"))
        .await;
        self.record("download_historical_data", result)
    }

    async fn validate_download(
        &self,
        contracts: &[String],
        days: u32,
        kinds: &[BarKind],
    ) -> AdminResult<Vec<String>> {
        let contracts: Vec<String> = contracts
            .iter()
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect();
        if contracts.is_empty() {
            return Err(AdminError::Validation(NO_CONTRACTS.to_string()));
        }

        let invalid: Vec<&str> = contracts
            .iter()
            .filter(|c| !is_well_formed_contract(c))
            .map(String::as_str)
            .collect();
        if !invalid.is_empty() {
            return Err(AdminError::Validation(format!(
                "Invalid Contracts: {}",
                invalid.join(", ")
            )));
        }

        if days == 0 || days > self.download.max_days {
            return Err(AdminError::Validation(format!(
                "Invalid Days: {} (expected 1..={})",
                days, self.download.max_days
            )));
        }

        if kinds.is_empty() {
            return Err(AdminError::Validation("No Bar Types Selected".to_string()));
        }

        if self.database.is_none() {
            return Err(AdminError::Database(NO_DATABASE.to_string()));
        }

        self.ensure_connection().await?;
        Ok(contracts)
    }

    // =========================================================================
    // 데이터베이스
    // =========================================================================

    /// 데이터베이스 요약을 조회합니다.
    pub async fn view_database(&self) -> OperationResult {
        let result = match &self.database {
            None => OperationResult::error(NO_DATABASE),
            Some(db) => match db.get_database_summary().await {
                Ok(summary) => OperationResult::success(report::format_database_summary(&summary))
                    .with_detail("total_rows", summary.total_rows())
                    .with_detail(
                        "summary",
                        serde_json::to_value(&summary).unwrap_or(Value::Null),
                    ),
                Err(e) => OperationResult::from_error(&e),
            },
        };
        self.record("view_database", result)
    }

    /// 스키마를 초기화합니다.
    pub async fn initialize_database(&self) -> OperationResult {
        let result = match &self.database {
            None => OperationResult::error(NO_DATABASE),
            Some(db) => {
                self.progress.report("Initializing database schema", 0.0);
                let result = match db.initialize_database().await {
                    Ok(msg) => OperationResult::success(msg),
                    Err(e) => OperationResult::from_error(&e),
                };
                self.progress.report("Database initialization finished", 100.0);
                result
            }
        };
        self.record("initialize_database", result)
    }

    // =========================================================================
    // 상태
    // =========================================================================

    /// 현재 시스템 상태 스냅샷.
    pub fn system_status(&self) -> SystemStatus {
        self.sync_gateway_status();
        write_status(&self.status).active_downloads = self.historical.active_downloads();
        read_status(&self.status).clone()
    }

    /// 진단용 전체 상태를 반환합니다.
    pub fn get_system_status(&self) -> OperationResult {
        let status = self.system_status();
        let connection = self.connection.connection_status();
        let statistics = self.historical.download_statistics(None);

        OperationResult::success(report::format_status(&status, &connection))
            .with_detail("summary", status.connection_summary())
            .with_detail(
                "system",
                serde_json::to_value(&status).unwrap_or(Value::Null),
            )
            .with_detail(
                "connection",
                serde_json::to_value(&connection).unwrap_or(Value::Null),
            )
            .with_detail(
                "download_statistics",
                serde_json::to_value(&statistics).unwrap_or(Value::Null),
            )
    }

    fn sync_gateway_status(&self) {
        let state = self.connection.state();
        let message = state
            .recent_errors
            .latest()
            .filter(|_| !state.is_connected)
            .map(|e| e.message.clone())
            .unwrap_or_else(|| state.phase.to_string());
        write_status(&self.status)
            .gateway
            .update(state.phase, message);
    }

    /// 작업 결과를 상태에 기록하고 그대로 반환합니다.
    fn record(&self, operation: &str, result: OperationResult) -> OperationResult {
        if result.is_success() {
            info!(operation, "작업 성공");
        } else {
            warn!(operation, message = %result.message, "작업 실패");
        }
        write_status(&self.status).record_result(operation, &result);
        result
    }

    // =========================================================================
    // 정리
    // =========================================================================

    /// 모든 관리자를 정리합니다.
    ///
    /// 순서: 과거 데이터 → 심볼 → 데이터베이스 → 연결. 개별 실패는 기록만 하고
    /// 다음 단계를 계속 진행합니다.
    pub async fn cleanup(&self) -> OperationResult {
        info!("관리자 정리 시작");
        let mut failures = Vec::new();

        cleanup_step(
            self.historical.component_name(),
            self.historical.cleanup(),
            &mut failures,
        )
        .await;
        cleanup_step(self.symbols.component_name(), self.symbols.cleanup(), &mut failures).await;
        if let Some(db) = &self.database {
            cleanup_step(db.component_name(), db.cleanup(), &mut failures).await;
        }
        cleanup_step(
            self.connection.component_name(),
            self.connection.cleanup(),
            &mut failures,
        )
        .await;

        self.sync_gateway_status();
        write_status(&self.status)
            .database
            .update(ConnectionPhase::Disconnected, "released");

        let result = if failures.is_empty() {
            OperationResult::success("Cleanup completed")
        } else {
            OperationResult::success(format!(
                "Cleanup completed with {} error(s)",
                failures.len()
            ))
            .with_detail("failures", failures)
        };
        self.record("cleanup", result)
    }
}

// =============================================================================
// 헬퍼
// =============================================================================

async fn cleanup_step<F>(component: &str, step: F, failures: &mut Vec<String>)
where
    F: Future<Output = AdminResult<CleanupOutcome>>,
{
    match step.await {
        Ok(outcome) => info!(component, ?outcome, "구성 요소 정리 완료"),
        Err(e) => {
            error!(component, error = %e, "정리 실패, 다음 구성 요소 계속");
            failures.push(format!("{}: {}", component, e));
        }
    }
}

/// 상태 로그에 진행 메시지를 기록한 뒤 외부 콜백으로 전달하는 sink.
fn status_sink(status: Arc<RwLock<SystemStatus>>, external: ProgressSink) -> ProgressSink {
    ProgressSink::new(move |message: &str, percent: f64| {
        write_status(&status).push_log(StatusLevel::Info, message);
        external.report(message, percent);
    })
}

fn service_detail(result: &AdminResult<String>) -> Value {
    match result {
        Ok(message) => json!({ "success": true, "message": message }),
        Err(e) => json!({
            "success": false,
            "message": e.user_message(),
            "category": e.category().as_str(),
        }),
    }
}

fn download_result(summary: &DownloadSummary) -> OperationResult {
    let api_calls: u32 = summary.contracts.iter().map(|c| c.stats.api_calls).sum();
    let failed = summary.failed_chunks();

    let contracts: Vec<Value> = summary
        .contracts
        .iter()
        .map(|c| {
            json!({
                "contract": c.contract,
                "bars": c.total_bars(),
                "successful_chunks": c.stats.successful_chunks,
                "failed_chunks": c.stats.failed_chunks,
                "skipped_chunks": c.stats.skipped_chunks,
                "errors": c.stats.errors,
            })
        })
        .collect();

    let result = if api_calls > 0 && failed == api_calls {
        OperationResult::error(format!(
            "Historical download failed: all {} chunk requests failed",
            api_calls
        ))
    } else {
        OperationResult::success(format_download_summary(summary))
    };

    result
        .with_detail("total_bars", summary.total_bars())
        .with_detail("failed_chunks", failed)
        .with_detail("duration_secs", summary.duration_secs)
        .with_detail("contracts", contracts)
}

fn read_status(status: &RwLock<SystemStatus>) -> RwLockReadGuard<'_, SystemStatus> {
    match status.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            error!("System status lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn write_status(status: &RwLock<SystemStatus>) -> RwLockWriteGuard<'_, SystemStatus> {
    match status.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            error!("System status lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admin_core::OperationStatus;
    use admin_gateway::{DownloadStats, ContractDownload};

    fn summary_with(stats: DownloadStats, bars: u64) -> DownloadSummary {
        let now = Utc::now();
        DownloadSummary {
            contracts: vec![ContractDownload {
                contract: "NQH24".to_string(),
                bars_by_kind: vec![(BarKind::Minutes, bars)],
                stats,
            }],
            start: now,
            end: now,
            duration_secs: 1.5,
        }
    }

    #[test]
    fn test_download_result_all_chunks_failed() {
        let stats = DownloadStats {
            api_calls: 3,
            failed_chunks: 3,
            ..Default::default()
        };
        let result = download_result(&summary_with(stats, 0));
        assert_eq!(result.status, OperationStatus::Error);
        assert!(result.message.contains("all 3 chunk requests failed"));
    }

    #[test]
    fn test_download_result_partial_failure_is_success() {
        let stats = DownloadStats {
            api_calls: 3,
            successful_chunks: 2,
            failed_chunks: 1,
            ..Default::default()
        };
        let result = download_result(&summary_with(stats, 240));
        assert!(result.is_success());
        assert!(result.message.contains("Total bars: 240"));
        assert_eq!(result.detail("failed_chunks"), Some(&json!(1)));
    }

    #[test]
    fn test_service_detail_includes_category() {
        let err: AdminResult<String> = Err(AdminError::Timeout("connect".to_string()));
        let detail = service_detail(&err);
        assert_eq!(detail["success"], json!(false));
        assert_eq!(detail["category"], json!("timeout"));
    }

    #[test]
    fn test_status_sink_logs_and_forwards() {
        let status = Arc::new(RwLock::new(SystemStatus::new()));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let external = {
            let seen = seen.clone();
            ProgressSink::new(move |_: &str, pct: f64| seen.lock().unwrap().push(pct))
        };

        let sink = status_sink(status.clone(), external);
        sink.report("step", 150.0);

        assert_eq!(*seen.lock().unwrap(), vec![100.0]);
        assert_eq!(read_status(&status).logs().next().unwrap().message, "step");
    }
}
