//! 과거 바 데이터 다운로드 관리자.
//!
//! 계약 목록과 기간을 받아 바 종류별로 기간을 청크로 나누고, 청크마다
//! 게이트웨이를 호출해 정규화한 바를 [`DatabaseOperations`]로 저장합니다.
//!
//! 자체 재시도는 없습니다. 실패한 청크는 통계에 기록되고 다음 청크로 넘어갑니다.
//! 시장이 닫힌 구간의 청크는 API 호출 없이 건너뜁니다.

use crate::client::{BarRequest, GatewayClient, RawBar};
use crate::connection::ConnectionManager;
use crate::market_hours::{is_market_open_during, is_regular_hours};
use admin_core::{
    exchange_mic, extract_base_symbol, is_valid_ohlc, quality_score, split_contract_exchange,
    AdminError, AdminResult, AppConfig, BarKind, BarRecord, Cleanable, CleanupOutcome,
    DatabaseOperations, DownloadProgress, ProgressSink,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 다운로드 통계에 보관할 최대 에러 메시지 수.
const MAX_RECORDED_ERRORS: usize = 20;

/// 과거 데이터 다운로드 설정.
#[derive(Debug, Clone)]
pub struct HistoricalSettings {
    /// 초봉 청크 크기
    pub second_chunk: chrono::Duration,
    /// 분봉 청크 크기
    pub minute_chunk: chrono::Duration,
    /// 초봉 요청 간 지연
    pub second_request_delay: Duration,
    /// 분봉 요청 간 지연
    pub minute_request_delay: Duration,
    /// 청크 요청 타임아웃
    pub request_timeout: Duration,
}

impl HistoricalSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let download = &config.download;
        Self {
            second_chunk: chrono::Duration::hours(i64::from(download.second_chunk_hours.max(1))),
            minute_chunk: chrono::Duration::days(i64::from(download.minute_chunk_days.max(1))),
            second_request_delay: Duration::from_millis(download.second_request_delay_ms),
            minute_request_delay: Duration::from_millis(download.minute_request_delay_ms),
            request_timeout: download.request_timeout(),
        }
    }

    /// 바 종류별 청크 크기.
    pub fn chunk_span(&self, kind: BarKind) -> chrono::Duration {
        match kind {
            BarKind::Seconds => self.second_chunk,
            BarKind::Minutes => self.minute_chunk,
        }
    }

    /// 바 종류별 요청 간 지연.
    pub fn request_delay(&self, kind: BarKind) -> Duration {
        match kind {
            BarKind::Seconds => self.second_request_delay,
            BarKind::Minutes => self.minute_request_delay,
        }
    }
}

impl Default for HistoricalSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

// =============================================================================
// 통계
// =============================================================================

/// 계약별 다운로드 통계.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadStats {
    /// 게이트웨이에서 받은 바 수
    pub bars_downloaded: u64,
    /// 새로 저장된 바 수 (중복 제외)
    pub bars_inserted: u64,
    /// OHLC 관계가 깨져 버린 바 수
    pub invalid_bars: u64,
    pub successful_chunks: u32,
    pub failed_chunks: u32,
    /// 조회는 성공했지만 데이터가 없는 청크
    pub empty_chunks: u32,
    /// 시장 휴장으로 건너뛴 청크
    pub skipped_chunks: u32,
    pub api_calls: u32,
    pub errors: Vec<String>,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl DownloadStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 성공률 계산 (%). API 호출 기준.
    pub fn success_rate(&self) -> f64 {
        if self.api_calls == 0 {
            0.0
        } else {
            f64::from(self.successful_chunks + self.empty_chunks) / f64::from(self.api_calls)
                * 100.0
        }
    }

    fn record_error(&mut self, message: String) {
        self.failed_chunks += 1;
        if self.errors.len() < MAX_RECORDED_ERRORS {
            self.errors.push(message);
        }
    }

    fn merge(&mut self, other: &DownloadStats) {
        self.bars_downloaded += other.bars_downloaded;
        self.bars_inserted += other.bars_inserted;
        self.invalid_bars += other.invalid_bars;
        self.successful_chunks += other.successful_chunks;
        self.failed_chunks += other.failed_chunks;
        self.empty_chunks += other.empty_chunks;
        self.skipped_chunks += other.skipped_chunks;
        self.api_calls += other.api_calls;
        for e in &other.errors {
            if self.errors.len() < MAX_RECORDED_ERRORS {
                self.errors.push(e.clone());
            }
        }
        self.elapsed += other.elapsed;
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            bars_downloaded = self.bars_downloaded,
            bars_inserted = self.bars_inserted,
            invalid_bars = self.invalid_bars,
            successful = self.successful_chunks,
            failed = self.failed_chunks,
            empty = self.empty_chunks,
            skipped = self.skipped_chunks,
            api_calls = self.api_calls,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "다운로드 완료"
        );
    }
}

/// 계약 하나의 다운로드 결과.
#[derive(Debug, Clone, Serialize)]
pub struct ContractDownload {
    pub contract: String,
    pub bars_by_kind: Vec<(BarKind, u64)>,
    pub stats: DownloadStats,
}

impl ContractDownload {
    pub fn total_bars(&self) -> u64 {
        self.bars_by_kind.iter().map(|(_, n)| n).sum()
    }
}

/// 전체 다운로드 결과.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadSummary {
    pub contracts: Vec<ContractDownload>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_secs: f64,
}

impl DownloadSummary {
    pub fn total_bars(&self) -> u64 {
        self.contracts.iter().map(ContractDownload::total_bars).sum()
    }

    pub fn failed_chunks(&self) -> u32 {
        self.contracts.iter().map(|c| c.stats.failed_chunks).sum()
    }
}

/// 다운로드 결과 한 줄 요약.
pub fn format_download_summary(summary: &DownloadSummary) -> String {
    format!(
        "Historical download completed in {:.1}s. Total bars: {}. Contracts processed: {}",
        summary.duration_secs,
        summary.total_bars(),
        summary.contracts.len()
    )
}

// =============================================================================
// 청크 계획 / 바 정규화
// =============================================================================

/// `[start, end)`를 `span` 크기의 연속 청크로 나눕니다. 마지막 청크는 짧을 수 있습니다.
pub fn plan_chunks(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    span: chrono::Duration,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut chunks = Vec::new();
    if end <= start || span <= chrono::Duration::zero() {
        return chunks;
    }

    let mut current = start;
    while current < end {
        let chunk_end = (current + span).min(end);
        chunks.push((current, chunk_end));
        current = chunk_end;
    }
    chunks
}

/// 바 정규화 결과.
#[derive(Debug, Clone, Default)]
pub struct ProcessedBars {
    pub records: Vec<BarRecord>,
    pub invalid: u64,
}

/// 게이트웨이 바를 저장용 레코드로 정규화합니다. OHLC 관계가 깨진 바는 제외됩니다.
pub fn process_bars(raw: &[RawBar], contract: &str, base_symbol: &str, exchange: &str) -> ProcessedBars {
    let exchange_code = exchange_mic(exchange);
    let mut processed = ProcessedBars::default();

    for bar in raw {
        if !is_valid_ohlc(bar.open, bar.high, bar.low, bar.close) {
            processed.invalid += 1;
            continue;
        }

        processed.records.push(BarRecord {
            timestamp: bar.timestamp,
            symbol: base_symbol.to_string(),
            contract: contract.to_string(),
            exchange: exchange.to_string(),
            exchange_code: exchange_code.clone(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            data_quality_score: quality_score(bar.open, bar.high, bar.low, bar.close, bar.volume),
            is_regular_hours: is_regular_hours(bar.timestamp),
        });
    }

    processed
}

// =============================================================================
// 관리자
// =============================================================================

/// 진행률 계산에 쓰는 전체 작업 단위 위치.
#[derive(Debug, Clone, Copy)]
struct UnitPosition {
    index: usize,
    total: usize,
}

impl UnitPosition {
    fn overall_percent(&self, fraction: f64) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.index as f64 + fraction) / self.total as f64 * 100.0
    }
}

/// 과거 데이터 다운로드 관리자.
pub struct HistoricalManager {
    connection: ConnectionManager,
    database: RwLock<Option<Arc<dyn DatabaseOperations>>>,
    settings: HistoricalSettings,
    active: RwLock<HashMap<String, DownloadProgress>>,
    stats: RwLock<HashMap<String, DownloadStats>>,
}

impl HistoricalManager {
    pub fn new(
        connection: ConnectionManager,
        database: Option<Arc<dyn DatabaseOperations>>,
        settings: HistoricalSettings,
    ) -> Self {
        Self {
            connection,
            database: RwLock::new(database),
            settings,
            active: RwLock::new(HashMap::new()),
            stats: RwLock::new(HashMap::new()),
        }
    }

    /// 데이터베이스 협력자를 설정합니다.
    pub fn set_database(&self, database: Option<Arc<dyn DatabaseOperations>>) {
        *write_lock(&self.database, "database") = database;
    }

    /// 데이터베이스 협력자 설정 여부.
    pub fn has_database(&self) -> bool {
        read_lock(&self.database, "database").is_some()
    }

    pub fn settings(&self) -> &HistoricalSettings {
        &self.settings
    }

    /// 지금부터 `days`일 전까지의 과거 데이터를 다운로드합니다.
    pub async fn download_historical_data(
        &self,
        contracts: &[String],
        days: u32,
        kinds: &[BarKind],
        progress: &ProgressSink,
    ) -> AdminResult<DownloadSummary> {
        let end = Utc::now();
        let start = end - chrono::Duration::days(i64::from(days));
        self.download_range(contracts, start, end, kinds, progress)
            .await
    }

    /// `[start, end)` 구간의 과거 데이터를 다운로드합니다.
    pub async fn download_range(
        &self,
        contracts: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        kinds: &[BarKind],
        progress: &ProgressSink,
    ) -> AdminResult<DownloadSummary> {
        let database = read_lock(&self.database, "database")
            .clone()
            .ok_or_else(|| AdminError::Database("Database operations not available".to_string()))?;

        let client = self.connection.client().ok_or_else(|| {
            AdminError::Connection("Not Connected: gateway session not established".to_string())
        })?;

        let started = Instant::now();
        let total_units = contracts.len() * kinds.len();
        let mut results = Vec::with_capacity(contracts.len());

        info!(
            contracts = contracts.len(),
            kinds = ?kinds,
            start = %start,
            end = %end,
            "과거 데이터 다운로드 시작"
        );

        for (contract_idx, contract) in contracts.iter().enumerate() {
            let (symbol, exchange) = split_contract_exchange(contract);
            let base_symbol = extract_base_symbol(&symbol);
            let contract_started = Instant::now();
            let mut contract_stats = DownloadStats::new();
            let mut bars_by_kind = Vec::with_capacity(kinds.len());

            for (kind_idx, kind) in kinds.iter().enumerate() {
                let position = UnitPosition {
                    index: contract_idx * kinds.len() + kind_idx,
                    total: total_units,
                };
                let target = DownloadTarget {
                    symbol: &symbol,
                    exchange: &exchange,
                    base_symbol: &base_symbol,
                    kind: *kind,
                };

                let stats = self
                    .download_kind(client.as_ref(), database.as_ref(), &target, start, end, position, progress)
                    .await;
                bars_by_kind.push((*kind, stats.bars_inserted));
                contract_stats.merge(&stats);
            }

            contract_stats.elapsed = contract_started.elapsed();
            contract_stats.log_summary(&format!("download {}", symbol));
            write_lock(&self.stats, "stats")
                .entry(symbol.clone())
                .or_default()
                .merge(&contract_stats);

            results.push(ContractDownload {
                contract: symbol,
                bars_by_kind,
                stats: contract_stats,
            });
        }

        let summary = DownloadSummary {
            contracts: results,
            start,
            end,
            duration_secs: started.elapsed().as_secs_f64(),
        };
        progress.report(&format_download_summary(&summary), 100.0);
        Ok(summary)
    }

    /// 계약 하나, 바 종류 하나를 다운로드합니다.
    #[allow(clippy::too_many_arguments)]
    async fn download_kind(
        &self,
        client: &dyn GatewayClient,
        database: &dyn DatabaseOperations,
        target: &DownloadTarget<'_>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        position: UnitPosition,
        progress: &ProgressSink,
    ) -> DownloadStats {
        let kind = target.kind;
        let chunks = plan_chunks(start, end, self.settings.chunk_span(kind));
        let total_chunks = chunks.len() as u32;
        let progress_key = format!("{}:{}", target.symbol, kind.label());
        let mut stats = DownloadStats::new();

        self.track(&progress_key, DownloadProgress::new(target.symbol, kind, total_chunks));

        for (i, (chunk_start, chunk_end)) in chunks.iter().copied().enumerate() {
            let description = format!(
                "{} {} chunk {}/{}",
                target.symbol,
                kind.label(),
                i + 1,
                total_chunks
            );
            self.update(&progress_key, |p| p.begin_chunk(description.clone()));

            let records = if !is_market_open_during(chunk_start, chunk_end) {
                debug!(contract = %target.symbol, chunk = i + 1, "시장 휴장 구간, 건너뜀");
                stats.skipped_chunks += 1;
                0
            } else {
                let inserted = self
                    .download_chunk(client, database, target, chunk_start, chunk_end, &mut stats)
                    .await;
                if i + 1 < chunks.len() {
                    tokio::time::sleep(self.settings.request_delay(kind)).await;
                }
                inserted
            };

            let fraction = self
                .update(&progress_key, |p| {
                    p.complete_chunk(records);
                    p.progress_percent() / 100.0
                })
                .unwrap_or(1.0);
            progress.report(&description, position.overall_percent(fraction));
        }

        self.untrack(&progress_key);
        stats
    }

    /// 청크 하나를 요청하고 저장합니다. 저장된 바 수를 반환합니다.
    async fn download_chunk(
        &self,
        client: &dyn GatewayClient,
        database: &dyn DatabaseOperations,
        target: &DownloadTarget<'_>,
        chunk_start: DateTime<Utc>,
        chunk_end: DateTime<Utc>,
        stats: &mut DownloadStats,
    ) -> u64 {
        let request = BarRequest {
            symbol: target.symbol.to_string(),
            exchange: target.exchange.to_string(),
            kind: target.kind,
            start: chunk_start,
            end: chunk_end,
        };

        stats.api_calls += 1;
        let timeout = self.settings.request_timeout;
        let raw = match tokio::time::timeout(timeout, client.get_historical_time_bars(&request)).await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(contract = %target.symbol, start = %chunk_start, "청크 조회 실패: {}", e);
                stats.record_error(format!("{} {}: {}", target.symbol, chunk_start, e));
                return 0;
            }
            Err(_) => {
                warn!(contract = %target.symbol, start = %chunk_start, "청크 조회 시간 초과");
                stats.record_error(format!(
                    "{} {}: request timed out after {}s",
                    target.symbol,
                    chunk_start,
                    timeout.as_secs()
                ));
                return 0;
            }
        };

        if raw.is_empty() {
            stats.empty_chunks += 1;
            return 0;
        }

        let processed = process_bars(&raw, target.symbol, target.base_symbol, target.exchange);
        stats.bars_downloaded += raw.len() as u64;
        stats.invalid_bars += processed.invalid;

        if processed.records.is_empty() {
            stats.empty_chunks += 1;
            return 0;
        }

        match database
            .bulk_insert(&processed.records, target.kind.table_name())
            .await
        {
            Ok(inserted) => {
                stats.successful_chunks += 1;
                stats.bars_inserted += inserted;
                debug!(
                    contract = %target.symbol,
                    received = raw.len(),
                    inserted,
                    "청크 저장 완료"
                );
                inserted
            }
            Err(e) => {
                error!(contract = %target.symbol, "바 저장 실패: {}", e);
                stats.record_error(format!("{} {}: {}", target.symbol, chunk_start, e));
                0
            }
        }
    }

    fn track(&self, key: &str, progress: DownloadProgress) {
        write_lock(&self.active, "active").insert(key.to_string(), progress);
    }

    fn untrack(&self, key: &str) {
        write_lock(&self.active, "active").remove(key);
    }

    fn update<R>(&self, key: &str, f: impl FnOnce(&mut DownloadProgress) -> R) -> Option<R> {
        write_lock(&self.active, "active").get_mut(key).map(f)
    }

    /// 진행 중인 다운로드 스냅샷.
    pub fn active_downloads(&self) -> Vec<DownloadProgress> {
        let mut active: Vec<_> = read_lock(&self.active, "active").values().cloned().collect();
        active.sort_by(|a, b| a.contract_id.cmp(&b.contract_id));
        active
    }

    /// 계약별 누적 통계. `contract`를 주면 해당 계약만.
    pub fn download_statistics(&self, contract: Option<&str>) -> HashMap<String, DownloadStats> {
        let stats = read_lock(&self.stats, "stats");
        match contract {
            Some(c) => {
                let (symbol, _) = split_contract_exchange(c);
                stats
                    .get(&symbol)
                    .map(|s| HashMap::from([(symbol.clone(), s.clone())]))
                    .unwrap_or_default()
            }
            None => stats.clone(),
        }
    }

    /// 누적 통계를 초기화합니다.
    pub fn reset_statistics(&self) {
        write_lock(&self.stats, "stats").clear();
    }
}

#[async_trait]
impl Cleanable for HistoricalManager {
    fn component_name(&self) -> &'static str {
        "historical"
    }

    async fn cleanup(&self) -> AdminResult<CleanupOutcome> {
        let abandoned = {
            let mut active = write_lock(&self.active, "active");
            let n = active.len();
            active.clear();
            n
        };
        if abandoned > 0 {
            warn!(abandoned, "진행 중이던 다운로드 추적 정리");
        }
        self.set_database(None);
        Ok(CleanupOutcome::Released)
    }
}

/// 다운로드 대상 계약.
struct DownloadTarget<'a> {
    symbol: &'a str,
    exchange: &'a str,
    base_symbol: &'a str,
    kind: BarKind,
}

fn read_lock<'a, T>(lock: &'a RwLock<T>, name: &str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            error!(lock = name, "RwLock poisoned (read), recovering");
            poisoned.into_inner()
        }
    }
}

fn write_lock<'a, T>(lock: &'a RwLock<T>, name: &str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            error!(lock = name, "RwLock poisoned (write), recovering");
            poisoned.into_inner()
        }
    }
}
