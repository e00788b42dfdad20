//! 심볼 검색 관리자.
//!
//! 게이트웨이 심볼 검색을 감싸고 로컬 후처리를 수행합니다:
//! - `*` / `?` 와일드카드는 접두사로 게이트웨이를 검색한 뒤 로컬에서 매칭합니다.
//! - 검색 결과는 (검색어, 거래소) 키로 30분간 캐시됩니다.
//! - 상품 명세 테이블로 상품명, 호가 단위, 포인트 가치를 보강합니다.
//!
//! 재연결은 하지 않습니다. 연결이 없으면 `NotConnected` 에러를 반환합니다.

use crate::client::RawInstrument;
use crate::connection::ConnectionManager;
use crate::error::{GatewayError, GatewayResult};
use admin_core::{
    extract_base_symbol, instrument_spec, parse_contract_code, sort_by_expiration,
    split_contract_exchange, AdminResult, AppConfig, Cleanable, CleanupOutcome, ProgressSink,
    SymbolRecord,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 검색 캐시 유지 시간.
pub const SYMBOL_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// 심볼 관리자 설정.
#[derive(Debug, Clone)]
pub struct SymbolSettings {
    pub cache_ttl: Duration,
    pub search_timeout: Duration,
}

impl SymbolSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            cache_ttl: SYMBOL_CACHE_TTL,
            search_timeout: config.download.request_timeout(),
        }
    }
}

impl Default for SymbolSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

struct CacheEntry {
    records: Vec<SymbolRecord>,
    expires_at: Instant,
}

/// 계약 검증 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractValidation {
    pub contract: String,
    pub valid: bool,
    pub reason: Option<String>,
}

/// 심볼 검색 관리자.
pub struct SymbolManager {
    connection: ConnectionManager,
    settings: SymbolSettings,
    cache: RwLock<HashMap<(String, String), CacheEntry>>,
    progress: ProgressSink,
}

impl SymbolManager {
    pub fn new(connection: ConnectionManager, settings: SymbolSettings) -> Self {
        Self {
            connection,
            settings,
            cache: RwLock::new(HashMap::new()),
            progress: ProgressSink::noop(),
        }
    }

    /// 진행 콜백을 설정합니다.
    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// 심볼을 검색합니다. 일치하는 결과가 없으면 빈 목록을 반환합니다.
    pub async fn search_symbols(
        &self,
        term: &str,
        exchange: &str,
    ) -> GatewayResult<Vec<SymbolRecord>> {
        let term = term.trim().to_ascii_uppercase();
        let exchange = exchange.trim().to_ascii_uppercase();
        if term.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "search term must not be empty".to_string(),
            ));
        }

        let key = (term.clone(), exchange.clone());
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&key) {
                if entry.expires_at > Instant::now() {
                    debug!(term = %term, exchange = %exchange, "캐시된 검색 결과 사용");
                    return Ok(entry.records.clone());
                }
            }
        }

        let has_wildcard = term.contains(['*', '?']);
        let prefix = wildcard_prefix(&term);
        if prefix.is_empty() {
            return Err(GatewayError::InvalidRequest(format!(
                "search term '{}' needs a prefix before wildcards",
                term
            )));
        }

        let raw = self.fetch(prefix, &exchange).await?;
        let records: Vec<SymbolRecord> = raw
            .into_iter()
            .filter_map(to_symbol_record)
            .filter(|r| !has_wildcard || wildcard_match(&term, &r.symbol))
            .collect();

        info!(
            term = %term,
            exchange = %exchange,
            count = records.len(),
            "심볼 검색 완료"
        );

        self.cache.write().await.insert(
            key,
            CacheEntry {
                records: records.clone(),
                expires_at: Instant::now() + self.settings.cache_ttl,
            },
        );

        Ok(records)
    }

    /// 게이트웨이 검색 호출.
    async fn fetch(&self, prefix: &str, exchange: &str) -> GatewayResult<Vec<RawInstrument>> {
        let client = self
            .connection
            .client()
            .ok_or_else(|| GatewayError::NotConnected("gateway session not established".into()))?;

        let timeout = self.settings.search_timeout;
        tokio::time::timeout(timeout, client.search_symbols(prefix, exchange))
            .await
            .map_err(|_| {
                GatewayError::Timeout(format!(
                    "symbol search exceeded {} seconds",
                    timeout.as_secs()
                ))
            })?
    }

    /// 분기 월물(H, M, U, Z)만 남깁니다.
    pub fn filter_quarterly_contracts(records: Vec<SymbolRecord>) -> Vec<SymbolRecord> {
        let total = records.len();
        let filtered: Vec<_> = records.into_iter().filter(|r| r.is_quarterly()).collect();
        debug!(total, quarterly = filtered.len(), "분기 월물 필터");
        filtered
    }

    /// 만료된 계약을 제외합니다.
    pub fn filter_active_contracts(records: Vec<SymbolRecord>, today: NaiveDate) -> Vec<SymbolRecord> {
        records.into_iter().filter(|r| !r.is_expired(today)).collect()
    }

    /// 다운로드 후보를 자동 선택합니다.
    ///
    /// 활성 계약 중 분기 월물을 우선하고 (없으면 활성 계약 전체), 만기 순으로
    /// 정렬해 최대 `cap`개를 반환합니다.
    pub fn select_relevant(
        records: Vec<SymbolRecord>,
        today: NaiveDate,
        cap: usize,
    ) -> Vec<SymbolRecord> {
        let active = Self::filter_active_contracts(records, today);
        let quarterly: Vec<_> = active.iter().filter(|r| r.is_quarterly()).cloned().collect();
        let mut selected = if quarterly.is_empty() { active } else { quarterly };
        sort_by_expiration(&mut selected);
        selected.truncate(cap);
        selected
    }

    /// 가장 가까운 만기의 활성 계약.
    pub async fn front_month_contract(
        &self,
        base: &str,
        exchange: &str,
        today: NaiveDate,
    ) -> GatewayResult<Option<SymbolRecord>> {
        self.progress
            .report(&format!("Finding front month contract for {}", base), 0.0);

        let records = self.search_symbols(&format!("{}*", base), exchange).await?;
        let mut active = Self::filter_active_contracts(records, today);
        sort_by_expiration(&mut active);

        let front = active.into_iter().next();
        if let Some(front) = &front {
            self.progress
                .report(&format!("Front month contract: {}", front.symbol), 100.0);
        }
        Ok(front)
    }

    /// 특정 계약의 상세 정보. 없으면 `None`.
    pub async fn contract_details(
        &self,
        contract: &str,
        exchange: &str,
    ) -> GatewayResult<Option<SymbolRecord>> {
        let (symbol, _) = split_contract_exchange(contract);
        let records = self.search_symbols(&symbol, exchange).await?;
        Ok(records.into_iter().find(|r| r.symbol == symbol))
    }

    /// 각 계약이 게이트웨이에 존재하고 만료되지 않았는지 확인합니다.
    ///
    /// 결과 순서는 입력 순서와 같습니다. 개별 실패는 무효로 기록됩니다.
    pub async fn validate_contracts(
        &self,
        contracts: &[String],
        exchange: &str,
        today: NaiveDate,
    ) -> Vec<ContractValidation> {
        let total = contracts.len();
        self.progress
            .report(&format!("Validating {} contracts", total), 0.0);

        let checks = contracts.iter().map(|contract| async move {
            let (symbol, suffix) = split_contract_exchange(contract);
            let exchange = if contract.contains('.') { suffix.as_str() } else { exchange };
            match self.contract_details(&symbol, exchange).await {
                Ok(Some(record)) if record.is_expired(today) => ContractValidation {
                    contract: contract.clone(),
                    valid: false,
                    reason: Some("contract expired".to_string()),
                },
                Ok(Some(_)) => ContractValidation {
                    contract: contract.clone(),
                    valid: true,
                    reason: None,
                },
                Ok(None) => ContractValidation {
                    contract: contract.clone(),
                    valid: false,
                    reason: Some("not found".to_string()),
                },
                Err(e) => {
                    warn!(contract = %contract, "계약 검증 실패: {}", e);
                    ContractValidation {
                        contract: contract.clone(),
                        valid: false,
                        reason: Some(e.to_string()),
                    }
                }
            }
        });

        let results = join_all(checks).await;
        let valid = results.iter().filter(|r| r.valid).count();
        self.progress.report(
            &format!("Validation complete: {}/{} contracts valid", valid, total),
            100.0,
        );
        results
    }

    /// 검색 캐시를 비웁니다.
    pub async fn clear_cache(&self) -> usize {
        let mut cache = self.cache.write().await;
        let cleared = cache.len();
        cache.clear();
        cleared
    }
}

#[async_trait]
impl Cleanable for SymbolManager {
    fn component_name(&self) -> &'static str {
        "symbols"
    }

    async fn cleanup(&self) -> AdminResult<CleanupOutcome> {
        let cleared = self.clear_cache().await;
        debug!(cleared, "심볼 캐시 정리");
        Ok(if cleared > 0 {
            CleanupOutcome::Released
        } else {
            CleanupOutcome::NothingToRelease
        })
    }
}

// =============================================================================
// 변환 / 매칭
// =============================================================================

/// 게이트웨이 상품 정보를 심볼 레코드로 변환합니다. 심볼이 비어 있으면 `None`.
pub fn to_symbol_record(raw: RawInstrument) -> Option<SymbolRecord> {
    let symbol = raw.symbol.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return None;
    }

    let parsed = parse_contract_code(&symbol);
    let base_symbol = extract_base_symbol(&symbol);
    let spec = instrument_spec(&base_symbol);
    let exchange = if raw.exchange.trim().is_empty() {
        spec.map(|s| s.exchange.to_string())
            .unwrap_or_else(|| admin_core::DEFAULT_EXCHANGE.to_string())
    } else {
        raw.exchange.trim().to_ascii_uppercase()
    };

    Some(SymbolRecord {
        product_code: if raw.product_code.is_empty() {
            base_symbol.clone()
        } else {
            raw.product_code
        },
        full_name: spec.map(|s| s.full_name.to_string()).or(raw.description),
        expiration: raw
            .expiration
            .or_else(|| parsed.as_ref().and_then(|p| p.estimated_expiration())),
        trading_hours: raw
            .trading_hours
            .or_else(|| spec.map(|s| s.trading_hours.to_string())),
        tick_size: spec.map(|s| s.tick_size),
        point_value: spec.map(|s| s.point_value),
        month_code: parsed.as_ref().map(|p| p.month_code),
        contract_year: parsed.as_ref().map(|p| p.year),
        symbol,
        base_symbol,
        exchange,
    })
}

/// 첫 와일드카드 이전의 접두사.
fn wildcard_prefix(term: &str) -> &str {
    match term.find(['*', '?']) {
        Some(idx) => &term[..idx],
        None => term,
    }
}

/// `*`(임의 길이)와 `?`(한 글자) 와일드카드 매칭. 대소문자를 구분하지 않습니다.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_uppercase()).collect();
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_uppercase()).collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(symbol: &str) -> RawInstrument {
        RawInstrument {
            symbol: symbol.to_string(),
            exchange: "CME".to_string(),
            product_code: String::new(),
            description: None,
            expiration: None,
            trading_hours: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("NQ*", "NQH24"));
        assert!(wildcard_match("nq?24", "NQH24"));
        assert!(wildcard_match("*H24", "ESH24"));
        assert!(wildcard_match("N*2?", "NQZ25"));
        assert!(!wildcard_match("ES*", "NQH24"));
        assert!(!wildcard_match("NQ?", "NQH24"));
        assert!(wildcard_match("*", ""));
    }

    #[test]
    fn test_wildcard_prefix() {
        assert_eq!(wildcard_prefix("NQ*"), "NQ");
        assert_eq!(wildcard_prefix("NQ?24"), "NQ");
        assert_eq!(wildcard_prefix("ESH24"), "ESH24");
        assert_eq!(wildcard_prefix("*H24"), "");
    }

    #[test]
    fn test_record_enrichment() {
        let record = to_symbol_record(raw("nqh24")).unwrap();
        assert_eq!(record.symbol, "NQH24");
        assert_eq!(record.base_symbol, "NQ");
        assert_eq!(record.product_code, "NQ");
        assert_eq!(record.full_name.as_deref(), Some("E-mini NASDAQ-100"));
        assert_eq!(record.month_code, Some('H'));
        assert_eq!(record.contract_year, Some(2024));
        // 2024년 3월 셋째 금요일
        assert_eq!(record.expiration, Some(date(2024, 3, 15)));
        assert!(record.tick_size.is_some());

        assert!(to_symbol_record(raw("  ")).is_none());
    }

    #[test]
    fn test_select_relevant_prefers_quarterly() {
        let records: Vec<_> = ["NQZ24", "NQJ25", "NQH25", "NQM25", "NQU25", "NQZ25", "NQH26"]
            .iter()
            .filter_map(|s| to_symbol_record(raw(s)))
            .collect();

        let selected = SymbolManager::select_relevant(records, date(2025, 1, 10), 4);
        let symbols: Vec<_> = selected.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["NQH25", "NQM25", "NQU25", "NQZ25"]);
    }

    #[test]
    fn test_select_relevant_falls_back_to_all_active() {
        let records: Vec<_> = ["CLG25", "CLF25", "CLJ25"]
            .iter()
            .filter_map(|s| to_symbol_record(raw(s)))
            .collect();

        let selected = SymbolManager::select_relevant(records, date(2025, 1, 1), 2);
        let symbols: Vec<_> = selected.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["CLF25", "CLG25"]);
    }
}
