//! 시뮬레이션 게이트웨이.
//!
//! 실제 게이트웨이 없이 관리 도구를 실행하고 테스트하기 위한 결정적인
//! 인프로세스 클라이언트입니다. 상품 명세 테이블로 계약 목록을 만들고,
//! 시드 고정 난수로 바를 생성합니다.

use crate::client::{BarRequest, ClientFactory, GatewayClient, GatewayCredentials, RawBar, RawInstrument};
use crate::error::{GatewayError, GatewayResult};
use crate::market_hours::is_market_open;
use admin_core::{code_from_month, instrument_spec, ContractCode, INSTRUMENT_SPECS};
use async_trait::async_trait;
use chrono::{Datelike, DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// CME 그룹 거래소. 이 중 하나로 검색하면 그룹 전체 상품이 검색됩니다.
const CME_GROUP: [&str; 4] = ["CME", "CBOT", "NYMEX", "COMEX"];

/// 시뮬레이션 동작 설정.
#[derive(Debug, Clone)]
pub struct SimulatedBehavior {
    /// 연결 소요 시간
    pub connect_delay: Duration,
    /// 연결 실패 에러
    pub connect_error: Option<GatewayError>,
    /// 클라이언트 생성 실패 메시지
    pub create_error: Option<String>,
    /// 검색 결과를 비움
    pub empty_search: bool,
    /// 바 조회 실패 에러
    pub bars_error: Option<GatewayError>,
    /// 바 조회 소요 시간
    pub bars_delay: Duration,
    /// 요청당 최대 바 수
    pub max_bars_per_request: usize,
    /// 난수 시드
    pub seed: u64,
    /// 계약 목록 기준일
    pub listing_date: NaiveDate,
}

impl Default for SimulatedBehavior {
    fn default() -> Self {
        Self {
            connect_delay: Duration::ZERO,
            connect_error: None,
            create_error: None,
            empty_search: false,
            bars_error: None,
            bars_delay: Duration::ZERO,
            max_bars_per_request: 1_000,
            seed: 42,
            listing_date: Utc::now().date_naive(),
        }
    }
}

/// 호출 횟수.
#[derive(Debug, Default)]
pub struct CallCounters {
    pub connect: AtomicU32,
    pub disconnect: AtomicU32,
    pub search: AtomicU32,
    pub bars: AtomicU32,
}

/// 결정적 인프로세스 게이트웨이.
#[derive(Debug)]
pub struct SimulatedGateway {
    behavior: Mutex<SimulatedBehavior>,
    connected: AtomicBool,
    calls: CallCounters,
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(SimulatedBehavior::default())
    }
}

impl SimulatedGateway {
    pub fn new(behavior: SimulatedBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            connected: AtomicBool::new(false),
            calls: CallCounters::default(),
        }
    }

    /// 현재 동작 설정 사본.
    pub fn behavior(&self) -> SimulatedBehavior {
        match self.behavior.lock() {
            Ok(b) => b.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 동작 설정을 변경합니다.
    pub fn configure(&self, f: impl FnOnce(&mut SimulatedBehavior)) {
        let mut guard = match self.behavior.lock() {
            Ok(b) => b,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }

    /// 연결 끊김을 흉내냅니다.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn calls(&self) -> &CallCounters {
        &self.calls
    }

    /// 기준일 전후의 상장 계약 목록.
    ///
    /// 상품마다 직전 만료 계약 1개와 이후 6개 월물을 생성합니다.
    pub fn listing(&self) -> Vec<RawInstrument> {
        let anchor = self.behavior().listing_date;
        INSTRUMENT_SPECS
            .iter()
            .flat_map(|spec| listed_contracts(spec.base_symbol, spec.months, anchor))
            .map(|code| {
                let spec = instrument_spec(&code.base);
                RawInstrument {
                    symbol: code.code(),
                    exchange: spec.map(|s| s.exchange).unwrap_or("CME").to_string(),
                    product_code: code.base.clone(),
                    description: spec.map(|s| s.full_name.to_string()),
                    expiration: code.estimated_expiration(),
                    trading_hours: spec.map(|s| s.trading_hours.to_string()),
                }
            })
            .collect()
    }
}

/// `anchor` 전후의 상장 월물. 만료된 계약 1개와 이후 6개.
fn listed_contracts(base: &str, months: &str, anchor: NaiveDate) -> Vec<ContractCode> {
    let mut contracts = Vec::new();
    let mut expired: Option<ContractCode> = None;

    // 1년 전부터 2년 후까지 훑음
    for offset in -12..36 {
        let index = anchor.year() * 12 + anchor.month0() as i32 + offset;
        let (year, month) = (index.div_euclid(12), index.rem_euclid(12) as u32 + 1);
        let Some(month_code) = code_from_month(month) else {
            continue;
        };
        if !months.contains(month_code) {
            continue;
        }
        let code = ContractCode {
            base: base.to_string(),
            month_code,
            month,
            year,
        };
        match code.estimated_expiration() {
            Some(exp) if exp < anchor => expired = Some(code),
            Some(_) if contracts.len() < 6 => contracts.push(code),
            _ => {}
        }
    }

    expired.into_iter().chain(contracts).collect()
}

fn same_venue(listed: &str, requested: &str) -> bool {
    if requested.is_empty() || listed.eq_ignore_ascii_case(requested) {
        return true;
    }
    let in_group = |e: &str| CME_GROUP.iter().any(|g| g.eq_ignore_ascii_case(e));
    in_group(listed) && in_group(requested)
}

/// 상품별 시뮬레이션 기준 가격.
fn base_price(base: &str) -> Decimal {
    match base {
        "NQ" => dec!(18000),
        "ES" => dec!(5000),
        "YM" => dec!(39000),
        "RTY" => dec!(2000),
        "CL" => dec!(78),
        "GC" => dec!(2050),
        _ => dec!(100),
    }
}

fn request_seed(seed: u64, request: &BarRequest) -> u64 {
    let symbol_hash = request
        .symbol
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x100_0000_01b3));
    seed ^ symbol_hash ^ (request.start.timestamp() as u64)
}

/// 요청 구간의 개장 시간 바를 생성합니다.
fn generate_bars(request: &BarRequest, seed: u64, limit: usize) -> Vec<RawBar> {
    let base = admin_core::extract_base_symbol(&request.symbol);
    let tick = instrument_spec(&base).map(|s| s.tick_size).unwrap_or(dec!(0.01));
    let step = ChronoDuration::seconds(request.kind.bar_seconds());
    let mut rng = StdRng::seed_from_u64(request_seed(seed, request));
    let mut price = base_price(&base);
    let mut bars = Vec::new();

    let mut ts: DateTime<Utc> = request.start;
    while ts < request.end && bars.len() < limit {
        if is_market_open(ts) {
            let open = price;
            let close = open + tick * Decimal::from(rng.gen_range(-4_i64..=4));
            let high = open.max(close) + tick * Decimal::from(rng.gen_range(0_i64..=2));
            let low = open.min(close) - tick * Decimal::from(rng.gen_range(0_i64..=2));
            bars.push(RawBar {
                timestamp: ts,
                open,
                high,
                low,
                close,
                volume: rng.gen_range(0..500),
            });
            price = close;
        }
        ts += step;
    }
    bars
}

#[async_trait]
impl GatewayClient for SimulatedGateway {
    async fn connect(&self) -> GatewayResult<()> {
        self.calls.connect.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior();
        if !behavior.connect_delay.is_zero() {
            tokio::time::sleep(behavior.connect_delay).await;
        }
        if let Some(err) = behavior.connect_error {
            return Err(err);
        }
        self.connected.store(true, Ordering::SeqCst);
        debug!("시뮬레이션 게이트웨이 연결");
        Ok(())
    }

    async fn disconnect(&self) -> GatewayResult<()> {
        self.calls.disconnect.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn search_symbols(&self, pattern: &str, exchange: &str) -> GatewayResult<Vec<RawInstrument>> {
        self.calls.search.fetch_add(1, Ordering::SeqCst);
        if !self.connected.load(Ordering::SeqCst) {
            return Err(GatewayError::NotConnected("simulated session closed".to_string()));
        }
        if self.behavior().empty_search {
            return Ok(Vec::new());
        }

        let pattern = pattern.to_ascii_uppercase();
        Ok(self
            .listing()
            .into_iter()
            .filter(|i| i.symbol.starts_with(&pattern) && same_venue(&i.exchange, exchange))
            .collect())
    }

    async fn get_historical_time_bars(&self, request: &BarRequest) -> GatewayResult<Vec<RawBar>> {
        self.calls.bars.fetch_add(1, Ordering::SeqCst);
        if !self.connected.load(Ordering::SeqCst) {
            return Err(GatewayError::NotConnected("simulated session closed".to_string()));
        }
        let behavior = self.behavior();
        if !behavior.bars_delay.is_zero() {
            tokio::time::sleep(behavior.bars_delay).await;
        }
        if let Some(err) = behavior.bars_error {
            return Err(err);
        }
        if request.end <= request.start {
            return Err(GatewayError::InvalidRequest("empty time range".to_string()));
        }
        Ok(generate_bars(request, behavior.seed, behavior.max_bars_per_request))
    }
}

/// 항상 같은 시뮬레이션 게이트웨이를 반환하는 팩토리.
#[derive(Debug, Clone, Default)]
pub struct SimulatedClientFactory {
    gateway: Arc<SimulatedGateway>,
}

impl SimulatedClientFactory {
    pub fn new(gateway: Arc<SimulatedGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> Arc<SimulatedGateway> {
        self.gateway.clone()
    }
}

impl ClientFactory for SimulatedClientFactory {
    fn create(&self, credentials: &GatewayCredentials) -> GatewayResult<Arc<dyn GatewayClient>> {
        if let Some(message) = self.gateway.behavior().create_error {
            return Err(GatewayError::ClientCreation(message));
        }
        debug!(
            user = %credentials.user,
            system = %credentials.system_name,
            "시뮬레이션 클라이언트 생성"
        );
        Ok(self.gateway.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admin_core::{BarKind, is_valid_ohlc};
    use chrono::TimeZone;

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
    }

    #[test]
    fn test_listing_contracts() {
        let codes: Vec<_> = listed_contracts("NQ", "HMUZ", anchor())
            .iter()
            .map(ContractCode::code)
            .collect();
        assert_eq!(codes, vec!["NQZ23", "NQH24", "NQM24", "NQU24", "NQZ24", "NQH25", "NQM25"]);
    }

    #[test]
    fn test_same_venue() {
        assert!(same_venue("CBOT", "CME"));
        assert!(same_venue("CME", "cme"));
        assert!(!same_venue("ICE", "CME"));
    }

    #[tokio::test]
    async fn test_search_requires_connection() {
        let gateway = SimulatedGateway::new(SimulatedBehavior {
            listing_date: anchor(),
            ..Default::default()
        });
        assert!(gateway.search_symbols("NQ", "CME").await.is_err());

        gateway.connect().await.unwrap();
        let found = gateway.search_symbols("es", "CME").await.unwrap();
        assert_eq!(found.len(), 7);
        assert!(found.iter().all(|i| i.symbol.starts_with("ES")));
    }

    #[test]
    fn test_generated_bars_are_deterministic_and_valid() {
        // 2024-03-05 화요일 14:00 ~ 15:00 UTC
        let request = BarRequest {
            symbol: "NQH24".to_string(),
            exchange: "CME".to_string(),
            kind: BarKind::Minutes,
            start: Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 3, 5, 15, 0, 0).unwrap(),
        };

        let a = generate_bars(&request, 7, 1_000);
        let b = generate_bars(&request, 7, 1_000);
        assert_eq!(a.len(), 60);
        assert_eq!(a, b);
        assert!(a.iter().all(|bar| is_valid_ohlc(bar.open, bar.high, bar.low, bar.close)));

        assert_eq!(generate_bars(&request, 7, 10).len(), 10);
    }
}
