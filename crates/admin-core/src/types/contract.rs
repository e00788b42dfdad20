//! 선물 계약 코드와 상품 명세.
//!
//! 계약 코드는 `{기초자산}{월물 코드}{연도}` 형식입니다 (예: `NQH24` = 2024년 3월물).
//! 거래소 접미사가 붙을 수 있습니다 (`NQH24.CME`).

use chrono::{NaiveDate, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// 월물 코드 (1월 ~ 12월).
pub const MONTH_CODES: [char; 12] = ['F', 'G', 'H', 'J', 'K', 'M', 'N', 'Q', 'U', 'V', 'X', 'Z'];

/// 분기 월물 코드 (3, 6, 9, 12월).
pub const QUARTERLY_MONTH_CODES: [char; 4] = ['H', 'M', 'U', 'Z'];

/// 거래소 접미사가 없을 때 사용하는 기본 거래소.
pub const DEFAULT_EXCHANGE: &str = "CME";

/// 월물 코드를 월(1-12)로 변환합니다.
pub fn month_from_code(code: char) -> Option<u32> {
    MONTH_CODES
        .iter()
        .position(|c| *c == code.to_ascii_uppercase())
        .map(|i| i as u32 + 1)
}

/// 월(1-12)을 월물 코드로 변환합니다.
pub fn code_from_month(month: u32) -> Option<char> {
    MONTH_CODES.get(month.checked_sub(1)? as usize).copied()
}

/// 분기 월물 코드인지 확인합니다.
pub fn is_quarterly_code(code: char) -> bool {
    QUARTERLY_MONTH_CODES.contains(&code.to_ascii_uppercase())
}

/// 거래소 이름을 MIC 코드로 변환합니다. 알 수 없는 거래소는 그대로 반환합니다.
pub fn exchange_mic(exchange: &str) -> String {
    match exchange.to_ascii_uppercase().as_str() {
        "CME" => "XCME".to_string(),
        "CBOT" => "XCBT".to_string(),
        "NYMEX" => "XNYM".to_string(),
        "COMEX" => "XCEC".to_string(),
        "ICE" => "IFUS".to_string(),
        other => other.to_string(),
    }
}

// =============================================================================
// 상품 명세
// =============================================================================

/// 선물 상품 명세.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstrumentSpec {
    /// 기초자산 심볼
    pub base_symbol: &'static str,
    /// 상품 전체 이름
    pub full_name: &'static str,
    /// 최소 호가 단위
    pub tick_size: Decimal,
    /// 포인트당 가치 (USD)
    pub point_value: Decimal,
    /// 상장 거래소
    pub exchange: &'static str,
    /// 상장 월물 코드
    pub months: &'static str,
    /// 거래 시간 (Central Time)
    pub trading_hours: &'static str,
}

const GLOBEX_HOURS: &str = "Sun-Fri 17:00-16:00 CT";

/// 지원 상품 명세 테이블.
pub static INSTRUMENT_SPECS: &[InstrumentSpec] = &[
    InstrumentSpec {
        base_symbol: "NQ",
        full_name: "E-mini NASDAQ-100",
        tick_size: dec!(0.25),
        point_value: dec!(20),
        exchange: "CME",
        months: "HMUZ",
        trading_hours: GLOBEX_HOURS,
    },
    InstrumentSpec {
        base_symbol: "ES",
        full_name: "E-mini S&P 500",
        tick_size: dec!(0.25),
        point_value: dec!(50),
        exchange: "CME",
        months: "HMUZ",
        trading_hours: GLOBEX_HOURS,
    },
    InstrumentSpec {
        base_symbol: "YM",
        full_name: "E-mini Dow Jones",
        tick_size: dec!(1),
        point_value: dec!(5),
        exchange: "CBOT",
        months: "HMUZ",
        trading_hours: GLOBEX_HOURS,
    },
    InstrumentSpec {
        base_symbol: "RTY",
        full_name: "E-mini Russell 2000",
        tick_size: dec!(0.10),
        point_value: dec!(50),
        exchange: "CME",
        months: "HMUZ",
        trading_hours: GLOBEX_HOURS,
    },
    InstrumentSpec {
        base_symbol: "CL",
        full_name: "Crude Oil",
        tick_size: dec!(0.01),
        point_value: dec!(1000),
        exchange: "NYMEX",
        months: "FGHJKMNQUVXZ",
        trading_hours: GLOBEX_HOURS,
    },
    InstrumentSpec {
        base_symbol: "GC",
        full_name: "Gold",
        tick_size: dec!(0.10),
        point_value: dec!(100),
        exchange: "COMEX",
        months: "GJMQVZ",
        trading_hours: GLOBEX_HOURS,
    },
];

/// 기초자산 심볼로 상품 명세를 찾습니다.
pub fn instrument_spec(base_symbol: &str) -> Option<&'static InstrumentSpec> {
    INSTRUMENT_SPECS
        .iter()
        .find(|spec| spec.base_symbol.eq_ignore_ascii_case(base_symbol))
}

// =============================================================================
// 계약 코드
// =============================================================================

/// 파싱된 계약 코드.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCode {
    /// 기초자산 (NQ)
    pub base: String,
    /// 월물 코드 (H)
    pub month_code: char,
    /// 월 (3)
    pub month: u32,
    /// 연도 (2024)
    pub year: i32,
}

impl ContractCode {
    /// 계약 코드 문자열 (NQH24).
    pub fn code(&self) -> String {
        format!("{}{}{:02}", self.base, self.month_code, self.year % 100)
    }

    /// 분기 월물 여부.
    pub fn is_quarterly(&self) -> bool {
        is_quarterly_code(self.month_code)
    }

    /// 추정 만기일: 계약 월의 셋째 금요일.
    pub fn estimated_expiration(&self) -> Option<NaiveDate> {
        NaiveDate::from_weekday_of_month_opt(self.year, self.month, Weekday::Fri, 3)
    }
}

/// 계약 코드를 파싱합니다. 거래소 접미사는 무시합니다.
///
/// 연도는 두 자리(`NQH24`) 또는 한 자리(`NQH4`, 2020년대로 해석)를 허용합니다.
pub fn parse_contract_code(code: &str) -> Option<ContractCode> {
    let (symbol, _) = split_contract_exchange(code);
    let digits = symbol.chars().rev().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 2 || symbol.len() < digits + 2 {
        return None;
    }

    let (head, year_str) = symbol.split_at(symbol.len() - digits);
    let month_code = head.chars().last()?;
    let month = month_from_code(month_code)?;
    let base = &head[..head.len() - 1];
    if base.is_empty() || !base.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    let yy: i32 = year_str.parse().ok()?;
    let year = if digits == 1 { 2020 + yy } else { 2000 + yy };

    Some(ContractCode {
        base: base.to_string(),
        month_code,
        month,
        year,
    })
}

/// 계약 코드에서 기초자산 심볼을 추출합니다 (`NQH24` → `NQ`).
///
/// 계약 코드 형식이 아니면 입력을 그대로 (대문자로) 반환합니다.
pub fn extract_base_symbol(code: &str) -> String {
    match parse_contract_code(code) {
        Some(parsed) => parsed.base,
        None => split_contract_exchange(code).0,
    }
}

/// `SYM.EXCH` 형식을 (심볼, 거래소)로 분리합니다. 거래소가 없으면 CME.
pub fn split_contract_exchange(contract: &str) -> (String, String) {
    let contract = contract.trim().to_ascii_uppercase();
    match contract.split_once('.') {
        Some((symbol, exchange)) if !exchange.is_empty() => {
            (symbol.to_string(), exchange.to_string())
        }
        Some((symbol, _)) => (symbol.to_string(), DEFAULT_EXCHANGE.to_string()),
        None => (contract, DEFAULT_EXCHANGE.to_string()),
    }
}

/// 다운로드 대상으로 허용되는 계약 식별자인지 확인합니다.
///
/// 형식: 영숫자 2자 이상, 선택적으로 `.거래소`(영문자).
pub fn is_well_formed_contract(contract: &str) -> bool {
    let contract = contract.trim().to_ascii_uppercase();
    let mut parts = contract.split('.');
    let symbol = parts.next().unwrap_or_default();
    let exchange = parts.next();
    if parts.next().is_some() {
        return false;
    }
    let symbol_ok = symbol.len() >= 2 && symbol.chars().all(|c| c.is_ascii_alphanumeric());
    let exchange_ok = match exchange {
        None => true,
        Some(e) => !e.is_empty() && e.chars().all(|c| c.is_ascii_alphabetic()),
    };
    symbol_ok && exchange_ok
}

// =============================================================================
// 심볼 레코드
// =============================================================================

/// 심볼 검색 결과 레코드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRecord {
    /// 계약 심볼 (NQH24)
    pub symbol: String,
    /// 기초자산 심볼 (NQ)
    pub base_symbol: String,
    /// 거래소
    pub exchange: String,
    /// 상품 코드
    pub product_code: String,
    /// 상품 이름
    pub full_name: Option<String>,
    /// 만기일
    pub expiration: Option<NaiveDate>,
    /// 거래 시간
    pub trading_hours: Option<String>,
    /// 최소 호가 단위
    pub tick_size: Option<Decimal>,
    /// 포인트 가치
    pub point_value: Option<Decimal>,
    /// 월물 코드
    pub month_code: Option<char>,
    /// 계약 연도
    pub contract_year: Option<i32>,
}

impl SymbolRecord {
    /// 분기 월물 여부.
    pub fn is_quarterly(&self) -> bool {
        self.month_code.map(is_quarterly_code).unwrap_or(false)
    }

    /// `today` 기준 만료 여부. 만기일을 모르면 만료되지 않은 것으로 봅니다.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiration.map(|exp| exp < today).unwrap_or(false)
    }

    /// 만기일 또는 추정 만기일.
    pub fn sort_key(&self) -> (NaiveDate, String) {
        let fallback = self
            .contract_year
            .zip(self.month_code.and_then(month_from_code))
            .and_then(|(y, m)| NaiveDate::from_ymd_opt(y, m, 1))
            .unwrap_or(NaiveDate::MAX);
        (self.expiration.unwrap_or(fallback), self.symbol.clone())
    }

    /// 다운로드 식별자 (`NQH24.CME`).
    pub fn contract_id(&self) -> String {
        format!("{}.{}", self.symbol, self.exchange)
    }
}

/// 만기 순으로 심볼을 정렬합니다.
pub fn sort_by_expiration(records: &mut [SymbolRecord]) {
    records.sort_by_key(|r| r.sort_key());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_codes() {
        assert_eq!(month_from_code('F'), Some(1));
        assert_eq!(month_from_code('h'), Some(3));
        assert_eq!(month_from_code('Z'), Some(12));
        assert_eq!(month_from_code('A'), None);
        assert_eq!(code_from_month(9), Some('U'));
        assert_eq!(code_from_month(0), None);
        assert_eq!(code_from_month(13), None);
        assert!(is_quarterly_code('M'));
        assert!(!is_quarterly_code('F'));
    }

    #[test]
    fn test_parse_contract_code() {
        let parsed = parse_contract_code("NQH24").unwrap();
        assert_eq!(parsed.base, "NQ");
        assert_eq!(parsed.month_code, 'H');
        assert_eq!(parsed.month, 3);
        assert_eq!(parsed.year, 2024);
        assert_eq!(parsed.code(), "NQH24");

        let parsed = parse_contract_code("rtyz5.cme").unwrap();
        assert_eq!(parsed.base, "RTY");
        assert_eq!(parsed.year, 2025);

        assert!(parse_contract_code("NQ").is_none());
        assert!(parse_contract_code("H24").is_none());
        assert!(parse_contract_code("NQA24").is_none());
    }

    #[test]
    fn test_estimated_expiration_is_third_friday() {
        let parsed = parse_contract_code("ESH24").unwrap();
        assert_eq!(
            parsed.estimated_expiration(),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
    }

    #[test]
    fn test_extract_base_symbol() {
        assert_eq!(extract_base_symbol("ESM25"), "ES");
        assert_eq!(extract_base_symbol("NQ"), "NQ");
        assert_eq!(extract_base_symbol("gc.comex"), "GC");
    }

    #[test]
    fn test_split_contract_exchange() {
        assert_eq!(
            split_contract_exchange("NQH24.CME"),
            ("NQH24".to_string(), "CME".to_string())
        );
        assert_eq!(
            split_contract_exchange("clf25"),
            ("CLF25".to_string(), "CME".to_string())
        );
    }

    #[test]
    fn test_well_formed_contract() {
        assert!(is_well_formed_contract("NQH24"));
        assert!(is_well_formed_contract("nqh24.cme"));
        assert!(!is_well_formed_contract("N"));
        assert!(!is_well_formed_contract("NQ H24"));
        assert!(!is_well_formed_contract("NQH24."));
        assert!(!is_well_formed_contract("NQH24.CME.X"));
    }

    #[test]
    fn test_exchange_mic() {
        assert_eq!(exchange_mic("CME"), "XCME");
        assert_eq!(exchange_mic("comex"), "XCEC");
        assert_eq!(exchange_mic("EUREX"), "EUREX");
    }

    #[test]
    fn test_instrument_spec_lookup() {
        let spec = instrument_spec("nq").unwrap();
        assert_eq!(spec.point_value, dec!(20));
        assert_eq!(instrument_spec("CL").unwrap().exchange, "NYMEX");
        assert!(instrument_spec("ZZ").is_none());
    }
}
