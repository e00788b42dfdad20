//! 과거 데이터 바(bar) 타입.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 바 단위.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarKind {
    /// 초봉
    Seconds,
    /// 분봉
    Minutes,
}

impl BarKind {
    /// 모든 바 단위.
    pub const ALL: [BarKind; 2] = [BarKind::Seconds, BarKind::Minutes];

    /// 저장 테이블 이름.
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Seconds => "market_data_seconds",
            Self::Minutes => "market_data_minutes",
        }
    }

    /// 사람이 읽는 이름.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Seconds => "second bars",
            Self::Minutes => "minute bars",
        }
    }

    /// 바 하나의 길이 (초).
    pub fn bar_seconds(&self) -> i64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
        }
    }
}

impl std::fmt::Display for BarKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seconds => write!(f, "seconds"),
            Self::Minutes => write!(f, "minutes"),
        }
    }
}

impl std::str::FromStr for BarKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "seconds" | "second" | "second_bars" | "s" => Ok(Self::Seconds),
            "minutes" | "minute" | "minute_bars" | "m" => Ok(Self::Minutes),
            _ => Err(format!("Unknown bar kind: {}", s)),
        }
    }
}

/// 데이터베이스에 저장되는 정규화된 바.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRecord {
    /// 바 시작 시각 (UTC)
    pub timestamp: DateTime<Utc>,
    /// 기초자산 심볼 (NQ)
    pub symbol: String,
    /// 계약 (NQH24)
    pub contract: String,
    /// 거래소 (CME)
    pub exchange: String,
    /// 거래소 MIC 코드 (XCME)
    pub exchange_code: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
    /// 데이터 품질 점수 (0.0 ~ 1.0)
    pub data_quality_score: f64,
    /// 정규장 시간 여부
    pub is_regular_hours: bool,
}

/// OHLC 관계가 유효한지 확인합니다: high ≥ max(open, close), low ≤ min(open, close).
pub fn is_valid_ohlc(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> bool {
    high >= open.max(close) && low <= open.min(close) && high >= low
}

/// 데이터 품질 점수를 계산합니다.
///
/// 1.0에서 시작해 0 이하인 OHLC 필드마다 0.2, OHLC 관계가 깨졌으면 0.3,
/// 거래량이 0이면 0.1을 뺍니다. 결과는 [0, 1]로 제한됩니다.
pub fn quality_score(open: Decimal, high: Decimal, low: Decimal, close: Decimal, volume: i64) -> f64 {
    let mut score = 1.0_f64;

    for value in [open, high, low, close] {
        if value <= Decimal::ZERO {
            score -= 0.2;
        }
    }

    if !is_valid_ohlc(open, high, low, close) {
        score -= 0.3;
    }

    if volume == 0 {
        score -= 0.1;
    }

    score.clamp(0.0, 1.0)
}
