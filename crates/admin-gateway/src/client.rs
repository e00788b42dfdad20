//! 외부 시장 데이터 게이트웨이 클라이언트 trait 정의.
//!
//! 게이트웨이 SDK는 [`GatewayClient`]와 [`ClientFactory`]를 통해서만 사용됩니다.
//! 연결 관리자가 클라이언트를 소유하고, 다른 관리자는 공유 핸들을 빌려 씁니다.

use crate::error::GatewayResult;
use admin_core::{AdminError, AdminResult, AppConfig, BarKind, GatewayConfig};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;

/// 게이트웨이 접속 자격증명.
#[derive(Debug, Clone)]
pub struct GatewayCredentials {
    pub user: String,
    pub password: SecretString,
    pub system_name: String,
    pub app_name: String,
    pub app_version: String,
    /// 접속 지역 (예: "Chicago")
    pub gateway: String,
}

impl From<&GatewayConfig> for GatewayCredentials {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            user: config.user.clone(),
            password: config.password.clone(),
            system_name: config.system_name.clone(),
            app_name: config.app_name.clone(),
            app_version: config.app_version.clone(),
            gateway: config.gateway.clone(),
        }
    }
}

// =============================================================================
// 자격증명 공급자
// =============================================================================

/// 연결 시점에 자격증명을 로드합니다.
pub trait CredentialsProvider: Send + Sync {
    fn load(&self) -> AdminResult<GatewayCredentials>;
}

/// 설정 파일/환경 변수에서 자격증명을 읽습니다.
#[derive(Debug, Clone, Default)]
pub struct ConfigCredentials {
    path: Option<PathBuf>,
}

impl ConfigCredentials {
    /// 설정 파일 경로를 지정합니다. `None`이면 기본 경로를 사용합니다.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl CredentialsProvider for ConfigCredentials {
    fn load(&self) -> AdminResult<GatewayCredentials> {
        let config = AppConfig::load(self.path.as_deref())?;
        config.gateway.validate()?;
        Ok(GatewayCredentials::from(&config.gateway))
    }
}

/// 이미 로드된 설정을 그대로 사용합니다.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    config: GatewayConfig,
}

impl StaticCredentials {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }
}

impl CredentialsProvider for StaticCredentials {
    fn load(&self) -> AdminResult<GatewayCredentials> {
        self.config
            .validate()
            .map_err(|e| AdminError::Config(format!("invalid gateway settings ({})", e)))?;
        Ok(GatewayCredentials::from(&self.config))
    }
}

// =============================================================================
// 게이트웨이 데이터 타입
// =============================================================================

/// 게이트웨이가 반환하는 상품 정보.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInstrument {
    pub symbol: String,
    pub exchange: String,
    pub product_code: String,
    pub description: Option<String>,
    pub expiration: Option<NaiveDate>,
    pub trading_hours: Option<String>,
}

/// 게이트웨이가 반환하는 바.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

/// 과거 바 요청. 기간은 `[start, end)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BarRequest {
    pub symbol: String,
    pub exchange: String,
    pub kind: BarKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

// =============================================================================
// 클라이언트 trait
// =============================================================================

/// 시장 데이터 게이트웨이 클라이언트.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// 게이트웨이에 연결.
    async fn connect(&self) -> GatewayResult<()>;

    /// 연결 해제.
    async fn disconnect(&self) -> GatewayResult<()>;

    /// 클라이언트가 보고하는 연결 상태.
    async fn is_connected(&self) -> bool;

    /// 심볼 검색. `pattern`은 와일드카드가 없는 접두사입니다.
    async fn search_symbols(&self, pattern: &str, exchange: &str)
        -> GatewayResult<Vec<RawInstrument>>;

    /// 과거 시간 바 조회.
    async fn get_historical_time_bars(&self, request: &BarRequest) -> GatewayResult<Vec<RawBar>>;
}

/// 자격증명으로 클라이언트를 생성합니다.
pub trait ClientFactory: Send + Sync {
    fn create(&self, credentials: &GatewayCredentials) -> GatewayResult<Arc<dyn GatewayClient>>;
}
