//! 설정 관리.
//!
//! 설정은 다음 순서로 병합됩니다 (뒤쪽이 우선):
//! 1. 내장 기본값
//! 2. TOML 파일 (기본 `config/admin.toml`, 없으면 무시)
//! 3. `ADMIN__SECTION__KEY` 환경 변수
//! 4. 기존 도구와 호환되는 환경 변수 (`RITHMIC_*`, `POSTGRES_*`, `DB_POOL_*`, `DATABASE_URL`)
//!
//! `.env` 파일은 [`dotenvy`]로 먼저 로드됩니다.

use crate::error::{AdminError, AdminResult};
use crate::logging::{LogConfig, LogFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 기본 설정 파일 경로 (확장자 제외).
pub const DEFAULT_CONFIG_PATH: &str = "config/admin";

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 게이트웨이 자격증명 및 연결 설정
    pub gateway: GatewayConfig,
    /// 헬스 모니터 설정
    pub health: HealthConfig,
    /// 재연결 백오프 설정
    pub reconnect: ReconnectConfig,
    /// 데이터베이스 설정
    pub database: DatabaseConfig,
    /// 과거 데이터 다운로드 설정
    pub download: DownloadConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
}

// =============================================================================
// Gateway
// =============================================================================

/// 게이트웨이 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// 사용자 ID
    pub user: String,
    /// 비밀번호
    pub password: SecretString,
    /// 시스템 이름 (예: "Rithmic Paper Trading")
    pub system_name: String,
    /// 애플리케이션 이름
    pub app_name: String,
    /// 애플리케이션 버전
    pub app_version: String,
    /// 게이트웨이 (접속 지역)
    pub gateway: String,
    /// 연결 타임아웃 (초)
    pub connect_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: SecretString::from(String::new()),
            system_name: "Rithmic Paper Trading".to_string(),
            app_name: "futures-admin".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            gateway: "Chicago".to_string(),
            connect_timeout_secs: 30,
        }
    }
}

impl GatewayConfig {
    /// 연결에 필요한 값이 모두 있는지 확인합니다.
    pub fn validate(&self) -> AdminResult<()> {
        if self.user.trim().is_empty() {
            return Err(AdminError::Config("gateway user is not set".to_string()));
        }
        if self.password.expose_secret().is_empty() {
            return Err(AdminError::Config("gateway password is not set".to_string()));
        }
        if self.system_name.trim().is_empty() {
            return Err(AdminError::Config("gateway system name is not set".to_string()));
        }
        Ok(())
    }

    /// 연결 타임아웃.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// =============================================================================
// Health / Reconnect
// =============================================================================

/// 연결 헬스 모니터 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// 하트비트 간격 (초)
    pub heartbeat_interval_secs: u64,
    /// 하트비트가 이 시간보다 오래되면 비정상 (초)
    pub stale_after_secs: u64,
    /// 최대 연결 유지 시간, 초과 시 재연결 (초)
    pub max_connection_age_secs: u64,
    /// 모니터 태스크 종료 대기 시간 (초)
    pub monitor_join_timeout_secs: u64,
    /// 기본 연결 해제 타임아웃 (초)
    pub disconnect_timeout_secs: u64,
    /// 재연결 시 연결 해제 타임아웃 (초)
    pub reconnect_disconnect_timeout_secs: u64,
    /// 보관할 최근 에러 수
    pub recent_error_capacity: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            stale_after_secs: 60,
            max_connection_age_secs: 3600,
            monitor_join_timeout_secs: 2,
            disconnect_timeout_secs: 5,
            reconnect_disconnect_timeout_secs: 3,
            recent_error_capacity: 20,
        }
    }
}

/// 재연결 백오프 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// 첫 재시도 전 대기 (밀리초)
    pub base_delay_ms: u64,
    /// 최대 대기 (밀리초)
    pub max_delay_ms: u64,
    /// 자동 재연결을 중단하는 연속 실패 횟수
    pub max_consecutive_failures: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_consecutive_failures: 5,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 전체 URL (설정 시 host/port 등보다 우선)
    pub url: Option<SecretString>,
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
    /// 데이터베이스 이름
    pub name: String,
    /// 사용자
    pub user: String,
    /// 비밀번호
    pub password: SecretString,
    /// 풀의 최대 연결 수
    pub max_connections: u32,
    /// 풀의 최소 연결 수
    pub min_connections: u32,
    /// 연결 획득 타임아웃 (초)
    pub acquire_timeout_secs: u64,
    /// 유휴 연결 타임아웃 (초)
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            name: "futures_data".to_string(),
            user: "postgres".to_string(),
            password: SecretString::from(String::new()),
            max_connections: 10,
            min_connections: 2,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

impl DatabaseConfig {
    /// 접속 URL을 생성합니다. 비밀번호가 포함되므로 로그에 남기지 마세요.
    pub fn connection_url(&self) -> SecretString {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let password = self.password.expose_secret();
        let credentials = if password.is_empty() {
            self.user.clone()
        } else {
            format!("{}:{}", self.user, password)
        };
        SecretString::from(format!(
            "postgresql://{}@{}:{}/{}",
            credentials, self.host, self.port, self.name
        ))
    }

    /// 로그용 접속 대상 (비밀번호 제외).
    pub fn display_target(&self) -> String {
        if self.url.is_some() {
            return "<DATABASE_URL>".to_string();
        }
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.name)
    }
}

// =============================================================================
// Download
// =============================================================================

/// 과거 데이터 다운로드 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// 기본 다운로드 일수
    pub default_days: u32,
    /// 최대 다운로드 일수
    pub max_days: u32,
    /// 초봉 청크 크기 (시간)
    pub second_chunk_hours: u32,
    /// 분봉 청크 크기 (일)
    pub minute_chunk_days: u32,
    /// 초봉 요청 간 지연 (밀리초)
    pub second_request_delay_ms: u64,
    /// 분봉 요청 간 지연 (밀리초)
    pub minute_request_delay_ms: u64,
    /// 요청당 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 한 번에 삽입할 최대 레코드 수
    pub insert_batch_size: usize,
    /// 심볼 검색 후 자동 선택할 최대 계약 수
    pub max_selected_contracts: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            default_days: 7,
            max_days: 365,
            second_chunk_hours: 6,
            minute_chunk_days: 2,
            second_request_delay_ms: 500,
            minute_request_delay_ms: 300,
            request_timeout_secs: 60,
            insert_batch_size: 500,
            max_selected_contracts: 4,
        }
    }
}

impl DownloadConfig {
    /// 요청당 타임아웃.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Logging
// =============================================================================

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    /// [`LogConfig`]로 변환합니다.
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig::new(self.level.clone()).with_format(self.format)
    }
}

// =============================================================================
// Loading
// =============================================================================

/// 기존 도구와 호환되는 환경 변수 → 설정 키 매핑.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("RITHMIC_USER", "gateway.user"),
    ("RITHMIC_PASSWORD", "gateway.password"),
    ("RITHMIC_SYSTEM_NAME", "gateway.system_name"),
    ("RITHMIC_APP_NAME", "gateway.app_name"),
    ("RITHMIC_APP_VERSION", "gateway.app_version"),
    ("RITHMIC_GATEWAY", "gateway.gateway"),
    ("DATABASE_URL", "database.url"),
    ("POSTGRES_HOST", "database.host"),
    ("POSTGRES_PORT", "database.port"),
    ("POSTGRES_DB", "database.name"),
    ("POSTGRES_USER", "database.user"),
    ("POSTGRES_PASSWORD", "database.password"),
    ("DB_POOL_SIZE", "database.max_connections"),
    ("DB_POOL_TIMEOUT", "database.acquire_timeout_secs"),
];

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// `path`가 `None`이면 [`DEFAULT_CONFIG_PATH`]를 찾고, 없으면 건너뜁니다.
    pub fn load(path: Option<&Path>) -> AdminResult<Self> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_PATH).required(false),
        };

        let mut builder = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("ADMIN")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in LEGACY_ENV_KEYS {
            let value = std::env::var(var).ok().filter(|v| !v.is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        let config: AppConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }
}
