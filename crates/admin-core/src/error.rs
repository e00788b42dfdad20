//! 관리 도구의 에러 타입.
//!
//! 모든 실패는 [`ErrorCategory`]로 분류되며, 사용자에게는 짧은 메시지와
//! (가능한 경우) 해결 방법 안내만 노출됩니다. 스택 트레이스는 로그에만 남습니다.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 에러 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    /// 자격증명/설정 로드 실패
    Config,
    /// 게이트웨이 클라이언트 생성 실패
    ClientCreation,
    /// 연결 또는 작업 시간 초과
    Timeout,
    /// 네트워크/인증 실패
    Connection,
    /// 하트비트 또는 연결 수명 초과
    Stale,
    /// 잘못되거나 누락된 입력
    Validation,
    /// 데이터베이스 협력자 실패
    Database,
    /// 예상하지 못한 실패
    Unexpected,
}

impl ErrorCategory {
    /// 분류 이름 (직렬화 형식과 동일).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::ClientCreation => "client-creation",
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Stale => "stale",
            Self::Validation => "validation",
            Self::Database => "database",
            Self::Unexpected => "unexpected",
        }
    }

    /// 사용자에게 보여줄 해결 방법 안내.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::Config => Some("check gateway credentials in the environment or config file"),
            Self::ClientCreation => Some("verify the gateway client settings (system name, app name, gateway)"),
            Self::Timeout => Some("check network connectivity"),
            Self::Connection => Some("verify network access and gateway credentials"),
            Self::Stale => Some("the connection will be rotated on the next reconnect"),
            Self::Validation => None,
            Self::Database => Some("check that the database is running and reachable"),
            Self::Unexpected => Some("see the log output for details"),
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 관리 도구 핵심 에러.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdminError {
    /// 설정 에러
    #[error("Configuration Error: {0}")]
    Config(String),

    /// 클라이언트 생성 에러
    #[error("Client Creation Error: {0}")]
    ClientCreation(String),

    /// 시간 초과
    #[error("Connection Timeout: {0}")]
    Timeout(String),

    /// 연결 에러
    #[error("Connection Error: {0}")]
    Connection(String),

    /// 오래된 연결
    #[error("Stale connection: {0}")]
    Stale(String),

    /// 입력 검증 실패
    #[error("{0}")]
    Validation(String),

    /// 데이터베이스 에러
    #[error("Database Error: {0}")]
    Database(String),

    /// 예상하지 못한 에러
    #[error("Unexpected Error: {0}")]
    Unexpected(String),
}

/// 관리 작업을 위한 Result 타입.
pub type AdminResult<T> = Result<T, AdminError>;

impl AdminError {
    /// 에러 분류를 반환합니다.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Config,
            Self::ClientCreation(_) => ErrorCategory::ClientCreation,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Connection(_) => ErrorCategory::Connection,
            Self::Stale(_) => ErrorCategory::Stale,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Database(_) => ErrorCategory::Database,
            Self::Unexpected(_) => ErrorCategory::Unexpected,
        }
    }

    /// 해결 방법 안내.
    pub fn remediation(&self) -> Option<&'static str> {
        self.category().remediation()
    }

    /// 사용자용 메시지 (에러 + 해결 방법).
    pub fn user_message(&self) -> String {
        match self.remediation() {
            Some(hint) => format!("{} ({})", self, hint),
            None => self.to_string(),
        }
    }

    /// 재시도 가능한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Connection(_) | Self::Stale(_)
        )
    }
}

impl From<serde_json::Error> for AdminError {
    fn from(err: serde_json::Error) -> Self {
        AdminError::Unexpected(format!("serialization: {}", err))
    }
}

impl From<config::ConfigError> for AdminError {
    fn from(err: config::ConfigError) -> Self {
        AdminError::Config(err.to_string())
    }
}
