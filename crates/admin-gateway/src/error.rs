//! 게이트웨이 에러 타입.

use admin_core::AdminError;
use thiserror::Error;

/// 게이트웨이 작업을 위한 Result 타입.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// 게이트웨이 관련 에러.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    /// 연결되지 않음
    #[error("Not Connected: {0}")]
    NotConnected(String),

    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    Network(String),

    /// 인증 실패
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 시간 초과
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 클라이언트 생성 실패
    #[error("Client creation failed: {0}")]
    ClientCreation(String),

    /// 잘못된 요청
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// API 에러 코드
    #[error("API error {code}: {message}")]
    Api { code: i32, message: String },

    /// 응답 파싱 에러
    #[error("Parse error: {0}")]
    Parse(String),

    /// 내부 에러
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<GatewayError> for AdminError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Timeout(msg) => AdminError::Timeout(msg),
            GatewayError::ClientCreation(msg) => AdminError::ClientCreation(msg),
            GatewayError::InvalidRequest(msg) => AdminError::Validation(msg),
            GatewayError::Parse(_) | GatewayError::Internal(_) => {
                AdminError::Unexpected(err.to_string())
            }
            GatewayError::NotConnected(_)
            | GatewayError::Network(_)
            | GatewayError::Unauthorized(_)
            | GatewayError::Api { .. } => AdminError::Connection(err.to_string()),
        }
    }
}
