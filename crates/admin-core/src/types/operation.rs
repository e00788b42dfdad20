//! 작업 결과 envelope.
//!
//! 코디네이터의 모든 작업은 [`OperationResult`]를 반환하며, 이것이 UI/CLI와의
//! 유일한 계약입니다. JSON 형식:
//!
//! ```json
//! {"status": "success", "message": "All systems ready", "details": {...}}
//! ```

use crate::error::AdminError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 작업 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    Error,
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// 작업 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub status: OperationStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

impl OperationResult {
    /// 성공 결과를 생성합니다.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Success,
            message: message.into(),
            details: None,
        }
    }

    /// 실패 결과를 생성합니다.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Error,
            message: message.into(),
            details: None,
        }
    }

    /// 분류된 에러로부터 실패 결과를 생성합니다.
    ///
    /// 메시지에는 해결 방법 안내가 포함되고, `details`에 `category`가 기록됩니다.
    pub fn from_error(err: &AdminError) -> Self {
        let mut result = Self::error(err.user_message())
            .with_detail("category", Value::String(err.category().to_string()));
        if let Some(hint) = err.remediation() {
            result = result.with_detail("remediation", Value::String(hint.to_string()));
        }
        result
    }

    /// 상세 항목을 추가합니다.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// 상세 항목 전체를 설정합니다.
    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = Some(details);
        self
    }

    /// 성공 여부.
    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }

    /// 상세 항목 조회.
    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.as_ref()?.get(key)
    }

    /// 에러 분류 (`from_error`로 생성된 경우).
    pub fn category(&self) -> Option<&str> {
        self.detail("category")?.as_str()
    }
}

impl From<AdminError> for OperationResult {
    fn from(err: AdminError) -> Self {
        Self::from_error(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_preserves_fields() {
        let original = OperationResult::success("All systems ready")
            .with_detail("database", json!({"success": true, "message": "ok"}))
            .with_detail("api", json!({"success": true, "message": "Connection Healthy"}));

        let text = serde_json::to_string(&original).unwrap();
        let decoded: OperationResult = serde_json::from_str(&text).unwrap();

        assert_eq!(decoded, original);
        assert_eq!(decoded.status, OperationStatus::Success);
        assert_eq!(decoded.message, "All systems ready");
        assert_eq!(decoded.details, original.details);
    }

    #[test]
    fn test_wire_format() {
        let value = serde_json::to_value(OperationResult::error("No Contracts Selected")).unwrap();
        assert_eq!(value, json!({"status": "error", "message": "No Contracts Selected"}));

        let parsed: OperationResult =
            serde_json::from_value(json!({"status": "success", "message": "done"})).unwrap();
        assert!(parsed.is_success());
        assert!(parsed.details.is_none());
    }

    #[test]
    fn test_from_error_carries_category_and_hint() {
        let err = AdminError::Timeout("Failed to connect within 30 seconds".to_string());
        let result = OperationResult::from_error(&err);

        assert!(!result.is_success());
        assert!(result.message.contains("Timeout"));
        assert!(result.message.contains("check network connectivity"));
        assert_eq!(result.category(), Some("timeout"));
    }
}
