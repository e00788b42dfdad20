//! 프로세스 전체 시스템 상태.

use super::connection::ConnectionPhase;
use super::operation::OperationResult;
use super::progress::DownloadProgress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// 상태 로그 최대 보관 수.
pub const MAX_STATUS_LOG_ENTRIES: usize = 100;

/// 상태 로그 레벨.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warn,
    Error,
}

/// 상태 로그 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: StatusLevel,
    pub message: String,
}

/// 외부 의존성 하나의 연결 플래그.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub phase: ConnectionPhase,
    pub is_connected: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

impl DependencyStatus {
    /// 상태를 갱신합니다.
    pub fn update(&mut self, phase: ConnectionPhase, message: impl Into<String>) {
        self.phase = phase;
        self.is_connected = phase == ConnectionPhase::Connected;
        self.last_checked = Some(Utc::now());
        self.message = Some(message.into());
    }
}

/// 시스템 상태 집계.
///
/// 프로세스 시작 시 한 번 생성되어 프로세스가 끝날 때까지 유지되며, 저장되지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    /// 시장 데이터 게이트웨이
    pub gateway: DependencyStatus,
    /// 데이터베이스
    pub database: DependencyStatus,
    /// 진행 중인 다운로드
    pub active_downloads: Vec<DownloadProgress>,
    /// 세션 시작 시각
    pub session_start: DateTime<Utc>,
    /// 실행한 작업 수
    pub operations_run: u64,
    /// 마지막 실패 메시지
    pub last_error: Option<String>,
    log: VecDeque<StatusLogEntry>,
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemStatus {
    pub fn new() -> Self {
        Self {
            gateway: DependencyStatus::default(),
            database: DependencyStatus::default(),
            active_downloads: Vec::new(),
            session_start: Utc::now(),
            operations_run: 0,
            last_error: None,
            log: VecDeque::with_capacity(MAX_STATUS_LOG_ENTRIES),
        }
    }

    /// 로그 메시지를 맨 앞에 추가합니다.
    pub fn push_log(&mut self, level: StatusLevel, message: impl Into<String>) {
        self.log.push_front(StatusLogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        });
        self.log.truncate(MAX_STATUS_LOG_ENTRIES);
    }

    /// 최신순 로그.
    pub fn logs(&self) -> impl Iterator<Item = &StatusLogEntry> {
        self.log.iter()
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    /// 작업 결과를 기록합니다.
    pub fn record_result(&mut self, operation: &str, result: &OperationResult) {
        self.operations_run += 1;
        if result.is_success() {
            self.push_log(StatusLevel::Info, format!("{}: {}", operation, result.message));
        } else {
            self.last_error = Some(result.message.clone());
            self.push_log(StatusLevel::Error, format!("{}: {}", operation, result.message));
        }
    }

    /// 전체 연결 요약.
    pub fn connection_summary(&self) -> &'static str {
        match (self.gateway.is_connected, self.database.is_connected) {
            (true, true) => "All Connected",
            (true, false) => "Gateway Only",
            (false, true) => "Database Only",
            (false, false) => "Disconnected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_ring_buffer_is_bounded_and_newest_first() {
        let mut status = SystemStatus::new();
        for i in 0..150 {
            status.push_log(StatusLevel::Info, format!("message {}", i));
        }

        assert_eq!(status.log_len(), MAX_STATUS_LOG_ENTRIES);
        let first = status.logs().next().unwrap();
        assert_eq!(first.message, "message 149");
        let last = status.logs().last().unwrap();
        assert_eq!(last.message, "message 50");
    }

    #[test]
    fn test_connection_summary() {
        let mut status = SystemStatus::new();
        assert_eq!(status.connection_summary(), "Disconnected");

        status.database.update(ConnectionPhase::Connected, "ok");
        assert_eq!(status.connection_summary(), "Database Only");

        status.gateway.update(ConnectionPhase::Connected, "ok");
        assert_eq!(status.connection_summary(), "All Connected");

        status.database.update(ConnectionPhase::Disconnected, "down");
        assert_eq!(status.connection_summary(), "Gateway Only");
    }

    #[test]
    fn test_record_result_tracks_errors() {
        let mut status = SystemStatus::new();
        status.record_result("test", &OperationResult::success("All systems ready"));
        status.record_result("download", &OperationResult::error("No Contracts Selected"));

        assert_eq!(status.operations_run, 2);
        assert_eq!(status.last_error.as_deref(), Some("No Contracts Selected"));
        assert_eq!(status.logs().next().unwrap().level, StatusLevel::Error);
    }
}
