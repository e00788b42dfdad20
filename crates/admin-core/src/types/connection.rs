//! 외부 의존성 연결 상태.

use crate::error::{AdminError, ErrorCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// 연결 단계.
///
/// ```text
/// Disconnected -(connect 성공)-> Connected -(헬스 체크 실패)-> Degraded
/// Degraded -(재연결 성공)-> Connected
/// Degraded -(재연결 실패)-> Disconnected
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Degraded,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

/// 연결 에러 기록.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub category: ErrorCategory,
}

impl ConnectionErrorRecord {
    /// 현재 시각으로 에러 기록을 생성합니다.
    pub fn now(err: &AdminError) -> Self {
        Self {
            timestamp: Utc::now(),
            message: err.to_string(),
            category: err.category(),
        }
    }
}

/// 최신순으로 정렬된, 크기가 제한된 에러 목록.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLog {
    capacity: usize,
    entries: VecDeque<ConnectionErrorRecord>,
}

impl ErrorLog {
    /// 최대 `capacity`개를 보관하는 목록을 생성합니다 (최소 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// 에러를 맨 앞에 추가합니다. 용량을 넘으면 가장 오래된 항목을 버립니다.
    pub fn push(&mut self, record: ConnectionErrorRecord) {
        self.entries.push_front(record);
        self.entries.truncate(self.capacity);
    }

    /// 최신순 반복자.
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionErrorRecord> {
        self.entries.iter()
    }

    /// 가장 최근 `n`개.
    pub fn recent(&self, n: usize) -> Vec<ConnectionErrorRecord> {
        self.entries.iter().take(n).cloned().collect()
    }

    /// 가장 최근 에러.
    pub fn latest(&self) -> Option<&ConnectionErrorRecord> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(20)
    }
}

/// 단일 외부 연결의 상태.
///
/// 연결 관리자만 이 값을 변경하며, 외부에는 스냅샷으로만 노출됩니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    pub is_connected: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub connection_start_time: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    pub recent_errors: ErrorLog,
}

impl ConnectionState {
    /// 에러 보관 용량을 지정해 생성합니다.
    pub fn with_error_capacity(capacity: usize) -> Self {
        Self {
            recent_errors: ErrorLog::new(capacity),
            ..Default::default()
        }
    }

    /// 에러를 기록합니다.
    pub fn record_error(&mut self, err: &AdminError) {
        self.recent_errors.push(ConnectionErrorRecord::now(err));
    }

    /// 연결 해제 상태로 초기화합니다. 시도 횟수와 에러 기록은 유지됩니다.
    pub fn reset(&mut self) {
        self.phase = ConnectionPhase::Disconnected;
        self.is_connected = false;
        self.last_heartbeat = None;
        self.connection_start_time = None;
    }

    /// 연결 유지 시간 (초).
    pub fn uptime_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.connection_start_time
            .map(|start| (now - start).num_seconds().max(0))
    }
}
