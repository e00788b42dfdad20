//! 다운로드 진행 상황.

use super::bar::BarKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 진행 콜백: `(메시지, 진행률 0~100)`.
pub type ProgressCallback = Arc<dyn Fn(&str, f64) + Send + Sync>;

/// 선택적 진행 콜백 래퍼.
///
/// 콜백 호출 형식을 한 곳에서 정규화합니다. 진행률은 항상 [0, 100]으로 제한됩니다.
#[derive(Clone, Default)]
pub struct ProgressSink {
    callback: Option<ProgressCallback>,
}

impl ProgressSink {
    /// 콜백을 감쌉니다.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str, f64) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    /// 아무것도 하지 않는 sink.
    pub fn noop() -> Self {
        Self::default()
    }

    /// 진행 상황을 보고합니다.
    pub fn report(&self, message: &str, percent: f64) {
        if let Some(callback) = &self.callback {
            let percent = if percent.is_finite() {
                percent.clamp(0.0, 100.0)
            } else {
                0.0
            };
            callback(message, percent);
        }
    }

    /// 콜백 설정 여부.
    pub fn is_active(&self) -> bool {
        self.callback.is_some()
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("active", &self.is_active())
            .finish()
    }
}

impl From<ProgressCallback> for ProgressSink {
    fn from(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
        }
    }
}

/// 진행 중인 과거 데이터 다운로드 하나.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub contract_id: String,
    pub data_kind: BarKind,
    pub total_chunks: u32,
    pub completed_chunks: u32,
    pub current_chunk_description: String,
    pub total_records: u64,
    pub start_time: DateTime<Utc>,
}

impl DownloadProgress {
    /// 새 다운로드 진행 상황을 생성합니다.
    pub fn new(contract_id: impl Into<String>, data_kind: BarKind, total_chunks: u32) -> Self {
        Self {
            contract_id: contract_id.into(),
            data_kind,
            total_chunks,
            completed_chunks: 0,
            current_chunk_description: String::new(),
            total_records: 0,
            start_time: Utc::now(),
        }
    }

    /// 진행률 (%). 청크가 없으면 0.
    pub fn progress_percent(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        100.0 * f64::from(self.completed_chunks) / f64::from(self.total_chunks)
    }

    /// 현재 처리 중인 청크를 설정합니다.
    pub fn begin_chunk(&mut self, description: impl Into<String>) {
        self.current_chunk_description = description.into();
    }

    /// 청크 하나를 완료 처리합니다. 완료 수는 전체 청크 수를 넘지 않습니다.
    pub fn complete_chunk(&mut self, records: u64) {
        if self.completed_chunks < self.total_chunks {
            self.completed_chunks += 1;
        }
        self.total_records += records;
    }

    /// 모든 청크 완료 여부.
    pub fn is_complete(&self) -> bool {
        self.completed_chunks >= self.total_chunks
    }
}
