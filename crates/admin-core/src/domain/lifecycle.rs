//! 컴포넌트 정리(teardown) 인터페이스.

use crate::error::AdminResult;
use async_trait::async_trait;

/// 정리 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// 자원을 해제함
    Released,
    /// 해제할 자원이 없음
    NothingToRelease,
}

/// 종료 시 자원을 해제하는 컴포넌트.
///
/// 모든 관리자가 구현합니다. 해제할 자원이 없는 관리자는
/// [`CleanupOutcome::NothingToRelease`]를 반환합니다.
#[async_trait]
pub trait Cleanable: Send + Sync {
    /// 로그에 표시할 컴포넌트 이름.
    fn component_name(&self) -> &'static str;

    /// 자원을 해제합니다.
    async fn cleanup(&self) -> AdminResult<CleanupOutcome>;
}
