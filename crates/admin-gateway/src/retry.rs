//! 재연결 백오프 정책.
//!
//! 헬스 모니터가 시작한 재연결과 작업 전 요청된 재연결이 같은 정책과
//! 같은 연속 실패 카운터를 공유합니다.

use admin_core::ReconnectConfig;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// 지수 백오프 상한 계산에 사용하는 최대 지수.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// 상한이 있는 지수 백오프 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// 첫 재시도 전 대기
    pub base_delay: Duration,
    /// 최대 대기
    pub max_delay: Duration,
    /// 자동 재연결을 중단하는 연속 실패 횟수
    pub max_consecutive_failures: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

impl ReconnectPolicy {
    /// 설정으로부터 생성합니다.
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.base_delay_ms)),
            max_consecutive_failures: config.max_consecutive_failures.max(1),
        }
    }

    /// 연속 `failures`회 실패 후 다음 시도 전 대기 시간.
    ///
    /// `min(base * 2^(failures-1), max)`, 실패가 없으면 0.
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = (failures - 1).min(MAX_BACKOFF_EXPONENT);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }

    /// 자동 재연결을 더 시도해도 되는지 확인.
    pub fn allows(&self, failures: u32) -> bool {
        failures < self.max_consecutive_failures
    }
}

/// 연속 실패 카운터.
#[derive(Debug, Default)]
pub struct FailureCounter(AtomicU32);

impl FailureCounter {
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    /// 실패를 기록하고 누적 횟수를 반환합니다.
    pub fn record_failure(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    /// 카운터를 최소 `limit`까지 올려 자동 재연결을 막습니다.
    pub fn exhaust(&self, limit: u32) -> u32 {
        self.0.fetch_max(limit, Ordering::SeqCst).max(limit)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_consecutive_failures: 5,
        }
    }

    #[test]
    fn test_delay_sequence() {
        let p = policy();
        assert_eq!(p.delay_after(0), Duration::ZERO);
        assert_eq!(p.delay_after(1), Duration::from_secs(1));
        assert_eq!(p.delay_after(2), Duration::from_secs(2));
        assert_eq!(p.delay_after(3), Duration::from_secs(4));
        assert_eq!(p.delay_after(6), Duration::from_secs(30));
        assert_eq!(p.delay_after(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_budget() {
        let p = policy();
        assert!(p.allows(4));
        assert!(!p.allows(5));
    }

    #[test]
    fn test_failure_counter() {
        let counter = FailureCounter::default();
        assert_eq!(counter.record_failure(), 1);
        assert_eq!(counter.record_failure(), 2);
        counter.reset();
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_exhaust_blocks_budget() {
        let p = policy();
        let counter = FailureCounter::default();
        counter.record_failure();
        assert_eq!(counter.exhaust(p.max_consecutive_failures), 5);
        assert!(!p.allows(counter.get()));

        // 이미 한도보다 크면 유지
        for _ in 0..4 {
            counter.record_failure();
        }
        assert_eq!(counter.exhaust(5), 9);
    }

    #[test]
    fn test_from_config_keeps_max_above_base() {
        let p = ReconnectPolicy::from_config(&ReconnectConfig {
            base_delay_ms: 5_000,
            max_delay_ms: 100,
            max_consecutive_failures: 0,
        });
        assert_eq!(p.max_delay, Duration::from_secs(5));
        assert_eq!(p.max_consecutive_failures, 1);
    }

    proptest! {
        #[test]
        fn prop_delay_is_capped_and_monotonic(failures in 0u32..64) {
            let p = policy();
            let current = p.delay_after(failures);
            let next = p.delay_after(failures + 1);
            prop_assert!(current <= p.max_delay);
            prop_assert!(next >= current);
        }
    }
}
