//! 게이트웨이 연결 관리자.
//!
//! 단일 게이트웨이 세션의 수명을 관리합니다:
//! - `connect` / `disconnect`는 내부 락으로 직렬화됩니다.
//! - 연결 성공 시 헬스 모니터 태스크를 시작하며, `disconnect` 시
//!   취소 후 제한 시간 동안 종료를 기다리고, 넘기면 강제 중단합니다.
//! - 하트비트가 오래되었거나 연결 수명이 최대치를 넘으면 비정상으로 판정합니다.
//! - 모니터와 호출자의 재연결은 하나의 [`ReconnectPolicy`]와 실패 카운터를 공유합니다.

use crate::client::{ClientFactory, CredentialsProvider, GatewayClient, GatewayCredentials};
use crate::retry::{FailureCounter, ReconnectPolicy};
use admin_core::{
    AdminError, AdminResult, AppConfig, Cleanable, CleanupOutcome, ConnectionErrorRecord,
    ConnectionPhase, ConnectionState, ErrorCategory,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 상태 조회 시 포함할 최근 에러 수.
const STATUS_RECENT_ERRORS: usize = 5;

/// 연결 관리자 설정.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub stale_after: Duration,
    pub max_connection_age: Duration,
    pub monitor_join_timeout: Duration,
    pub disconnect_timeout: Duration,
    pub reconnect_disconnect_timeout: Duration,
    pub recent_error_capacity: usize,
    pub reconnect: ReconnectPolicy,
}

impl ConnectionSettings {
    /// 애플리케이션 설정에서 생성합니다.
    pub fn from_config(config: &AppConfig) -> Self {
        let health = &config.health;
        Self {
            connect_timeout: config.gateway.connect_timeout(),
            heartbeat_interval: Duration::from_secs(health.heartbeat_interval_secs.max(1)),
            stale_after: Duration::from_secs(health.stale_after_secs),
            max_connection_age: Duration::from_secs(health.max_connection_age_secs),
            monitor_join_timeout: Duration::from_secs(health.monitor_join_timeout_secs),
            disconnect_timeout: Duration::from_secs(health.disconnect_timeout_secs),
            reconnect_disconnect_timeout: Duration::from_secs(
                health.reconnect_disconnect_timeout_secs,
            ),
            recent_error_capacity: health.recent_error_capacity,
            reconnect: ReconnectPolicy::from_config(&config.reconnect),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// 헬스 체크 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: String,
    pub category: Option<ErrorCategory>,
}

impl HealthStatus {
    fn healthy(message: impl Into<String>) -> Self {
        Self {
            healthy: true,
            message: message.into(),
            category: None,
        }
    }

    fn unhealthy(message: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            healthy: false,
            message: message.into(),
            category: Some(category),
        }
    }

    /// 비정상 사유를 에러로 변환합니다.
    pub fn to_error(&self) -> AdminError {
        match self.category {
            Some(ErrorCategory::Stale) => AdminError::Stale(self.message.clone()),
            _ => AdminError::Connection(self.message.clone()),
        }
    }
}

/// 진단용 연결 상태 요약.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatusReport {
    pub phase: ConnectionPhase,
    pub is_connected: bool,
    pub attempt_count: u32,
    pub uptime_secs: Option<i64>,
    pub last_heartbeat: Option<chrono::DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub monitor_running: bool,
    pub recent_errors: Vec<ConnectionErrorRecord>,
}

/// 재연결을 요청한 쪽.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconnectOrigin {
    /// 헬스 모니터 태스크
    Monitor,
    /// 작업 전 호출자
    OnDemand,
}

struct Session {
    client: Option<Arc<dyn GatewayClient>>,
    state: ConnectionState,
    connected_at: Option<Instant>,
    last_heartbeat_at: Option<Instant>,
}

struct Monitor {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

struct Inner {
    settings: ConnectionSettings,
    credentials: Arc<dyn CredentialsProvider>,
    factory: Arc<dyn ClientFactory>,
    /// connect/disconnect 직렬화
    lifecycle: tokio::sync::Mutex<()>,
    session: RwLock<Session>,
    monitor: Mutex<Option<Monitor>>,
    failures: FailureCounter,
}

/// 게이트웨이 연결 관리자.
///
/// 복제하면 같은 세션을 공유합니다.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// 새 연결 관리자를 생성합니다. 연결은 `connect` 호출 시 이루어집니다.
    pub fn new(
        settings: ConnectionSettings,
        credentials: Arc<dyn CredentialsProvider>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        let state = ConnectionState::with_error_capacity(settings.recent_error_capacity);
        Self {
            inner: Arc::new(Inner {
                settings,
                credentials,
                factory,
                lifecycle: tokio::sync::Mutex::new(()),
                session: RwLock::new(Session {
                    client: None,
                    state,
                    connected_at: None,
                    last_heartbeat_at: None,
                }),
                monitor: Mutex::new(None),
                failures: FailureCounter::default(),
            }),
        }
    }

    /// 게이트웨이에 연결합니다. 이미 연결되어 있으면 새 세션을 만들지 않습니다.
    pub async fn connect(&self) -> AdminResult<String> {
        let _guard = self.inner.lifecycle.lock().await;
        self.inner.connect_locked(true).await
    }

    /// 기본 타임아웃으로 연결을 해제합니다.
    pub async fn disconnect(&self) {
        self.disconnect_with_timeout(self.inner.settings.disconnect_timeout)
            .await
    }

    /// 연결을 해제합니다. 실패해도 상태는 항상 Disconnected가 됩니다.
    pub async fn disconnect_with_timeout(&self, timeout: Duration) {
        let _guard = self.inner.lifecycle.lock().await;
        self.inner.stop_monitor().await;
        self.inner.disconnect_locked(timeout).await;
    }

    /// 연결 상태를 점검합니다.
    pub async fn test_connection(&self) -> HealthStatus {
        self.inner.test_connection().await
    }

    /// 연결이 비정상이면 한 번 재연결합니다.
    pub async fn reconnect_if_needed(&self) -> bool {
        self.inner.reconnect_if_needed(ReconnectOrigin::OnDemand).await
    }

    /// 작업 전에 연결을 보장합니다: 연결되어 있으면 점검 후 필요 시 재연결, 아니면 연결.
    pub async fn ensure_connected(&self) -> AdminResult<String> {
        if !self.is_connected() {
            return self.connect().await;
        }
        if self.reconnect_if_needed().await {
            return Ok("Connection Healthy".to_string());
        }
        let last = self.inner.read_session().state.recent_errors.latest().cloned();
        Err(match last {
            Some(record) => AdminError::Connection(format!("Reconnect failed: {}", record.message)),
            None => AdminError::Connection("Reconnect failed".to_string()),
        })
    }

    /// 현재 연결 여부.
    pub fn is_connected(&self) -> bool {
        let session = self.inner.read_session();
        session.state.is_connected && session.client.is_some()
    }

    /// 연결된 클라이언트 핸들.
    pub fn client(&self) -> Option<Arc<dyn GatewayClient>> {
        let session = self.inner.read_session();
        if session.state.is_connected {
            session.client.clone()
        } else {
            None
        }
    }

    /// 연결 상태 스냅샷.
    pub fn state(&self) -> ConnectionState {
        self.inner.read_session().state.clone()
    }

    /// 진단용 상태 요약.
    pub fn connection_status(&self) -> ConnectionStatusReport {
        let monitor_running = self.inner.monitor_running();
        let session = self.inner.read_session();
        ConnectionStatusReport {
            phase: session.state.phase,
            is_connected: session.state.is_connected,
            attempt_count: session.state.attempt_count,
            uptime_secs: session.state.uptime_secs(Utc::now()),
            last_heartbeat: session.state.last_heartbeat,
            consecutive_failures: self.inner.failures.get(),
            monitor_running,
            recent_errors: session.state.recent_errors.recent(STATUS_RECENT_ERRORS),
        }
    }

    /// 설정.
    pub fn settings(&self) -> &ConnectionSettings {
        &self.inner.settings
    }
}

#[async_trait]
impl Cleanable for ConnectionManager {
    fn component_name(&self) -> &'static str {
        "connection"
    }

    async fn cleanup(&self) -> AdminResult<CleanupOutcome> {
        let had_session = self.is_connected() || self.inner.monitor_running();
        self.disconnect().await;
        Ok(if had_session {
            CleanupOutcome::Released
        } else {
            CleanupOutcome::NothingToRelease
        })
    }
}

impl Inner {
    fn read_session(&self) -> RwLockReadGuard<'_, Session> {
        match self.session.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("Session RwLock poisoned (read), recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Session> {
        match self.session.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("Session RwLock poisoned (write), recovering");
                poisoned.into_inner()
            }
        }
    }

    fn monitor_slot(&self) -> MutexGuard<'_, Option<Monitor>> {
        match self.monitor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("Monitor mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn monitor_running(&self) -> bool {
        self.monitor_slot()
            .as_ref()
            .map(|m| !m.handle.is_finished())
            .unwrap_or(false)
    }

    /// lifecycle 락을 잡은 상태에서 호출합니다.
    async fn connect_locked(self: &Arc<Self>, start_monitor: bool) -> AdminResult<String> {
        let attempt = {
            let mut session = self.write_session();
            if session.state.is_connected && session.client.is_some() {
                debug!("이미 연결되어 있음");
                return Ok("Already connected".to_string());
            }
            session.state.attempt_count += 1;
            session.state.phase = ConnectionPhase::Connecting;
            session.state.attempt_count
        };

        info!(attempt, "게이트웨이 연결 시도");

        match self.establish().await {
            Ok((client, credentials)) => {
                let now = Instant::now();
                {
                    let mut session = self.write_session();
                    session.client = Some(client);
                    session.connected_at = Some(now);
                    session.last_heartbeat_at = Some(now);
                    session.state.phase = ConnectionPhase::Connected;
                    session.state.is_connected = true;
                    session.state.connection_start_time = Some(Utc::now());
                    session.state.last_heartbeat = Some(Utc::now());
                }
                self.failures.reset();
                if start_monitor {
                    self.spawn_monitor();
                }

                info!(
                    system = %credentials.system_name,
                    gateway = %credentials.gateway,
                    "게이트웨이 연결 성공"
                );
                Ok(format!(
                    "Connected to {} via {} gateway",
                    credentials.system_name, credentials.gateway
                ))
            }
            Err(err) => {
                {
                    let mut session = self.write_session();
                    session.state.record_error(&err);
                    session.state.reset();
                    session.client = None;
                    session.connected_at = None;
                    session.last_heartbeat_at = None;
                }
                error!(category = %err.category(), attempt, "게이트웨이 연결 실패: {}", err);
                Err(err)
            }
        }
    }

    /// 자격증명 로드 → 클라이언트 생성 → 제한 시간 내 연결.
    async fn establish(&self) -> AdminResult<(Arc<dyn GatewayClient>, GatewayCredentials)> {
        let credentials = self.credentials.load().map_err(|e| match e {
            AdminError::Config(_) => e,
            other => AdminError::Config(other.to_string()),
        })?;

        let client = self
            .factory
            .create(&credentials)
            .map_err(|e| AdminError::ClientCreation(e.to_string()))?;

        let timeout = self.settings.connect_timeout;
        match tokio::time::timeout(timeout, client.connect()).await {
            Err(_) => {
                return Err(AdminError::Timeout(format!(
                    "Failed to connect within {} seconds",
                    timeout.as_secs()
                )))
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(())) => {}
        }

        if !client.is_connected().await {
            return Err(AdminError::Connection(
                "client reported disconnected after connect".to_string(),
            ));
        }

        Ok((client, credentials))
    }

    /// lifecycle 락을 잡은 상태에서 호출합니다. 모니터는 건드리지 않습니다.
    async fn disconnect_locked(&self, timeout: Duration) {
        let client = self.write_session().client.take();

        if let Some(client) = client {
            match tokio::time::timeout(timeout, client.disconnect()).await {
                Ok(Ok(())) => info!("게이트웨이 연결 해제"),
                Ok(Err(e)) => warn!("연결 해제 중 에러, 강제 해제: {}", e),
                Err(_) => warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    "연결 해제 시간 초과, 강제 해제"
                ),
            }
        }

        let mut session = self.write_session();
        session.state.reset();
        session.connected_at = None;
        session.last_heartbeat_at = None;
    }

    async fn test_connection(&self) -> HealthStatus {
        let (client, connected_at, heartbeat_at) = {
            let session = self.read_session();
            match (&session.client, session.state.is_connected) {
                (Some(client), true) => (
                    client.clone(),
                    session.connected_at,
                    session.last_heartbeat_at,
                ),
                _ => return HealthStatus::unhealthy("Not Connected", ErrorCategory::Connection),
            }
        };

        if !client.is_connected().await {
            return HealthStatus::unhealthy(
                "Client reports disconnected",
                ErrorCategory::Connection,
            );
        }

        let now = Instant::now();

        if let Some(heartbeat_at) = heartbeat_at {
            let age = now.saturating_duration_since(heartbeat_at);
            if age > self.settings.stale_after {
                return HealthStatus::unhealthy(
                    format!("Stale connection: Last heartbeat {}s ago", age.as_secs()),
                    ErrorCategory::Stale,
                );
            }
        }

        let uptime = connected_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default();
        if uptime > self.settings.max_connection_age {
            return HealthStatus::unhealthy(
                format!(
                    "Connection aged {}s (max {}s), rotation required",
                    uptime.as_secs(),
                    self.settings.max_connection_age.as_secs()
                ),
                ErrorCategory::Stale,
            );
        }

        HealthStatus::healthy(format!("Connection Healthy (uptime: {})", format_uptime(uptime)))
    }

    async fn reconnect_if_needed(self: &Arc<Self>, origin: ReconnectOrigin) -> bool {
        let health = self.test_connection().await;
        if health.healthy {
            return true;
        }

        let failures = self.failures.get();
        if !self.settings.reconnect.allows(failures) {
            warn!(failures, "자동 재연결 한도 초과, 명시적 connect 필요");
            return false;
        }

        let _guard = self.lifecycle.lock().await;

        // 락을 기다리는 동안 다른 쪽이 재연결했을 수 있음
        let health = self.test_connection().await;
        if health.healthy {
            return true;
        }

        warn!(?origin, reason = %health.message, "연결 비정상, 재연결 시도");
        {
            let mut session = self.write_session();
            session.state.record_error(&health.to_error());
            if session.state.is_connected {
                session.state.phase = ConnectionPhase::Degraded;
            }
        }

        let delay = self.settings.reconnect.delay_after(failures);
        if !delay.is_zero() {
            info!(delay_ms = delay.as_millis() as u64, failures, "재연결 대기");
            tokio::time::sleep(delay).await;
        }

        if origin == ReconnectOrigin::OnDemand {
            self.stop_monitor().await;
        }
        self.disconnect_locked(self.settings.reconnect_disconnect_timeout)
            .await;

        // 모니터가 시작한 재연결은 기존 모니터 태스크가 계속 감시합니다.
        match self
            .connect_locked(origin == ReconnectOrigin::OnDemand)
            .await
        {
            Ok(_) => {
                info!(?origin, "재연결 성공");
                true
            }
            Err(e) if e.is_retryable() => {
                let failures = self.failures.record_failure();
                error!(?origin, failures, "재연결 실패: {}", e);
                false
            }
            Err(e) => {
                // 설정/클라이언트 생성 실패는 재시도해도 같은 결과
                let failures = self
                    .failures
                    .exhaust(self.settings.reconnect.max_consecutive_failures);
                error!(
                    ?origin,
                    failures,
                    category = %e.category(),
                    "재시도 불가능한 재연결 실패, 자동 재연결 중단: {}",
                    e
                );
                false
            }
        }
    }

    fn touch_heartbeat(&self) {
        let mut session = self.write_session();
        if session.state.is_connected {
            session.last_heartbeat_at = Some(Instant::now());
            session.state.last_heartbeat = Some(Utc::now());
        }
    }

    fn spawn_monitor(self: &Arc<Self>) {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_monitor(
            Arc::downgrade(self),
            cancel.clone(),
            self.settings.heartbeat_interval,
        ));

        let previous = self.monitor_slot().replace(Monitor { handle, cancel });
        if let Some(previous) = previous {
            // 모니터가 실행 중인 상태로 새 모니터가 시작되는 경우는 없어야 함
            previous.cancel.cancel();
            previous.handle.abort();
        }
        debug!("헬스 모니터 시작");
    }

    /// 모니터를 취소하고 종료를 기다립니다. 제한 시간을 넘기면 강제 중단합니다.
    async fn stop_monitor(&self) {
        let monitor = self.monitor_slot().take();
        let Some(Monitor { mut handle, cancel }) = monitor else {
            return;
        };

        cancel.cancel();
        match tokio::time::timeout(self.settings.monitor_join_timeout, &mut handle).await {
            Ok(_) => debug!("헬스 모니터 종료"),
            Err(_) => {
                warn!("헬스 모니터가 제한 시간 내 종료되지 않아 강제 중단");
                handle.abort();
                let _ = handle.await;
            }
        }
    }

    /// 모니터 한 주기. 계속 감시해야 하면 true.
    async fn monitor_tick(self: &Arc<Self>) -> bool {
        let client = self.read_session().client.clone();
        let Some(client) = client else {
            return false;
        };

        if client.is_connected().await {
            self.touch_heartbeat();
        }

        let health = self.test_connection().await;
        if health.healthy {
            debug!(status = %health.message, "헬스 체크 통과");
            return true;
        }

        warn!(reason = %health.message, "헬스 체크 실패");
        self.reconnect_if_needed(ReconnectOrigin::Monitor).await
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let monitor = match self.monitor.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(monitor) = monitor {
            monitor.cancel.cancel();
            monitor.handle.abort();
        }
    }
}

/// 헬스 모니터 루프.
///
/// 관리자를 약한 참조로 잡아 관리자가 drop되면 다음 주기에 종료합니다.
async fn run_monitor(inner: Weak<Inner>, cancel: CancellationToken, interval: Duration) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };

        let keep_running = tokio::select! {
            _ = cancel.cancelled() => false,
            alive = inner.monitor_tick() => alive,
        };

        if !keep_running {
            break;
        }
    }
    debug!("헬스 모니터 루프 종료");
}

fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(3723)), "1h 2m 3s");
        assert_eq!(format_uptime(Duration::ZERO), "0h 0m 0s");
    }

    #[test]
    fn test_settings_from_config() {
        let settings = ConnectionSettings::default();
        assert_eq!(settings.connect_timeout, Duration::from_secs(30));
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(settings.stale_after, Duration::from_secs(60));
        assert_eq!(settings.max_connection_age, Duration::from_secs(3600));
        assert_eq!(settings.monitor_join_timeout, Duration::from_secs(2));
        assert_eq!(settings.disconnect_timeout, Duration::from_secs(5));
        assert_eq!(settings.reconnect_disconnect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_health_status_error_mapping() {
        let stale = HealthStatus::unhealthy("Stale connection", ErrorCategory::Stale);
        assert_eq!(stale.to_error().category(), ErrorCategory::Stale);

        let down = HealthStatus::unhealthy("Not Connected", ErrorCategory::Connection);
        assert_eq!(down.to_error().category(), ErrorCategory::Connection);
    }
}
