//! 시장 데이터 게이트웨이 연결 및 데이터 조회.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - GatewayClient trait: 외부 게이트웨이 SDK 경계
//! - 연결 관리자: 헬스 모니터, 하트비트, 통합 재연결 백오프
//! - 심볼 관리자: 와일드카드 검색, 캐시, 계약 선택
//! - 과거 데이터 관리자: 청크 다운로드, 바 정규화, 저장
//! - 시뮬레이션 게이트웨이 (로컬 실행 및 테스트용)

pub mod client;
pub mod connection;
pub mod error;
pub mod historical;
pub mod market_hours;
pub mod retry;
pub mod simulated;
pub mod symbols;

pub use client::{
    BarRequest, ClientFactory, ConfigCredentials, CredentialsProvider, GatewayClient,
    GatewayCredentials, RawBar, RawInstrument, StaticCredentials,
};
pub use connection::{ConnectionManager, ConnectionSettings, ConnectionStatusReport, HealthStatus};
pub use error::*;
pub use historical::{
    format_download_summary, plan_chunks, process_bars, ContractDownload, DownloadStats,
    DownloadSummary, HistoricalManager, HistoricalSettings,
};
pub use market_hours::{is_market_open, is_market_open_during, is_regular_hours};
pub use retry::{FailureCounter, ReconnectPolicy};
pub use simulated::{SimulatedBehavior, SimulatedClientFactory, SimulatedGateway};
pub use symbols::{ContractValidation, SymbolManager, SymbolSettings};
