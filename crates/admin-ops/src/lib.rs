//! 선물 데이터 관리 작업.
//!
//! - [`OperationsCoordinator`]: 연결 테스트, 심볼 검색, 과거 데이터 다운로드,
//!   데이터베이스 조회/초기화, 상태 진단, 정리
//! - [`report`]: 작업 결과 텍스트 보고서

pub mod coordinator;
pub mod report;

pub use coordinator::OperationsCoordinator;
pub use report::{format_database_summary, format_status, format_symbol_report, SymbolCheck};
