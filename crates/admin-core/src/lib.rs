//! # Admin Core
//!
//! 선물 데이터 관리 도구의 공통 기반을 제공합니다:
//! - 에러 분류와 사용자용 메시지
//! - 설정 로드 (파일 + 환경 변수)
//! - 로깅 초기화
//! - 작업 결과 envelope, 연결 상태, 다운로드 진행 상황, 시스템 상태
//! - 계약 코드와 상품 명세
//! - 데이터베이스 작업 및 정리(teardown) 인터페이스

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
