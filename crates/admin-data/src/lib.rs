//! 시계열 데이터 저장.
//!
//! 이 crate는 다음을 제공합니다:
//! - TimescaleDB 연결 풀 ([`Database`])
//! - 스키마 초기화 (바/틱 테이블, 하이퍼테이블, 인덱스)
//! - [`admin_core::DatabaseOperations`] 구현 ([`TimescaleOperations`])

pub mod error;
pub mod storage;

pub use error::{DataError, Result};
pub use storage::market_data::{TimescaleOperations, DEFAULT_INSERT_BATCH_SIZE};
pub use storage::schema::{BAR_TABLES, MANAGED_TABLES};
pub use storage::timescale::Database;
