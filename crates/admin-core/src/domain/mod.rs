//! 관리자 간 경계 인터페이스.

pub mod lifecycle;
pub mod storage;

pub use lifecycle::*;
pub use storage::*;
