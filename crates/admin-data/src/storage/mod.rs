//! 저장소 구현.

pub mod market_data;
pub mod schema;
pub mod timescale;
