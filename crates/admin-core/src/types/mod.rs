//! 관리 도구 공통 타입.

pub mod bar;
pub mod connection;
pub mod contract;
pub mod operation;
pub mod progress;
pub mod status;

pub use bar::*;
pub use connection::*;
pub use contract::*;
pub use operation::*;
pub use progress::*;
pub use status::*;
