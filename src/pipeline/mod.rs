//! 入库、检索和统计三条流水线
//!
//! 每次调用都是独立的工作单元，之间没有加锁或协调

mod ingest;
mod search;
mod stats;

pub use ingest::*;
pub use search::*;
pub use stats::*;
