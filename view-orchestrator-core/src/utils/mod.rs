//! 工具模块

pub mod duration_ms;
pub mod url;
