//! 批量编排工具模块
//!
//! 常量、运行配置、批量控制器和报告格式化。

pub mod config;
pub mod constants;
pub mod controller;
pub mod formatter;

pub use config::HostConfig;
pub use controller::{BatchController, BatchProgressFn, BatchReport, BatchTask, PerFileResult};
