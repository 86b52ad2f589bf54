//! MacinMeter DR Host - 播放宿主DR分析编排库
//!
//! 在宿主解码子系统与外部DR计算引擎之间架设的编排层：
//! 流式批处理喂数、异步会话生命周期管理和批量结果聚合。
//!
//! # 核心功能
//!
//! - **流式批处理**: 任意粒度的解码chunk累积成大批后跨引擎边界，降低调用开销
//! - **会话监督**: 自适应超时 + 协作式取消 + 完成回调恰好一次交付
//! - **批量编排**: 串行多文件处理，单文件失败（含panic）完全隔离
//! - **资源安全**: 会话状态机保证引擎资源在一切路径下恰好释放一次
//!
//! # 快速上手
//!
//! ```no_run
//! use std::sync::Arc;
//! use macinmeter_dr_host::engine::{CallbackRegistry, MockEngine};
//! use macinmeter_dr_host::pipeline::{CancelToken, SessionSupervisor};
//! use macinmeter_dr_host::source::{MemorySource, StreamInfo};
//! use macinmeter_dr_host::tools::HostConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(CallbackRegistry::new());
//! let engine = Arc::new(MockEngine::new(Arc::clone(&registry)));
//! let supervisor =
//!     SessionSupervisor::new(engine, registry, HostConfig::default())?;
//!
//! let info = StreamInfo::new(2, 44100, 16, 180.0);
//! let mut source = MemorySource::new(vec![0.0; 44100 * 2], info).with_name("track.flac");
//! let report = supervisor.analyze(&mut source, &CancelToken::new(), None)?;
//! println!("{}", report.text);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod source;
pub mod tools;

// 常用类型的顶层re-export
pub use engine::{DrEngine, DrSummary, SessionReport};
pub use error::{HostError, HostResult};
pub use pipeline::{CancelToken, SessionSupervisor};
pub use source::{DecodeSource, MemorySource, StreamInfo};
pub use tools::{BatchController, BatchReport, HostConfig};
