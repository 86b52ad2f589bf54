//! 会话管线模块
//!
//! 单文件分析的完整生命周期：取消令牌、批处理缓冲、
//! 会话状态机和端到端监督器。

pub mod buffer;
pub mod cancel;
pub mod session;
pub mod supervisor;

pub use buffer::BatchBuffer;
pub use cancel::CancelToken;
pub use session::{AnalysisSession, SessionState};
pub use supervisor::{ProgressSnapshot, SessionSupervisor};
