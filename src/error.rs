//! 统一错误处理框架
//!
//! 宿主编排层的错误类型定义：每类错误对应会话管线中的一个失败阶段，
//! 批量处理据此做错误分类统计。

use std::fmt;

/// 宿主编排层的统一错误类型
#[derive(Debug)]
pub enum HostError {
    /// 音频格式无效（声道数超出1-2范围、采样率为0等）- 在接触引擎前拒绝
    InvalidFormat(String),

    /// 引擎会话创建失败（session_create返回的非正任务ID）
    EngineInit(i32),

    /// 引擎中途拒绝数据（session_feed返回的非零状态码）
    Feed(i32),

    /// 引擎收尾失败（session_finalize返回的非零状态码）
    Finalize(i32),

    /// 等待引擎完成超时（自适应超时上限，秒）
    Timeout { limit_secs: u64 },

    /// 用户主动取消分析
    Cancelled,

    /// 解码适配器报告的解码失败
    Decode(String),

    /// 配置参数无效（批缓冲容量为0等）- 构造期错误
    InvalidConfig(String),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::InvalidFormat(msg) => write!(f, "音频格式无效: {msg}"),
            HostError::EngineInit(code) => {
                write!(f, "DR分析引擎初始化失败: 错误码 {code}")
            }
            HostError::Feed(code) => write!(f, "引擎拒绝音频数据: 状态码 {code}"),
            HostError::Finalize(code) => write!(f, "完成DR分析失败: 状态码 {code}"),
            HostError::Timeout { limit_secs } => {
                write!(f, "分析超时（{limit_secs}秒）")
            }
            HostError::Cancelled => write!(f, "用户取消了分析"),
            HostError::Decode(msg) => write!(f, "音频解码失败: {msg}"),
            HostError::InvalidConfig(msg) => write!(f, "配置无效: {msg}"),
        }
    }
}

impl std::error::Error for HostError {}

/// 宿主编排操作的标准Result类型
pub type HostResult<T> = Result<T, HostError>;

// ==================== 错误转换Helper函数 ====================
// 消除重复的 HostError::XXX(format!(...)) 模式

/// 创建格式错误的helper函数
#[inline]
pub fn invalid_format<E: fmt::Display>(context: &str, detail: E) -> HostError {
    HostError::InvalidFormat(format!("{context}: {detail}"))
}

/// 创建解码错误的helper函数
#[inline]
pub fn decode_error<E: fmt::Display>(context: &str, detail: E) -> HostError {
    HostError::Decode(format!("{context}: {detail}"))
}

/// 创建配置错误的helper函数
#[inline]
pub fn config_error<E: fmt::Display>(context: &str, detail: E) -> HostError {
    HostError::InvalidConfig(format!("{context}: {detail}"))
}

// ==================== 错误分类系统 ====================
// 用于批量处理中的错误统计和分析

/// 错误类别枚举（用于批量处理统计）
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum ErrorCategory {
    /// 格式相关错误（声道数超限、采样率无效等）
    Format,
    /// 引擎相关错误（初始化、feed、finalize失败）
    Engine,
    /// 解码相关错误（适配器解码失败、无有效数据）
    Decoding,
    /// 超时错误
    Timeout,
    /// 用户取消
    Cancelled,
    /// 其他未分类错误
    Other,
}

impl ErrorCategory {
    /// 从HostError提取错误类别
    pub fn from_host_error(e: &HostError) -> Self {
        match e {
            HostError::InvalidFormat(_) => Self::Format,
            HostError::EngineInit(_) | HostError::Feed(_) | HostError::Finalize(_) => Self::Engine,
            HostError::Decode(_) => Self::Decoding,
            HostError::Timeout { .. } => Self::Timeout,
            HostError::Cancelled => Self::Cancelled,
            HostError::InvalidConfig(_) => Self::Other,
        }
    }

    /// 获取错误类别的显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Format => "格式错误",
            Self::Engine => "引擎错误",
            Self::Decoding => "解码错误",
            Self::Timeout => "超时",
            Self::Cancelled => "用户取消",
            Self::Other => "其他错误",
        }
    }
}
