//! 编排层常量定义
//!
//! 集中管理批处理、监督等待和显示相关的调优常量，
//! 每个常量附带取值依据，避免魔法数字散落各处。

/// 批处理相关常量
pub mod batching {
    /// 批缓冲容量（交错f32样本数）
    ///
    /// 取值依据：256KB数据块 / 4字节每样本 = 65536样本。
    /// 该粒度下跨引擎边界的调用频率比逐chunk推送低一个数量级以上，
    /// 而单批内存占用仍然可以忽略。
    pub const BATCH_CAPACITY_SAMPLES: usize = 256 * 1024 / size_of::<f32>();
}

/// 监督等待相关常量
pub mod supervision {
    /// 等待循环轮询间隔（毫秒）
    ///
    /// 每次唤醒检查完成信号、取消信号和截止时间。
    /// 100ms是取消响应延迟与CPU占用的平衡点。
    pub const POLL_INTERVAL_MS: u64 = 100;

    /// 自适应超时的固定基准（秒）
    ///
    /// 覆盖引擎启动、收尾计算等与文件时长无关的开销。
    pub const BASE_TIMEOUT_SECS: f64 = 300.0;

    /// 超时下限（秒）：再短的文件也至少等10分钟
    pub const MIN_TIMEOUT_SECS: f64 = 600.0;

    /// 超时上限（秒）：损坏元数据报出天文数字时长时的保险
    pub const MAX_TIMEOUT_SECS: f64 = 7200.0;
}

/// 显示格式相关常量
pub mod display {
    /// 报告分隔线宽度（foobar2000 DR报告约定）
    pub const SEPARATOR_WIDTH: usize = 80;
}
