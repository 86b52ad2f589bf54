//! 外部DR分析引擎接口模块
//!
//! 定义引擎侧会话接口（trait）、状态码约定和结果载荷类型。
//! DR数值算法本身在引擎内部实现，本层只负责跨边界的契约。

pub mod mock;
pub mod registry;

pub use mock::MockEngine;
pub use registry::{CallbackHandle, CallbackRegistry, NO_CALLBACK};

use serde::Serialize;

/// 引擎任务标识
///
/// `session_create` 返回的值：正数为有效任务ID，非正数表示创建失败。
/// 同一引擎实例中，存活会话的任务ID互不相同。
pub type TaskId = i32;

/// 引擎状态码约定（与原FFI边界保持一致）
pub mod status {
    /// 成功
    pub const OK: i32 = 0;
    /// 无效会话ID或通用失败
    pub const INVALID_SESSION: i32 = -1;
    /// 参数无效（空数据、未注册的回调句柄等）
    pub const INVALID_ARGUMENT: i32 = -2;
    /// 数据处理失败
    pub const FEED_FAILED: i32 = -3;
    /// 声道数超出引擎支持范围
    pub const CHANNEL_LIMIT: i32 = -5;
}

/// DR分析结果载荷
///
/// 引擎在完成回调中交付的聚合结果：整体DR与每声道明细。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrSummary {
    /// 官方DR值（各声道DR算术平均后四舍五入）
    pub official_dr: i32,
    /// 精确DR值（dB）
    pub precise_dr: f64,
    /// 整体Peak值（dB）
    pub peak_db: f64,
    /// 整体RMS值（dB）
    pub rms_db: f64,
    /// 每声道DR值（dB）
    pub channel_dr: Vec<f64>,
    /// 每声道Peak值（dB）
    pub channel_peak_db: Vec<f64>,
    /// 每声道RMS值（dB）
    pub channel_rms_db: Vec<f64>,
    /// 参与分析的交错样本总数（真实值，非估算）
    pub total_samples: u64,
}

/// 会话完成报告
///
/// 完成回调携带的最终结果：成功时包含格式化报告与结果载荷，
/// 失败时 `text` 为错误描述。每个会话恰好交付一次。
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub success: bool,
    /// 格式化的DR报告文本（失败时为错误描述）
    pub text: String,
    pub summary: Option<DrSummary>,
}

/// 进度更新
///
/// 引擎工作线程发出的进度通知。引擎可以跳过或合并进度回调，
/// 但完成回调保证恰好触发一次。
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub current: u32,
    pub total: u32,
    pub message: String,
}

/// 外部DR分析引擎trait
///
/// 会话式接口：`session_create` 分配引擎侧会话并绑定回调句柄，
/// `session_feed` 推送交错样本，`session_finalize` 标记输入结束
/// （结果稍后经完成回调异步交付，不作为返回值），`session_cancel`/
/// `session_free` 释放资源。所有方法返回FFI风格的状态码而非Result，
/// 因为引擎边界可能不支持结构化异常传播；状态码到错误类型的转换
/// 由会话状态机负责。
///
/// # 线程约定
///
/// 引擎在自有线程上执行计算并从该线程调用注册的回调；
/// trait要求 `Send + Sync` 以便宿主在管线线程间共享引擎引用。
pub trait DrEngine: Send + Sync {
    /// 创建分析会话
    ///
    /// 返回正数任务ID表示成功；非正数表示失败
    /// （[`status::CHANNEL_LIMIT`] 表示声道数超限）。
    /// `progress_handle` 为 [`NO_CALLBACK`] 时表示不需要进度通知。
    fn session_create(
        &self,
        channels: u32,
        sample_rate: u32,
        bits_per_sample: u32,
        progress_handle: CallbackHandle,
        completion_handle: CallbackHandle,
    ) -> TaskId;

    /// 推送一批交错f32样本，返回状态码（非零即会话终止性失败）
    fn session_feed(&self, task: TaskId, samples: &[f32]) -> i32;

    /// 标记输入结束，启动引擎收尾计算
    ///
    /// 返回0表示收尾已启动；结果经完成回调异步交付。
    fn session_finalize(&self, task: TaskId) -> i32;

    /// 取消会话，返回状态码
    fn session_cancel(&self, task: TaskId) -> i32;

    /// 释放会话资源；幂等，对不存在的会话安全
    fn session_free(&self, task: TaskId);
}
