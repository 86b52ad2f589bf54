//! 分析会话状态机
//!
//! 包装引擎侧会话的宿主对象：状态码到错误类型的转换、
//! 状态转移约束和资源释放的唯一出口。无论成功、失败、
//! 取消还是panic展开，引擎资源恰好释放一次。

use std::sync::Arc;

use crate::engine::{DrEngine, TaskId, status};
use crate::engine::registry::CallbackHandle;
use crate::error::{HostError, HostResult};
use crate::source::StreamInfo;

/// 会话生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 已创建，尚未推送数据
    Created,
    /// 数据推送中
    Feeding,
    /// 已标记输入结束，等待引擎收尾
    Finalizing,
    /// 引擎已交付完成结果
    Completed,
    /// 已取消
    Cancelled,
    /// 引擎侧失败，资源已释放
    Failed,
}

impl SessionState {
    /// 是否为终止态（不再接受任何操作）
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// 单次分析的引擎会话包装
///
/// 所有引擎状态码在这里转换为 [`HostError`]；引擎返回失败后
/// 会话立即转入终止态并释放资源，调用方只需向上传播错误。
pub struct AnalysisSession {
    engine: Arc<dyn DrEngine>,
    task: TaskId,
    state: SessionState,
    freed: bool,
}

impl AnalysisSession {
    /// 创建引擎会话
    ///
    /// 先做宿主侧格式校验（无效格式在接触引擎前拒绝），
    /// 再向引擎申请会话；非正任务ID视为初始化失败。
    pub fn create(
        engine: Arc<dyn DrEngine>,
        info: &StreamInfo,
        progress_handle: CallbackHandle,
        completion_handle: CallbackHandle,
    ) -> HostResult<Self> {
        info.validate()?;

        let task = engine.session_create(
            u32::from(info.channels),
            info.sample_rate,
            u32::from(info.bits_per_sample),
            progress_handle,
            completion_handle,
        );
        if task <= 0 {
            return Err(HostError::EngineInit(task));
        }

        Ok(Self {
            engine,
            task,
            state: SessionState::Created,
            freed: false,
        })
    }

    /// 引擎任务ID
    pub fn task_id(&self) -> TaskId {
        self.task
    }

    /// 当前状态
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 推送一批交错样本
    ///
    /// 空批是no-op。引擎拒绝数据时会话转入Failed并释放资源。
    pub fn feed(&mut self, samples: &[f32]) -> HostResult<()> {
        if samples.is_empty() {
            return Ok(());
        }
        if !matches!(self.state, SessionState::Created | SessionState::Feeding) {
            return Err(HostError::Feed(status::INVALID_SESSION));
        }

        let code = self.engine.session_feed(self.task, samples);
        if code != status::OK {
            self.abort();
            return Err(HostError::Feed(code));
        }
        self.state = SessionState::Feeding;
        Ok(())
    }

    /// 标记输入结束，启动引擎收尾
    ///
    /// 成功后会话进入Finalizing，结果经完成回调异步到达；
    /// 资源要等到完成/取消/超时路径收敛后才释放。
    pub fn finalize(&mut self) -> HostResult<()> {
        if !matches!(self.state, SessionState::Created | SessionState::Feeding) {
            return Err(HostError::Finalize(status::INVALID_SESSION));
        }

        let code = self.engine.session_finalize(self.task);
        if code != status::OK {
            self.abort();
            return Err(HostError::Finalize(code));
        }
        self.state = SessionState::Finalizing;
        Ok(())
    }

    /// 取消会话并释放资源（幂等）
    ///
    /// 取消与超时共用此路径；终止态下调用为no-op。
    pub fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.engine.session_cancel(self.task);
        self.release();
        self.state = SessionState::Cancelled;
    }

    /// 完成回调到达后由监督器调用：转入Completed并释放资源
    pub fn mark_completed(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.release();
        self.state = SessionState::Completed;
    }

    /// 引擎侧失败：取消并释放，转入Failed
    fn abort(&mut self) {
        self.engine.session_cancel(self.task);
        self.release();
        self.state = SessionState::Failed;
    }

    fn release(&mut self) {
        if !self.freed {
            self.engine.session_free(self.task);
            self.freed = true;
        }
    }
}

impl Drop for AnalysisSession {
    /// 兜底释放：panic展开或提前return时保证资源不泄漏
    fn drop(&mut self) {
        if !self.freed {
            if !self.state.is_terminal() {
                self.engine.session_cancel(self.task);
            }
            self.release();
        }
    }
}
