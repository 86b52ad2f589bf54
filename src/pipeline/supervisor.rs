//! 会话监督器
//!
//! 单文件分析的端到端驱动：注册回调、惰性创建会话、批处理喂数、
//! 收尾后在等待循环中同时监听完成信号、取消信号和自适应超时。
//!
//! 等待原语是容量为1的crossbeam通道：完成回调把报告send进通道，
//! 监督线程以固定轮询间隔recv_timeout，每次唤醒检查取消与截止时间。
//! 这比忙等循环省CPU，又保证取消响应延迟有上界。

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crossbeam_channel::{RecvTimeoutError, bounded};

use crate::engine::registry::{CallbackHandle, ProgressFn};
use crate::engine::{CallbackRegistry, DrEngine, SessionReport, status};
use crate::error::{self, HostError, HostResult};
use crate::pipeline::{AnalysisSession, BatchBuffer, CancelToken};
use crate::source::DecodeSource;
use crate::tools::config::HostConfig;

/// 最近一次进度通知的快照
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub current: u32,
    pub total: u32,
    pub message: String,
}

/// 自适应超时计算（秒）
///
/// 公式：基准 + 时长 + 50%裕量，再clamp到[下限, 上限]。
/// 时长估算为NaN/负数时按0处理，clamp同时吸收元数据异常大的情况，
/// 因此损坏的时长元数据永远不会产生病态的超时值。
pub fn adaptive_timeout_secs(duration_seconds: f64, config: &HostConfig) -> u64 {
    let duration = if duration_seconds.is_finite() && duration_seconds > 0.0 {
        duration_seconds
    } else {
        0.0
    };
    let raw = config.base_timeout_secs + duration + duration * 0.5;
    raw.clamp(config.min_timeout_secs, config.max_timeout_secs) as u64
}

/// 单文件分析监督器
///
/// 持有引擎与回调注册表的共享引用；每次 `analyze` 调用是独立的
/// 会话生命周期，多个监督器可共享同一引擎实例。
pub struct SessionSupervisor {
    engine: Arc<dyn DrEngine>,
    registry: Arc<CallbackRegistry>,
    config: HostConfig,
    latest_progress: Arc<Mutex<Option<ProgressSnapshot>>>,
}

impl SessionSupervisor {
    /// 创建监督器；配置在构造期校验
    pub fn new(
        engine: Arc<dyn DrEngine>,
        registry: Arc<CallbackRegistry>,
        config: HostConfig,
    ) -> HostResult<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            registry,
            config,
            latest_progress: Arc::new(Mutex::new(None)),
        })
    }

    /// 最近一次进度通知的快照（尚无通知时为None）
    pub fn latest_progress(&self) -> Option<ProgressSnapshot> {
        self.latest_progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 驱动一次完整的分析会话
    ///
    /// 流式解码 → 批处理喂数 → 收尾 → 等待完成。
    /// 任何失败路径都保证引擎资源释放、回调注册注销。
    /// 引擎侧计算失败（完成报告success=false）不是宿主错误，
    /// 原样返回报告由调用方判定。
    pub fn analyze(
        &self,
        source: &mut dyn DecodeSource,
        cancel: &CancelToken,
        progress: Option<ProgressFn>,
    ) -> HostResult<SessionReport> {
        // 完成信号通道：完成回调send，监督线程recv_timeout轮询
        let (done_tx, done_rx) = bounded::<SessionReport>(1);
        let completion_handle = self.registry.register_completion(Box::new(move |report| {
            let _ = done_tx.send(report);
        }));

        let snapshot = Arc::clone(&self.latest_progress);
        let progress_handle = self.registry.register_progress(Arc::new(move |update| {
            *snapshot.lock().unwrap_or_else(|e| e.into_inner()) = Some(ProgressSnapshot {
                current: update.current,
                total: update.total,
                message: update.message.clone(),
            });
            if let Some(callback) = &progress {
                callback(update);
            }
        }));

        // panic展开也必须注销注册，否则批量层的panic隔离会泄漏句柄
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.run_session(source, cancel, progress_handle, completion_handle, &done_rx)
        }));

        // 所有退出路径统一注销（已消费的完成句柄注销为no-op）
        self.registry.retire(progress_handle);
        self.registry.retire(completion_handle);

        match outcome {
            Ok(result) => result,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    fn run_session(
        &self,
        source: &mut dyn DecodeSource,
        cancel: &CancelToken,
        progress_handle: CallbackHandle,
        completion_handle: CallbackHandle,
        done_rx: &crossbeam_channel::Receiver<SessionReport>,
    ) -> HostResult<SessionReport> {
        let mut buffer = BatchBuffer::new(self.config.batch_capacity)?;
        let mut session: Option<AnalysisSession> = None;
        let mut stream_error: Option<HostError> = None;
        let mut duration = source.duration_hint();

        let engine = Arc::clone(&self.engine);
        source.stream(cancel, &mut |chunk, _first, info| {
            if cancel.is_cancelled() {
                return false;
            }

            // 第一个有效块携带格式信息：在这里惰性创建会话
            if let Some(info) = info {
                match AnalysisSession::create(
                    Arc::clone(&engine),
                    info,
                    progress_handle,
                    completion_handle,
                ) {
                    Ok(created) => {
                        if info.duration_seconds > 0.0 {
                            duration = info.duration_seconds;
                        }
                        session = Some(created);
                    }
                    Err(e) => {
                        stream_error = Some(e);
                        return false;
                    }
                }
            }
            let Some(session) = session.as_mut() else {
                // 首块未携带格式信息：适配器违反契约
                stream_error = Some(error::decode_error(
                    "解码适配器违反契约",
                    "首块未携带流格式信息",
                ));
                return false;
            };

            buffer.append(chunk);
            if buffer.is_full() {
                let batch = buffer.flush();
                if let Err(e) = session.feed(&batch) {
                    stream_error = Some(e);
                    return false;
                }
            }
            true
        })?;

        if let Some(e) = stream_error {
            // 会话（如已创建）的资源由feed失败路径或Drop兜底释放
            return Err(e);
        }
        if cancel.is_cancelled() {
            if let Some(mut session) = session {
                session.cancel();
            }
            return Err(HostError::Cancelled);
        }
        let Some(mut session) = session else {
            return Err(error::decode_error("无有效音频数据", "解码器未交付任何样本"));
        };

        // 末尾余量与收尾
        let remainder = buffer.flush();
        session.feed(&remainder)?;
        session.finalize()?;

        self.wait_for_completion(&mut session, cancel, duration, done_rx)
    }

    /// 等待循环：完成、取消、超时三路收敛
    fn wait_for_completion(
        &self,
        session: &mut AnalysisSession,
        cancel: &CancelToken,
        duration_seconds: f64,
        done_rx: &crossbeam_channel::Receiver<SessionReport>,
    ) -> HostResult<SessionReport> {
        let limit_secs = adaptive_timeout_secs(duration_seconds, &self.config);
        let deadline = Instant::now() + std::time::Duration::from_secs(limit_secs);

        loop {
            match done_rx.recv_timeout(self.config.poll_interval) {
                Ok(report) => {
                    session.mark_completed();
                    return Ok(report);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        session.cancel();
                        return Err(HostError::Cancelled);
                    }
                    if Instant::now() >= deadline {
                        session.cancel();
                        return Err(HostError::Timeout { limit_secs });
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // 发送端随完成回调被注销而消失：按收尾失败处理
                    session.cancel();
                    return Err(HostError::Finalize(status::INVALID_SESSION));
                }
            }
        }
    }
}
