//! 回调注册表模块
//!
//! 进度/完成回调的句柄化管理：注册返回不透明句柄，引擎工作线程
//! 凭句柄查找并调用。注册表是管线中唯一没有单一所有者的共享状态，
//! 通过 `Arc<CallbackRegistry>` 在监督线程与引擎线程之间共享。
//!
//! 与"单一当前活跃工作器"全局指针模式不同，注册表按句柄显式管理
//! 每个注册的生命周期：多个会话可以同时持有互不干扰的注册，
//! 即使同一时刻只有一个会话在驱动等待循环。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{ProgressUpdate, SessionReport};

/// 回调句柄类型
pub type CallbackHandle = u32;

/// 保留句柄：表示"无回调"，永远不会分配给真实注册
pub const NO_CALLBACK: CallbackHandle = 0;

/// 进度回调类型
///
/// 在引擎工作线程上调用，必须廉价且不阻塞。
pub type ProgressFn = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

/// 完成回调类型（每个注册最多调用一次）
pub type CompletionFn = Box<dyn FnOnce(SessionReport) + Send>;

struct RegistryInner {
    progress: HashMap<CallbackHandle, ProgressFn>,
    completion: HashMap<CallbackHandle, CompletionFn>,
    next_handle: CallbackHandle,
}

/// 线程安全的回调注册表
pub struct CallbackRegistry {
    inner: Mutex<RegistryInner>,
}

impl CallbackRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                progress: HashMap::new(),
                completion: HashMap::new(),
                // 句柄从1开始单调递增：0保留为"无回调"
                next_handle: 1,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        // 回调闭包在锁外执行，不会在持锁时panic；中毒视为不可达
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 注册进度回调，返回新句柄
    pub fn register_progress(&self, callback: ProgressFn) -> CallbackHandle {
        let mut inner = self.lock();
        let handle = inner.next_handle;
        inner.next_handle += 1;
        inner.progress.insert(handle, callback);
        handle
    }

    /// 注册完成回调，返回新句柄
    pub fn register_completion(&self, callback: CompletionFn) -> CallbackHandle {
        let mut inner = self.lock();
        let handle = inner.next_handle;
        inner.next_handle += 1;
        inner.completion.insert(handle, callback);
        handle
    }

    /// 按句柄调用进度回调；未知句柄为no-op
    ///
    /// 回调在锁外执行，引擎线程持锁时间仅为一次HashMap查找。
    pub fn invoke_progress(&self, handle: CallbackHandle, update: &ProgressUpdate) {
        let callback = self.lock().progress.get(&handle).cloned();
        if let Some(callback) = callback {
            callback(update);
        }
    }

    /// 按句柄调用完成回调；未知句柄为no-op
    ///
    /// 调用前先从映射中移除条目，因此同一句柄的第二次调用
    /// 在结构上不可能触发回调（恰好一次语义）。
    pub fn invoke_completion(&self, handle: CallbackHandle, report: SessionReport) {
        let callback = self.lock().completion.remove(&handle);
        if let Some(callback) = callback {
            callback(report);
        }
    }

    /// 查询完成句柄是否有效（引擎在会话创建时校验）
    pub fn has_completion(&self, handle: CallbackHandle) -> bool {
        self.lock().completion.contains_key(&handle)
    }

    /// 查询进度句柄是否有效
    pub fn has_progress(&self, handle: CallbackHandle) -> bool {
        self.lock().progress.contains_key(&handle)
    }

    /// 注销句柄（同时从两个映射移除）
    ///
    /// 注销已注销或未知的句柄是no-op，不是错误。
    pub fn retire(&self, handle: CallbackHandle) {
        let mut inner = self.lock();
        inner.progress.remove(&handle);
        inner.completion.remove(&handle);
    }

    /// 当前存活的注册数（进度+完成），用于泄漏检测
    pub fn live_registrations(&self) -> usize {
        let inner = self.lock();
        inner.progress.len() + inner.completion.len()
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}
