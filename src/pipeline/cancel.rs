//! 协作式取消令牌
//!
//! 管线各层（解码适配器、chunk回调、等待循环）在各自的检查点
//! 轮询同一个令牌，取消信号由任意持有克隆的线程发出。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 协作式取消令牌
///
/// 克隆共享同一底层标志；取消是单向的，一旦置位不可复位。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// 创建未取消的令牌
    pub fn new() -> Self {
        Self::default()
    }

    /// 发出取消信号（幂等）
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// 查询是否已取消
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
