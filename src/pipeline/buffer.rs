//! 批处理缓冲
//!
//! 解码器以任意粒度推送样本块，引擎边界的调用开销按次计费。
//! 缓冲把小块累积成大批，显著降低跨边界调用频率。

use crate::error::{self, HostResult};

/// 固定容量的样本累积缓冲
///
/// 容量以交错f32样本数计。`append` 只累积不自动派发，
/// 调用方在 `is_full` 时 `flush` 并把整批推给引擎；
/// 末尾不足一批的余量在流结束后由调用方显式flush。
pub struct BatchBuffer {
    samples: Vec<f32>,
    capacity: usize,
}

impl BatchBuffer {
    /// 创建指定容量的缓冲；容量为0是构造期错误
    pub fn new(capacity: usize) -> HostResult<Self> {
        if capacity == 0 {
            return Err(error::config_error("批缓冲容量不能为0", "capacity=0"));
        }
        Ok(Self {
            samples: Vec::with_capacity(capacity),
            capacity,
        })
    }

    /// 追加一块样本（不触发派发）
    pub fn append(&mut self, chunk: &[f32]) {
        self.samples.extend_from_slice(chunk);
    }

    /// 缓冲是否已达到容量阈值
    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// 当前累积的样本数
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// 缓冲是否为空
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 取出全部累积样本并清空缓冲（保留已分配容量）
    pub fn flush(&mut self) -> Vec<f32> {
        std::mem::replace(&mut self.samples, Vec::with_capacity(self.capacity))
    }
}
