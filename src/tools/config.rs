//! 编排层运行配置
//!
//! 默认值来自 [`crate::tools::constants`]，测试可以缩小
//! 超时与轮询参数来把真实等待路径压缩到毫秒级。

use std::time::Duration;

use crate::error::{self, HostResult};
use crate::tools::constants::{batching, supervision};

/// 宿主编排配置
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// 批缓冲容量（交错样本数），必须大于0
    pub batch_capacity: usize,
    /// 等待循环轮询间隔
    pub poll_interval: Duration,
    /// 自适应超时的固定基准（秒）
    pub base_timeout_secs: f64,
    /// 超时下限（秒）
    pub min_timeout_secs: f64,
    /// 超时上限（秒）
    pub max_timeout_secs: f64,
    /// 批量处理时输出逐文件进度日志
    pub verbose: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            batch_capacity: batching::BATCH_CAPACITY_SAMPLES,
            poll_interval: Duration::from_millis(supervision::POLL_INTERVAL_MS),
            base_timeout_secs: supervision::BASE_TIMEOUT_SECS,
            min_timeout_secs: supervision::MIN_TIMEOUT_SECS,
            max_timeout_secs: supervision::MAX_TIMEOUT_SECS,
            verbose: false,
        }
    }
}

impl HostConfig {
    /// 校验配置参数（构造期错误，不进入运行路径）
    pub fn validate(&self) -> HostResult<()> {
        if self.batch_capacity == 0 {
            return Err(error::config_error("批缓冲容量", "不能为0"));
        }
        if self.poll_interval.is_zero() {
            return Err(error::config_error("轮询间隔", "不能为0"));
        }
        if !self.base_timeout_secs.is_finite() || self.base_timeout_secs < 0.0 {
            return Err(error::config_error(
                "超时基准",
                format!("{} 不是有效的非负秒数", self.base_timeout_secs),
            ));
        }
        if !self.min_timeout_secs.is_finite()
            || !self.max_timeout_secs.is_finite()
            || self.min_timeout_secs <= 0.0
            || self.min_timeout_secs > self.max_timeout_secs
        {
            return Err(error::config_error(
                "超时区间",
                format!("[{}, {}] 无效", self.min_timeout_secs, self.max_timeout_secs),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(HostConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let mut cfg = HostConfig::default();
        cfg.batch_capacity = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = HostConfig::default();
        cfg.poll_interval = Duration::ZERO;
        assert!(cfg.validate().is_err());

        let mut cfg = HostConfig::default();
        cfg.min_timeout_secs = 100.0;
        cfg.max_timeout_secs = 50.0;
        assert!(cfg.validate().is_err());
    }
}
