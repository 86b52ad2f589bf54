//! 解码源适配器接口模块
//!
//! 定义宿主解码子系统与DR分析管线之间的流式回调契约。
//! 解码本身是外部协作者的职责，本模块只约定数据如何跨越边界。

use crate::error::{self, HostResult};
use crate::pipeline::CancelToken;

/// 支持的最大声道数（架构约束）
///
/// 当前仅支持单声道(1)和立体声(2)，3+声道在数据跨越引擎边界前友好拒绝。
/// 这是基于 foobar2000 DR Meter 规范的设计约束。
pub const MAX_CHANNELS: u16 = 2;

/// 流格式信息
///
/// 从第一个有效chunk惰性捕获一次，此后不可变。
/// `duration_seconds` 仅为时长估算（用于自适应超时计算），
/// 元数据损坏时可能为0或异常大，超时公式通过clamp吸收该误差。
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub channels: u16,
    pub sample_rate: u32,
    /// 源音频的位深度（来自解码器/容器元数据）
    ///
    /// 注意：这表示源格式的位深，管线内部统一使用 f32 交错样本。
    pub bits_per_sample: u16,
    /// 播放时长估算（秒），未知时为0
    pub duration_seconds: f64,
}

impl StreamInfo {
    /// 创建新的流格式信息
    pub fn new(channels: u16, sample_rate: u32, bits_per_sample: u16, duration_seconds: f64) -> Self {
        Self {
            channels,
            sample_rate,
            bits_per_sample,
            duration_seconds,
        }
    }

    /// 验证格式参数的有效性
    ///
    /// 必须在第一次feed之前、甚至在引擎会话分配之前调用，
    /// 保证无效格式的数据永远不会跨越引擎边界。
    pub fn validate(&self) -> HostResult<()> {
        if self.channels == 0 {
            return Err(error::invalid_format("声道数无效", "0"));
        }
        if self.channels > MAX_CHANNELS {
            return Err(error::invalid_format(
                "不支持的声道数",
                format!("{}声道（仅支持单声道或立体声，即1-2声道）", self.channels),
            ));
        }
        if self.sample_rate == 0 {
            return Err(error::invalid_format("采样率无效", "0"));
        }
        Ok(())
    }
}

/// 解码源适配器trait
///
/// 定义统一的流式解码回调接口。实现方（宿主的解码子系统）以任意粒度
/// 推送交错f32样本块；消费方在回调内复制数据，不得在回调返回后继续引用。
///
/// # 回调契约
///
/// - `on_chunk(samples, first_chunk, info)` 按解码顺序逐块调用
/// - 第一个有效块携带 `Some(&StreamInfo)`，之后为 `None`
/// - 回调返回 `false` 表示停止解码，这不是错误（协作式取消的第一层）
/// - 适配器自身的解码失败通过 `Err(HostError::Decode)` 返回
///
/// # 线程约定
///
/// `stream` 在管线工作线程上同步执行；适配器应在解码单元之间
/// 检查 `cancel`，以便用户取消能及时中断长文件的解码。
pub trait DecodeSource: Send {
    /// 显示名称（用于结果报告），不可用时返回None
    fn display_name(&self) -> Option<String> {
        None
    }

    /// 播放时长估算（秒），用于自适应超时计算；未知时返回0
    fn duration_hint(&self) -> f64 {
        0.0
    }

    /// 源位深度提示（用于结果元数据）
    ///
    /// 默认32位，对应宿主内部浮点精度（foobar2000约定）。
    fn bits_per_sample_hint(&self) -> u16 {
        32
    }

    /// 流式解码并通过回调推送样本块
    ///
    /// 返回 `Ok(())` 表示解码正常结束或被回调/取消信号停止；
    /// `Err(_)` 表示解码过程本身失败。
    fn stream(
        &mut self,
        cancel: &CancelToken,
        on_chunk: &mut dyn FnMut(&[f32], bool, Option<&StreamInfo>) -> bool,
    ) -> HostResult<()>;
}

/// 内存缓冲解码源
///
/// 包装宿主已解码完成的样本缓冲区，按固定块大小流过同一条批处理管线。
/// 注意：这不是"一次性喂入全量缓冲"模式的复活——数据仍然分块流式交付，
/// 批处理缓冲的行为与真实流式解码完全一致。
pub struct MemorySource {
    samples: Vec<f32>,
    info: StreamInfo,
    chunk_samples: usize,
    name: Option<String>,
}

impl MemorySource {
    /// 默认推送块大小（交错样本数）
    ///
    /// 模拟典型解码器的chunk粒度，远小于批处理缓冲容量。
    pub const DEFAULT_CHUNK_SAMPLES: usize = 4096;

    /// 创建内存解码源
    pub fn new(samples: Vec<f32>, info: StreamInfo) -> Self {
        Self {
            samples,
            info,
            chunk_samples: Self::DEFAULT_CHUNK_SAMPLES,
            name: None,
        }
    }

    /// 设置显示名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 设置推送块大小（交错样本数，0视为默认值）
    pub fn with_chunk_samples(mut self, chunk_samples: usize) -> Self {
        self.chunk_samples = if chunk_samples == 0 {
            Self::DEFAULT_CHUNK_SAMPLES
        } else {
            chunk_samples
        };
        self
    }
}

impl DecodeSource for MemorySource {
    fn display_name(&self) -> Option<String> {
        self.name.clone()
    }

    fn duration_hint(&self) -> f64 {
        self.info.duration_seconds
    }

    fn bits_per_sample_hint(&self) -> u16 {
        self.info.bits_per_sample
    }

    fn stream(
        &mut self,
        cancel: &CancelToken,
        on_chunk: &mut dyn FnMut(&[f32], bool, Option<&StreamInfo>) -> bool,
    ) -> HostResult<()> {
        let mut first = true;
        for chunk in self.samples.chunks(self.chunk_samples) {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let info = if first { Some(&self.info) } else { None };
            if !on_chunk(chunk, first, info) {
                // 回调要求停止：协作式取消，不是错误
                return Ok(());
            }
            first = false;
        }
        Ok(())
    }
}
