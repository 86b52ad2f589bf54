//! 批量分析控制器
//!
//! 串行遍历多个解码源，每个文件一条独立的会话管线，单文件失败
//! （包括panic）被完全隔离，批次继续推进。聚合结果包含逐文件
//! 明细、成功/失败计数和错误分类统计。

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::engine::{CallbackRegistry, DrEngine, SessionReport};
use crate::error::{ErrorCategory, HostError, HostResult};
use crate::pipeline::{CancelToken, SessionSupervisor};
use crate::source::DecodeSource;
use crate::tools::config::HostConfig;
use crate::tools::formatter;

/// 批次级进度回调：(文件显示名, 当前序号1-based, 总数)
pub type BatchProgressFn = dyn Fn(&str, usize, usize) + Send + Sync;

/// 按错误类别的失败统计
#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    counts: HashMap<ErrorCategory, usize>,
}

impl ErrorStats {
    /// 记录一次宿主错误
    pub fn record(&mut self, error: &HostError) {
        self.record_category(ErrorCategory::from_host_error(error));
    }

    /// 记录一次指定类别的失败
    pub fn record_category(&mut self, category: ErrorCategory) {
        *self.counts.entry(category).or_insert(0) += 1;
    }

    /// 指定类别的失败次数
    pub fn count(&self, category: ErrorCategory) -> usize {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    /// 失败总数
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// 统计摘要行；无失败时为空字符串
    pub fn summary_line(&self) -> String {
        if self.counts.is_empty() {
            return String::new();
        }
        let mut entries: Vec<_> = self.counts.iter().collect();
        // 排序保证输出稳定
        entries.sort_by_key(|(category, _)| category.display_name());
        entries
            .iter()
            .map(|(category, count)| format!("{}: {}", category.display_name(), count))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// 单个文件的批次结果
#[derive(Debug, Clone, Serialize)]
pub struct PerFileResult {
    /// 显示名（源未提供时为位置回退名 file_N）
    pub file_name: String,
    pub success: bool,
    /// 源位深度（来自解码适配器提示）
    pub bits_per_sample: u16,
    /// 成功时的引擎报告
    pub report: Option<SessionReport>,
    /// 失败时的错误描述
    pub error: Option<String>,
    pub elapsed: Duration,
}

/// 批次聚合报告
///
/// `results` 保持输入顺序；`success` 表示"至少一个文件成功"，
/// 与全部成功是不同的判定。
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub results: Vec<PerFileResult>,
    pub processed_count: usize,
    pub failed_count: usize,
    pub total_elapsed: Duration,
    pub success: bool,
    #[serde(skip)]
    pub error_stats: ErrorStats,
}

impl BatchReport {
    fn aborted() -> Self {
        Self {
            results: Vec::new(),
            processed_count: 0,
            failed_count: 0,
            total_elapsed: Duration::ZERO,
            success: false,
            error_stats: ErrorStats::default(),
        }
    }

    /// 拼装批次合并文本报告
    pub fn combined_report(&self) -> String {
        formatter::combined_report(self)
    }

    /// 序列化为JSON（供外部工具消费）
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// 后台批量分析任务句柄
pub struct BatchTask {
    handle: JoinHandle<BatchReport>,
    cancel: CancelToken,
}

impl BatchTask {
    /// 请求取消批次（当前文件中断，剩余文件不再处理）
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 批次的取消令牌克隆
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// 批次线程是否已结束
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 等待批次结束并取回聚合报告
    pub fn join(self) -> BatchReport {
        // 逐文件catch_unwind已隔离panic，批次线程本身不会展开；
        // 万一展开，交回空的失败报告而不是二次panic
        self.handle.join().unwrap_or_else(|_| BatchReport::aborted())
    }
}

/// 批量分析控制器
pub struct BatchController {
    supervisor: SessionSupervisor,
    config: HostConfig,
    observer: Mutex<Option<Arc<BatchProgressFn>>>,
}

impl BatchController {
    /// 创建控制器；配置在构造期校验
    pub fn new(
        engine: Arc<dyn DrEngine>,
        registry: Arc<CallbackRegistry>,
        config: HostConfig,
    ) -> HostResult<Self> {
        let supervisor = SessionSupervisor::new(engine, registry, config.clone())?;
        Ok(Self {
            supervisor,
            config,
            observer: Mutex::new(None),
        })
    }

    /// 设置批次进度观察者（替换旧观察者；None清除）
    pub fn set_observer(&self, observer: Option<Arc<BatchProgressFn>>) {
        *self.observer.lock().unwrap_or_else(|e| e.into_inner()) = observer;
    }

    /// 串行处理一批解码源（内部创建取消令牌，不可外部取消）
    pub fn run_batch(&self, sources: Vec<Box<dyn DecodeSource>>) -> BatchReport {
        self.run_batch_with_cancel(sources, &CancelToken::new())
    }

    /// 串行处理一批解码源，响应外部取消令牌
    ///
    /// 取消到达时：当前文件记为失败（用户取消），剩余文件不再处理、
    /// 不出现在结果中。
    pub fn run_batch_with_cancel(
        &self,
        sources: Vec<Box<dyn DecodeSource>>,
        cancel: &CancelToken,
    ) -> BatchReport {
        let batch_start = Instant::now();
        let total = sources.len();
        let mut results = Vec::with_capacity(total);
        let mut error_stats = ErrorStats::default();

        if self.config.verbose && total > 0 {
            println!("[PROCESSING] 开始批量分析: {total} 个文件");
        }

        for (index, mut source) in sources.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            let position = index + 1;
            let file_name = source
                .display_name()
                .unwrap_or_else(|| format!("file_{position}"));
            self.notify_observer(&file_name, position, total);
            if self.config.verbose {
                println!("[PROCESSING] ({position}/{total}) {file_name}");
            }

            let bits_per_sample = source.bits_per_sample_hint();
            let file_start = Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                self.supervisor.analyze(source.as_mut(), cancel, None)
            }));
            let elapsed = file_start.elapsed();

            let (result, stop) = self.classify_outcome(
                outcome,
                file_name,
                bits_per_sample,
                elapsed,
                &mut error_stats,
            );
            if self.config.verbose {
                match (result.success, &result.error) {
                    (true, _) => println!(
                        "[OK] {} ({})",
                        result.file_name,
                        formatter::format_elapsed(elapsed)
                    ),
                    (false, Some(error)) => {
                        eprintln!("{}", formatter::failed_line(&result.file_name, error))
                    }
                    (false, None) => eprintln!("[FAIL] {}", result.file_name),
                }
            }
            results.push(result);
            if stop {
                break;
            }
        }

        let processed_count = results.iter().filter(|r| r.success).count();
        let failed_count = results.len() - processed_count;
        if total > 0 && !cancel.is_cancelled() {
            // 终了进度：total/total
            self.notify_observer("批量分析完成", total, total);
        }
        if self.config.verbose {
            println!(
                "[OK] 批量分析完成: 成功 {processed_count} 个，失败 {failed_count} 个（{}）",
                formatter::format_elapsed(batch_start.elapsed())
            );
        }
        BatchReport {
            results,
            processed_count,
            failed_count,
            total_elapsed: batch_start.elapsed(),
            // 部分失败不影响批次判定：只要有文件成功就算成功
            success: processed_count > 0,
            error_stats,
        }
    }

    /// 在后台线程启动批量分析，返回可取消、可join的任务句柄
    ///
    /// 控制器经 `Arc` 移入工作线程；调用方如需保留引用先clone。
    pub fn spawn_batch(self: Arc<Self>, sources: Vec<Box<dyn DecodeSource>>) -> BatchTask {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let handle = thread::spawn(move || self.run_batch_with_cancel(sources, &token));
        BatchTask { handle, cancel }
    }

    fn notify_observer(&self, file_name: &str, position: usize, total: usize) {
        let observer = self
            .observer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(observer) = observer {
            observer(file_name, position, total);
        }
    }

    /// 把单文件结果归档为批次条目；返回(条目, 是否中止批次)
    fn classify_outcome(
        &self,
        outcome: std::thread::Result<HostResult<SessionReport>>,
        file_name: String,
        bits_per_sample: u16,
        elapsed: Duration,
        error_stats: &mut ErrorStats,
    ) -> (PerFileResult, bool) {
        match outcome {
            Ok(Ok(mut report)) if report.success => {
                // 单文件报告尾部附耗时注记
                report.text.push_str(&formatter::elapsed_footer(elapsed));
                (
                    PerFileResult {
                        file_name,
                        success: true,
                        bits_per_sample,
                        report: Some(report),
                        error: None,
                        elapsed,
                    },
                    false,
                )
            }
            Ok(Ok(report)) => {
                // 引擎收尾计算失败：宿主侧无错误，按引擎类失败统计
                error_stats.record_category(ErrorCategory::Engine);
                let error = report.text.clone();
                (
                    PerFileResult {
                        file_name,
                        success: false,
                        bits_per_sample,
                        report: Some(report),
                        error: Some(error),
                        elapsed,
                    },
                    false,
                )
            }
            Ok(Err(e)) => {
                error_stats.record(&e);
                let stop = matches!(e, HostError::Cancelled);
                (
                    PerFileResult {
                        file_name,
                        success: false,
                        bits_per_sample,
                        report: None,
                        error: Some(e.to_string()),
                        elapsed,
                    },
                    stop,
                )
            }
            Err(_) => {
                // panic被隔离在单文件范围内，批次继续
                error_stats.record_category(ErrorCategory::Other);
                (
                    PerFileResult {
                        file_name,
                        success: false,
                        bits_per_sample,
                        report: None,
                        error: Some(String::from("分析过程发生panic，已隔离")),
                        elapsed,
                    },
                    false,
                )
            }
        }
    }
}
