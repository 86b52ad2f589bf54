//! 进程内参考引擎
//!
//! 完整遵守会话契约的内存引擎实现：唯一任务ID、FFI风格状态码、
//! finalize后在独立工作线程上收尾并经注册表交付恰好一次完成回调。
//! 用于测试、联调和没有真实引擎时的端到端演示。
//!
//! 注意：这里的"DR计算"只是简化的peak/RMS统计，真实的DR算法
//! （直方图、20%采样、次峰值选择）属于外部引擎的职责范围。

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::registry::{CallbackHandle, CallbackRegistry, NO_CALLBACK};
use super::{DrEngine, DrSummary, ProgressUpdate, SessionReport, TaskId, status};

/// 引擎调用日志（用于测试断言）
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    pub created: Vec<TaskId>,
    /// 每次feed的(任务ID, 样本副本)，按调用顺序记录
    pub feeds: Vec<(TaskId, Vec<f32>)>,
    pub finalized: Vec<TaskId>,
    pub cancelled: Vec<TaskId>,
    /// 每次session_free调用（包括对已不存在会话的幂等调用）
    pub freed: Vec<TaskId>,
}

impl CallLog {
    /// 指定任务跨所有feed调用交付的样本串联序列
    pub fn fed_samples(&self, task: TaskId) -> Vec<f32> {
        self.feeds
            .iter()
            .filter(|(t, _)| *t == task)
            .flat_map(|(_, s)| s.iter().copied())
            .collect()
    }

    /// 指定任务的session_free调用次数
    pub fn free_count(&self, task: TaskId) -> usize {
        self.freed.iter().filter(|t| **t == task).count()
    }
}

/// 每声道累积统计
#[derive(Debug, Clone, Default)]
struct ChannelStats {
    peak: f64,
    sum_squares: f64,
    count: u64,
}

struct MockSession {
    channels: u32,
    sample_rate: u32,
    bits_per_sample: u32,
    progress_handle: CallbackHandle,
    completion_handle: CallbackHandle,
    stats: Vec<ChannelStats>,
    total_samples: u64,
    feed_calls: usize,
}

impl MockSession {
    fn accumulate(&mut self, samples: &[f32]) {
        let channels = self.channels as usize;
        for (i, &sample) in samples.iter().enumerate() {
            let stat = &mut self.stats[i % channels];
            let v = sample.abs() as f64;
            if v > stat.peak {
                stat.peak = v;
            }
            stat.sum_squares += (sample as f64) * (sample as f64);
            stat.count += 1;
        }
        self.total_samples += samples.len() as u64;
        self.feed_calls += 1;
    }
}

/// 故障注入与时序选项
#[derive(Debug, Clone, Default)]
struct MockOptions {
    fail_create: bool,
    /// 第N次feed（1-based）起返回失败状态码
    fail_feed_at: Option<usize>,
    fail_finalize: bool,
    /// 收尾工作线程在交付完成回调前的人为延迟
    finalize_delay: Duration,
    /// 完成回调交付失败结果（模拟引擎计算失败）
    complete_with_failure: bool,
}

/// 进程内参考引擎
pub struct MockEngine {
    registry: Arc<CallbackRegistry>,
    sessions: Mutex<HashMap<TaskId, MockSession>>,
    next_task: AtomicI32,
    options: MockOptions,
    log: Mutex<CallLog>,
}

impl MockEngine {
    /// 创建引擎；回调经指定注册表交付
    pub fn new(registry: Arc<CallbackRegistry>) -> Self {
        Self {
            registry,
            sessions: Mutex::new(HashMap::new()),
            next_task: AtomicI32::new(1),
            options: MockOptions::default(),
            log: Mutex::new(CallLog::default()),
        }
    }

    /// 模拟会话创建失败
    pub fn fail_create(mut self) -> Self {
        self.options.fail_create = true;
        self
    }

    /// 模拟第N次feed（1-based）失败
    pub fn fail_feed_at(mut self, nth: usize) -> Self {
        self.options.fail_feed_at = Some(nth);
        self
    }

    /// 模拟finalize调用本身失败
    pub fn fail_finalize(mut self) -> Self {
        self.options.fail_finalize = true;
        self
    }

    /// 设置收尾工作线程的人为延迟（用于超时/取消测试）
    pub fn finalize_delay(mut self, delay: Duration) -> Self {
        self.options.finalize_delay = delay;
        self
    }

    /// 完成回调交付失败结果（模拟引擎侧计算失败）
    pub fn complete_with_failure(mut self) -> Self {
        self.options.complete_with_failure = true;
        self
    }

    /// 获取调用日志快照
    pub fn call_log(&self) -> CallLog {
        self.lock_log().clone()
    }

    /// 当前存活的会话数
    pub fn live_sessions(&self) -> usize {
        self.lock_sessions().len()
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, MockSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, CallLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn report_progress(&self, session: &MockSession, current: u32, message: &str) {
        if session.progress_handle != NO_CALLBACK {
            self.registry.invoke_progress(
                session.progress_handle,
                &ProgressUpdate {
                    current,
                    total: 100,
                    message: message.to_string(),
                },
            );
        }
    }
}

impl DrEngine for MockEngine {
    fn session_create(
        &self,
        channels: u32,
        sample_rate: u32,
        bits_per_sample: u32,
        progress_handle: CallbackHandle,
        completion_handle: CallbackHandle,
    ) -> TaskId {
        // 边界检查（与原FFI层一致的状态码）
        if channels == 0 || sample_rate == 0 {
            return status::INVALID_SESSION;
        }
        if channels > 2 {
            return status::CHANNEL_LIMIT;
        }
        if completion_handle == NO_CALLBACK || !self.registry.has_completion(completion_handle) {
            return status::INVALID_ARGUMENT;
        }
        if progress_handle != NO_CALLBACK && !self.registry.has_progress(progress_handle) {
            return status::INVALID_ARGUMENT;
        }
        if self.options.fail_create {
            return status::INVALID_SESSION;
        }

        let task = self.next_task.fetch_add(1, Ordering::SeqCst);
        let session = MockSession {
            channels,
            sample_rate,
            bits_per_sample,
            progress_handle,
            completion_handle,
            stats: vec![ChannelStats::default(); channels as usize],
            total_samples: 0,
            feed_calls: 0,
        };
        self.lock_sessions().insert(task, session);
        self.lock_log().created.push(task);
        task
    }

    fn session_feed(&self, task: TaskId, samples: &[f32]) -> i32 {
        if task <= 0 || samples.is_empty() {
            return status::INVALID_ARGUMENT;
        }

        let mut sessions = self.lock_sessions();
        let Some(session) = sessions.get_mut(&task) else {
            return status::INVALID_SESSION;
        };

        if let Some(nth) = self.options.fail_feed_at
            && session.feed_calls + 1 >= nth
        {
            return status::FEED_FAILED;
        }

        session.accumulate(samples);
        self.lock_log().feeds.push((task, samples.to_vec()));

        // 进度通知：数据阶段占0-75%，收尾保留剩余区间
        let current = (session.feed_calls as u32).min(75);
        let message = format!("流式处理中... ({} 批)", session.feed_calls);
        let progress_handle = session.progress_handle;
        drop(sessions);

        if progress_handle != NO_CALLBACK {
            self.registry.invoke_progress(
                progress_handle,
                &ProgressUpdate {
                    current,
                    total: 100,
                    message,
                },
            );
        }
        status::OK
    }

    fn session_finalize(&self, task: TaskId) -> i32 {
        if task <= 0 {
            return status::INVALID_SESSION;
        }

        let Some(session) = self.lock_sessions().remove(&task) else {
            return status::INVALID_SESSION;
        };
        self.lock_log().finalized.push(task);

        if self.options.fail_finalize {
            return status::INVALID_SESSION;
        }

        self.report_progress(&session, 90, "计算DR值...");

        // 收尾在引擎自有的工作线程上完成，结果经注册表异步交付
        let registry = Arc::clone(&self.registry);
        let delay = self.options.finalize_delay;
        let fail = self.options.complete_with_failure;
        thread::spawn(move || {
            if !delay.is_zero() {
                thread::sleep(delay);
            }

            let report = if fail {
                SessionReport {
                    success: false,
                    text: String::from("DR计算失败: 引擎内部错误"),
                    summary: None,
                }
            } else {
                let summary = summarize(&session);
                let text = format_report(&session, &summary);
                SessionReport {
                    success: true,
                    text,
                    summary: Some(summary),
                }
            };

            if session.progress_handle != NO_CALLBACK {
                registry.invoke_progress(
                    session.progress_handle,
                    &ProgressUpdate {
                        current: 100,
                        total: 100,
                        message: String::from("DR分析完成"),
                    },
                );
            }
            registry.invoke_completion(session.completion_handle, report);
        });

        status::OK
    }

    fn session_cancel(&self, task: TaskId) -> i32 {
        if task <= 0 {
            return status::INVALID_SESSION;
        }
        let removed = self.lock_sessions().remove(&task).is_some();
        self.lock_log().cancelled.push(task);
        if removed { status::OK } else { status::INVALID_SESSION }
    }

    fn session_free(&self, task: TaskId) {
        // 幂等：对已移除的会话安全
        self.lock_sessions().remove(&task);
        self.lock_log().freed.push(task);
    }
}

/// 线性值转dB
#[inline]
fn linear_to_db(value: f64) -> f64 {
    if value > 0.0 {
        20.0 * value.log10()
    } else {
        -f64::INFINITY
    }
}

/// 从累积统计构造结果载荷
fn summarize(session: &MockSession) -> DrSummary {
    let mut channel_dr = Vec::with_capacity(session.stats.len());
    let mut channel_peak_db = Vec::with_capacity(session.stats.len());
    let mut channel_rms_db = Vec::with_capacity(session.stats.len());

    let mut overall_peak = 0.0f64;
    let mut overall_sum_squares = 0.0f64;
    let mut overall_count = 0u64;

    for stat in &session.stats {
        let rms = if stat.count > 0 {
            (stat.sum_squares / stat.count as f64).sqrt()
        } else {
            0.0
        };
        let dr = if stat.peak > 0.0 && rms > 0.0 {
            -20.0 * (rms / stat.peak).log10()
        } else {
            0.0
        };
        channel_dr.push(dr);
        channel_peak_db.push(linear_to_db(stat.peak));
        channel_rms_db.push(linear_to_db(rms));

        if stat.peak > overall_peak {
            overall_peak = stat.peak;
        }
        overall_sum_squares += stat.sum_squares;
        overall_count += stat.count;
    }

    let precise_dr = if channel_dr.is_empty() {
        0.0
    } else {
        channel_dr.iter().sum::<f64>() / channel_dr.len() as f64
    };
    let overall_rms = if overall_count > 0 {
        (overall_sum_squares / overall_count as f64).sqrt()
    } else {
        0.0
    };

    DrSummary {
        official_dr: precise_dr.round() as i32,
        precise_dr,
        peak_db: linear_to_db(overall_peak),
        rms_db: linear_to_db(overall_rms),
        channel_dr,
        channel_peak_db,
        channel_rms_db,
        total_samples: session.total_samples,
    }
}

/// 格式化foobar2000兼容的结果文本
fn format_report(session: &MockSession, summary: &DrSummary) -> String {
    let separator = "-".repeat(80);
    let mut output = String::new();

    output.push_str("MacinMeter DR Host v0.1.0 / Dynamic Range Meter (foobar2000 compatible)\n");
    output.push_str(&format!(
        "log date: {}\n\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    output.push_str(&format!("{separator}\n"));
    output.push_str(&format!("Number of samples: {}\n", summary.total_samples));

    if session.sample_rate > 0 && session.channels > 0 {
        let seconds =
            summary.total_samples / (session.sample_rate as u64 * session.channels as u64);
        output.push_str(&format!("Duration: {}:{:02}\n", seconds / 60, seconds % 60));
    }
    output.push_str(&format!("{separator}\n\n"));

    // 声道DR表格（标准foobar2000排版）
    match summary.channel_dr.len() {
        1 => {
            output.push_str("                 Mono\n\n");
            output.push_str(&format!(
                "DR channel:      {:.2} dB\n",
                summary.channel_dr[0]
            ));
        }
        2 => {
            output.push_str("                 Left              Right\n\n");
            output.push_str(&format!(
                "DR channel:      {:.2} dB   ---     {:.2} dB\n",
                summary.channel_dr[0], summary.channel_dr[1]
            ));
        }
        _ => {
            for (i, dr) in summary.channel_dr.iter().enumerate() {
                output.push_str(&format!("DR channel {i}: {dr:.2} dB\n"));
            }
        }
    }
    output.push_str(&format!("{separator}\n\n"));

    output.push_str(&format!("Official DR Value: DR{}\n", summary.official_dr));
    output.push_str(&format!("Precise DR Value: {:.2} dB\n\n", summary.precise_dr));

    output.push_str(&format!("Samplerate:        {} Hz\n", session.sample_rate));
    output.push_str(&format!("Channels:          {}\n", session.channels));
    let bits = if session.bits_per_sample == 0 {
        24
    } else {
        session.bits_per_sample
    };
    output.push_str(&format!("Bits per sample:   {bits}\n"));
    output.push_str(&format!("{}\n", "=".repeat(80)));

    output
}
