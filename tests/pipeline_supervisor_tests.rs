//! 会话管线集成测试
//!
//! 用进程内参考引擎驱动完整的监督器路径：
//! 流式喂数、收尾等待、取消、超时和资源清理。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use macinmeter_dr_host::engine::{CallbackRegistry, MockEngine};
use macinmeter_dr_host::error::{self, HostError, HostResult};
use macinmeter_dr_host::pipeline::{CancelToken, SessionSupervisor};
use macinmeter_dr_host::source::{DecodeSource, MemorySource, StreamInfo};
use macinmeter_dr_host::tools::HostConfig;

// ==================== 测试工具 ====================

/// 快速轮询的测试配置
fn test_config() -> HostConfig {
    HostConfig {
        poll_interval: Duration::from_millis(20),
        ..HostConfig::default()
    }
}

fn setup(config: HostConfig) -> (Arc<CallbackRegistry>, Arc<MockEngine>, SessionSupervisor) {
    let registry = Arc::new(CallbackRegistry::new());
    let engine = Arc::new(MockEngine::new(Arc::clone(&registry)));
    let supervisor = SessionSupervisor::new(
        Arc::clone(&engine) as Arc<dyn macinmeter_dr_host::DrEngine>,
        Arc::clone(&registry),
        config,
    )
    .unwrap();
    (registry, engine, supervisor)
}

fn setup_with_engine(
    registry: Arc<CallbackRegistry>,
    engine: Arc<MockEngine>,
    config: HostConfig,
) -> SessionSupervisor {
    SessionSupervisor::new(
        engine as Arc<dyn macinmeter_dr_host::DrEngine>,
        registry,
        config,
    )
    .unwrap()
}

/// 生成正弦样的测试信号（避免全零信号的退化统计）
fn test_samples(count: usize) -> Vec<f32> {
    (0..count)
        .map(|i| (i as f32 * 0.01).sin() * 0.5)
        .collect()
}

/// 推送若干chunk后报告解码失败的源
struct FailingSource {
    chunks_before_failure: usize,
}

impl DecodeSource for FailingSource {
    fn display_name(&self) -> Option<String> {
        Some(String::from("corrupt.flac"))
    }

    fn stream(
        &mut self,
        _cancel: &CancelToken,
        on_chunk: &mut dyn FnMut(&[f32], bool, Option<&StreamInfo>) -> bool,
    ) -> HostResult<()> {
        let info = StreamInfo::new(2, 44100, 16, 60.0);
        let chunk = vec![0.1f32; 512];
        for i in 0..self.chunks_before_failure {
            let first = i == 0;
            let info_ref = if first { Some(&info) } else { None };
            if !on_chunk(&chunk, first, info_ref) {
                return Ok(());
            }
        }
        Err(error::decode_error("比特流损坏", "无法继续解码"))
    }
}

// ==================== 端到端成功路径 ====================

#[test]
fn test_analyze_stereo_end_to_end() {
    let (registry, engine, supervisor) = setup(test_config());

    let info = StreamInfo::new(2, 44100, 16, 10.0);
    let samples = test_samples(44100 * 2);
    let mut source = MemorySource::new(samples.clone(), info).with_name("track.flac");

    let report = supervisor
        .analyze(&mut source, &CancelToken::new(), None)
        .unwrap();

    assert!(report.success);
    assert!(report.text.contains("Official DR Value"));
    let summary = report.summary.unwrap();
    assert_eq!(summary.total_samples, samples.len() as u64);
    assert_eq!(summary.channel_dr.len(), 2);

    // 资源清理：引擎无存活会话，注册表无残留注册
    assert_eq!(engine.live_sessions(), 0);
    assert_eq!(registry.live_registrations(), 0);
    println!("✓ 立体声端到端分析通过");
}

#[test]
fn test_small_file_single_flush() {
    let (_registry, engine, supervisor) = setup(test_config());

    // 远小于批容量的文件：恰好一次feed（末尾余量flush）
    let info = StreamInfo::new(1, 44100, 16, 0.1);
    let mut source = MemorySource::new(test_samples(5000), info);

    supervisor
        .analyze(&mut source, &CancelToken::new(), None)
        .unwrap();

    let log = engine.call_log();
    assert_eq!(log.feeds.len(), 1);
    assert_eq!(log.feeds[0].1.len(), 5000);
    println!("✓ 小文件单次flush通过");
}

#[test]
fn test_batching_invariant_to_chunk_size() {
    // 同一信号以不同chunk粒度流入：引擎收到的样本序列必须一致，
    // 且除末批外每批都达到容量阈值
    let config = HostConfig {
        batch_capacity: 1000,
        poll_interval: Duration::from_millis(20),
        ..HostConfig::default()
    };
    let samples = test_samples(5500);
    let mut fed_sequences = Vec::new();

    for chunk_size in [64, 333, 1000, 4096] {
        let (_registry, engine, supervisor) = setup(config.clone());
        let info = StreamInfo::new(1, 44100, 16, 0.1);
        let mut source =
            MemorySource::new(samples.clone(), info).with_chunk_samples(chunk_size);

        supervisor
            .analyze(&mut source, &CancelToken::new(), None)
            .unwrap();

        let log = engine.call_log();
        let task = log.created[0];
        for (i, (_, batch)) in log.feeds.iter().enumerate() {
            if i + 1 < log.feeds.len() {
                assert!(
                    batch.len() >= 1000,
                    "非末批必须达到容量阈值: chunk={chunk_size}, batch={}",
                    batch.len()
                );
            }
        }
        fed_sequences.push(log.fed_samples(task));
    }

    for sequence in &fed_sequences[1..] {
        assert_eq!(sequence, &fed_sequences[0], "chunk粒度不应影响交付序列");
    }
    println!("✓ 批处理对chunk粒度不变通过");
}

#[test]
fn test_progress_forwarded_and_snapshot_kept() {
    let (_registry, _engine, supervisor) = setup(HostConfig {
        batch_capacity: 500,
        poll_interval: Duration::from_millis(20),
        ..HostConfig::default()
    });

    let updates = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&updates);

    let info = StreamInfo::new(1, 44100, 16, 1.0);
    let mut source = MemorySource::new(test_samples(5000), info);
    supervisor
        .analyze(
            &mut source,
            &CancelToken::new(),
            Some(Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();

    assert!(updates.load(Ordering::SeqCst) > 0, "外部进度回调应被转发");
    let snapshot = supervisor.latest_progress().unwrap();
    assert_eq!(snapshot.current, 100, "最终进度应为100%");
    println!("✓ 进度转发与快照通过");
}

// ==================== 拒绝与失败路径 ====================

#[test]
fn test_multichannel_rejected_before_engine() {
    let (registry, engine, supervisor) = setup(test_config());

    // 5.1声道：在任何数据跨越引擎边界前拒绝
    let info = StreamInfo::new(6, 48000, 24, 300.0);
    let mut source = MemorySource::new(test_samples(6000), info);

    let result = supervisor.analyze(&mut source, &CancelToken::new(), None);
    assert!(matches!(result, Err(HostError::InvalidFormat(_))));

    let log = engine.call_log();
    assert!(log.created.is_empty(), "引擎不应收到会话创建调用");
    assert!(log.feeds.is_empty());
    assert_eq!(registry.live_registrations(), 0);
    println!("✓ 多声道前置拒绝通过");
}

#[test]
fn test_empty_source_is_decode_error() {
    let (registry, engine, supervisor) = setup(test_config());

    let info = StreamInfo::new(2, 44100, 16, 0.0);
    let mut source = MemorySource::new(Vec::new(), info);

    let result = supervisor.analyze(&mut source, &CancelToken::new(), None);
    assert!(matches!(result, Err(HostError::Decode(_))));
    assert!(engine.call_log().created.is_empty());
    assert_eq!(registry.live_registrations(), 0);
    println!("✓ 空源解码错误通过");
}

#[test]
fn test_decode_failure_mid_stream_cleans_up() {
    let (registry, engine, supervisor) = setup(test_config());

    let mut source = FailingSource {
        chunks_before_failure: 3,
    };
    let result = supervisor.analyze(&mut source, &CancelToken::new(), None);
    assert!(matches!(result, Err(HostError::Decode(_))));

    // 已创建的会话经Drop兜底释放
    let log = engine.call_log();
    assert_eq!(log.created.len(), 1);
    assert_eq!(log.free_count(log.created[0]), 1);
    assert_eq!(engine.live_sessions(), 0);
    assert_eq!(registry.live_registrations(), 0);
    println!("✓ 中途解码失败清理通过");
}

#[test]
fn test_feed_failure_maps_and_cleans_up() {
    let registry = Arc::new(CallbackRegistry::new());
    let engine = Arc::new(MockEngine::new(Arc::clone(&registry)).fail_feed_at(1));
    let supervisor = setup_with_engine(
        Arc::clone(&registry),
        Arc::clone(&engine),
        HostConfig {
            batch_capacity: 1000,
            poll_interval: Duration::from_millis(20),
            ..HostConfig::default()
        },
    );

    let info = StreamInfo::new(2, 44100, 16, 10.0);
    let mut source = MemorySource::new(test_samples(4000), info);

    let result = supervisor.analyze(&mut source, &CancelToken::new(), None);
    assert!(matches!(result, Err(HostError::Feed(_))));
    assert_eq!(engine.live_sessions(), 0);
    assert_eq!(registry.live_registrations(), 0);
    println!("✓ feed失败映射与清理通过");
}

#[test]
fn test_engine_computation_failure_returned_as_report() {
    let registry = Arc::new(CallbackRegistry::new());
    let engine = Arc::new(MockEngine::new(Arc::clone(&registry)).complete_with_failure());
    let supervisor =
        setup_with_engine(Arc::clone(&registry), Arc::clone(&engine), test_config());

    let info = StreamInfo::new(1, 44100, 16, 1.0);
    let mut source = MemorySource::new(test_samples(1000), info);

    // 引擎侧计算失败不是宿主错误：报告原样返回，由调用方判定
    let report = supervisor
        .analyze(&mut source, &CancelToken::new(), None)
        .unwrap();
    assert!(!report.success);
    assert!(report.summary.is_none());
    assert_eq!(registry.live_registrations(), 0);
    println!("✓ 引擎计算失败报告通过");
}

// ==================== 取消与超时 ====================

#[test]
fn test_cancel_during_wait_loop() {
    let registry = Arc::new(CallbackRegistry::new());
    let engine = Arc::new(
        MockEngine::new(Arc::clone(&registry)).finalize_delay(Duration::from_secs(10)),
    );
    let supervisor =
        setup_with_engine(Arc::clone(&registry), Arc::clone(&engine), test_config());

    let cancel = CancelToken::new();
    let canceller = cancel.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        canceller.cancel();
    });

    let info = StreamInfo::new(2, 44100, 16, 60.0);
    let mut source = MemorySource::new(test_samples(8000), info);

    let start = Instant::now();
    let result = supervisor.analyze(&mut source, &cancel, None);
    handle.join().unwrap();

    assert!(matches!(result, Err(HostError::Cancelled)));
    assert!(
        start.elapsed() < Duration::from_secs(5),
        "取消应远早于引擎收尾延迟返回"
    );
    assert_eq!(registry.live_registrations(), 0);
    println!("✓ 等待循环取消通过");
}

#[test]
fn test_cancel_before_stream_starts() {
    let (registry, engine, supervisor) = setup(test_config());

    let cancel = CancelToken::new();
    cancel.cancel();

    let info = StreamInfo::new(2, 44100, 16, 10.0);
    let mut source = MemorySource::new(test_samples(8000), info);

    let result = supervisor.analyze(&mut source, &cancel, None);
    assert!(matches!(result, Err(HostError::Cancelled)));
    assert!(engine.call_log().created.is_empty());
    assert_eq!(registry.live_registrations(), 0);
    println!("✓ 流前取消通过");
}

#[test]
fn test_adaptive_timeout_fires_and_cleans_up() {
    let registry = Arc::new(CallbackRegistry::new());
    let engine = Arc::new(
        MockEngine::new(Arc::clone(&registry)).finalize_delay(Duration::from_secs(30)),
    );
    // 把超时区间压到1秒，让真实超时路径在测试时间内触发
    let config = HostConfig {
        poll_interval: Duration::from_millis(20),
        base_timeout_secs: 0.0,
        min_timeout_secs: 1.0,
        max_timeout_secs: 1.0,
        ..HostConfig::default()
    };
    let supervisor = setup_with_engine(Arc::clone(&registry), Arc::clone(&engine), config);

    let info = StreamInfo::new(1, 44100, 16, 1.0);
    let mut source = MemorySource::new(test_samples(1000), info);

    let start = Instant::now();
    let result = supervisor.analyze(&mut source, &CancelToken::new(), None);

    assert!(matches!(result, Err(HostError::Timeout { limit_secs: 1 })));
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(engine.live_sessions(), 0);
    assert_eq!(registry.live_registrations(), 0);
    println!("✓ 自适应超时触发与清理通过");
}

#[test]
fn test_completion_after_timeout_is_noop() {
    // 超时注销后迟到的完成回调必须静默丢弃
    let registry = Arc::new(CallbackRegistry::new());
    let engine = Arc::new(
        MockEngine::new(Arc::clone(&registry)).finalize_delay(Duration::from_secs(2)),
    );
    let config = HostConfig {
        poll_interval: Duration::from_millis(20),
        base_timeout_secs: 0.0,
        min_timeout_secs: 1.0,
        max_timeout_secs: 1.0,
        ..HostConfig::default()
    };
    let supervisor = setup_with_engine(Arc::clone(&registry), Arc::clone(&engine), config);

    let info = StreamInfo::new(1, 44100, 16, 1.0);
    let mut source = MemorySource::new(test_samples(1000), info);
    let result = supervisor.analyze(&mut source, &CancelToken::new(), None);
    assert!(matches!(result, Err(HostError::Timeout { .. })));

    // 等引擎工作线程醒来并尝试交付：注销过的句柄是no-op，不panic
    thread::sleep(Duration::from_millis(1500));
    assert_eq!(registry.live_registrations(), 0);
    println!("✓ 超时后迟到完成no-op通过");
}

#[test]
fn test_sequential_sessions_reuse_supervisor() {
    let (registry, engine, supervisor) = setup(test_config());

    for i in 0..3 {
        let info = StreamInfo::new(2, 44100, 16, 1.0);
        let mut source =
            MemorySource::new(test_samples(2000), info).with_name(format!("track_{i}.flac"));
        let report = supervisor
            .analyze(&mut source, &CancelToken::new(), None)
            .unwrap();
        assert!(report.success);
    }

    let log = engine.call_log();
    assert_eq!(log.created.len(), 3);
    // 任务ID互不相同
    let mut ids = log.created.clone();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert_eq!(registry.live_registrations(), 0);
    println!("✓ 监督器顺序复用通过");
}
