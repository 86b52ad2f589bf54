//! 批量报告格式化
//!
//! 把批量分析结果拼装成单份合并文本报告：批次头、逐文件正文、
//! 失败清单、统计摘要和耗时尾注。单文件报告正文由引擎交付，
//! 本模块只负责批次级的拼装。

use std::time::Duration;

use crate::tools::constants::display::SEPARATOR_WIDTH;
use crate::tools::controller::BatchReport;

/// 格式化耗时为人类可读形式
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    if total_secs >= 60 {
        format!("{}分{}秒", total_secs / 60, total_secs % 60)
    } else {
        format!("{:.1}秒", elapsed.as_secs_f64())
    }
}

/// 批次报告头（含日志日期）
pub fn batch_header(total_files: usize) -> String {
    let separator = "=".repeat(SEPARATOR_WIDTH);
    format!(
        "{separator}\nMacinMeter DR Host - 批量分析报告\nlog date: {}\n文件总数: {total_files}\n{separator}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

/// 单个失败文件的记录行
pub fn failed_line(file_name: &str, error: &str) -> String {
    format!("[FAIL] {file_name}: {error}")
}

/// 耗时尾注（合并报告末尾）
pub fn elapsed_footer(elapsed: Duration) -> String {
    let separator = "=".repeat(SEPARATOR_WIDTH);
    format!(
        "{separator}\n分析耗时: {}\n{separator}\n",
        format_elapsed(elapsed)
    )
}

/// 拼装批次合并报告
///
/// 成功文件按顺序附上引擎报告正文；失败文件汇总到失败清单。
pub fn combined_report(report: &BatchReport) -> String {
    let separator = "-".repeat(SEPARATOR_WIDTH);
    let mut output = batch_header(report.results.len());
    output.push('\n');

    for result in &report.results {
        if result.success {
            if let Some(session_report) = &result.report {
                output.push_str(&session_report.text);
                output.push('\n');
            }
        }
    }

    let failed: Vec<_> = report.results.iter().filter(|r| !r.success).collect();
    if !failed.is_empty() {
        output.push_str(&format!("{separator}\n失败文件清单:\n"));
        for result in &failed {
            let error = result.error.as_deref().unwrap_or("未知错误");
            output.push_str(&failed_line(&result.file_name, error));
            output.push('\n');
        }
        output.push_str(&format!("{separator}\n\n"));
    }

    output.push_str(&format!(
        "处理成功: {} 个文件，失败: {} 个文件\n",
        report.processed_count, report.failed_count
    ));
    let stats_line = report.error_stats.summary_line();
    if !stats_line.is_empty() {
        output.push_str(&format!("错误分类: {stats_line}\n"));
    }
    output.push('\n');
    output.push_str(&elapsed_footer(report.total_elapsed));
    output
}
