use metrics::{counter, histogram};
use std::time::Duration;

use crate::batch::RecordStatus;
use crate::parity::ParityReport;

/// 監控指標命名空間
pub const METRIC_NAMESPACE: &str = "backtest_parity";

/// 批次執行指標記錄器
pub struct BatchMetrics;

impl BatchMetrics {
    /// 記錄一次嘗試及其耗時
    pub fn record_attempt(engine: &str, success: bool, elapsed: Duration) {
        let outcome = if success { "success" } else { "failure" };
        counter!(
            format!("{}.batch.attempts", METRIC_NAMESPACE),
            "engine" => engine.to_string(),
            "outcome" => outcome
        )
        .increment(1);

        histogram!(
            format!("{}.batch.attempt_latency_ms", METRIC_NAMESPACE),
            "engine" => engine.to_string()
        )
        .record(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn record_retry(engine: &str) {
        counter!(
            format!("{}.batch.retries", METRIC_NAMESPACE),
            "engine" => engine.to_string()
        )
        .increment(1);
    }

    /// 記錄請求的最終狀態
    pub fn record_outcome(engine: &str, status: RecordStatus) {
        let name = match status {
            RecordStatus::Succeeded => "successes",
            RecordStatus::Rejected => "rejections",
            RecordStatus::Failed => "failures",
            RecordStatus::RetryExhausted => "exhaustions",
        };
        counter!(
            format!("{}.batch.{}", METRIC_NAMESPACE, name),
            "engine" => engine.to_string()
        )
        .increment(1);
    }
}

/// 一致性驗證指標記錄器
pub struct ParityMetrics;

impl ParityMetrics {
    pub fn record_report(report: &ParityReport) {
        counter!(
            format!("{}.parity.reports", METRIC_NAMESPACE),
            "classification" => report.verdict.classification.as_str()
        )
        .increment(1);

        let failed = report.failed_checks().count() as u64;
        if failed > 0 {
            counter!(format!("{}.parity.failed_checks", METRIC_NAMESPACE)).increment(failed);
        }

        if let Some(stats) = &report.drift.statistics {
            histogram!(format!("{}.parity.max_relative_error", METRIC_NAMESPACE))
                .record(stats.max_relative_error);
        }
    }
}
