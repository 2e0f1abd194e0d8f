use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapter::AdapterError;
use crate::contract::{BacktestRunResult, EngineIdentity};
use crate::parity::ParityReport;

/// 單次嘗試失敗的分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    UnknownStrategy,
    EngineExecution,
    Schema,
    Timeout,
    /// 執行任務異常終止
    Aborted,
}

impl FailureKind {
    pub fn from_error(error: &AdapterError) -> Self {
        match error {
            AdapterError::Validation(_) => FailureKind::Validation,
            AdapterError::UnknownStrategy { .. } => FailureKind::UnknownStrategy,
            AdapterError::EngineExecution { .. } => FailureKind::EngineExecution,
            AdapterError::Schema(_) => FailureKind::Schema,
        }
    }

    /// 只有引擎執行失敗與逾時值得重試
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::EngineExecution | FailureKind::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::UnknownStrategy => "unknown_strategy",
            FailureKind::EngineExecution => "engine_execution",
            FailureKind::Schema => "schema",
            FailureKind::Timeout => "timeout",
            FailureKind::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptFailure {
    /// 從 1 起算
    pub attempt: u32,
    pub kind: FailureKind,
    pub reason: String,
    pub elapsed_ms: u64,
}

/// 請求的最終狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Succeeded,
    /// 不可重試的失敗（驗證、未知策略、結構描述）
    Rejected,
    /// 可重試的失敗，但此批次未啟用重試
    Failed,
    /// 用盡所有重試仍失敗
    RetryExhausted,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Succeeded => "succeeded",
            RecordStatus::Rejected => "rejected",
            RecordStatus::Failed => "failed",
            RecordStatus::RetryExhausted => "retry_exhausted",
        }
    }
}

/// 執行觀測資料
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunObservation {
    pub engine: EngineIdentity,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempt_elapsed_ms: Vec<u64>,
    pub total_elapsed_ms: u64,
}

/// 批次中一個請求的完整紀錄
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRunRecord {
    /// 請求在批次中的位置
    pub index: usize,
    pub status: RecordStatus,
    pub result: Option<BacktestRunResult>,
    pub attempt_count: u32,
    pub final_attempt_success: bool,
    pub failures: Vec<AttemptFailure>,
    pub observation: RunObservation,
}

impl BatchRunRecord {
    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Succeeded
    }

    pub fn failure_reasons(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.reason.as_str()).collect()
    }

    pub fn last_failure(&self) -> Option<&AttemptFailure> {
        self.failures.last()
    }

    /// 任務在產生紀錄前就終止時使用
    pub(crate) fn aborted(index: usize, engine: EngineIdentity, reason: String) -> Self {
        let now = Utc::now();
        Self {
            index,
            status: RecordStatus::Failed,
            result: None,
            attempt_count: 1,
            final_attempt_success: false,
            failures: vec![AttemptFailure {
                attempt: 1,
                kind: FailureKind::Aborted,
                reason,
                elapsed_ms: 0,
            }],
            observation: RunObservation {
                engine,
                started_at: now,
                finished_at: now,
                attempt_elapsed_ms: vec![0],
                total_elapsed_ms: 0,
            },
        }
    }
}

/// 批次彙總
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub rejected: usize,
    pub failed: usize,
    pub retry_exhausted: usize,
    pub total_attempts: u64,
    /// 至少重試過一次的請求數
    pub retried_requests: usize,
}

impl BatchSummary {
    pub fn from_records(records: &[BatchRunRecord]) -> Self {
        let mut summary = BatchSummary {
            total: records.len(),
            ..Default::default()
        };
        for record in records {
            match record.status {
                RecordStatus::Succeeded => summary.succeeded += 1,
                RecordStatus::Rejected => summary.rejected += 1,
                RecordStatus::Failed => summary.failed += 1,
                RecordStatus::RetryExhausted => summary.retry_exhausted += 1,
            }
            summary.total_attempts += u64::from(record.attempt_count);
            if record.attempt_count > 1 {
                summary.retried_requests += 1;
            }
        }
        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }
}

/// 成對執行的紀錄；兩側都成功時附上一致性報告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedRunRecord {
    pub index: usize,
    pub record_a: BatchRunRecord,
    pub record_b: BatchRunRecord,
    pub parity: Option<ParityReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ValidationError;

    fn record(index: usize, status: RecordStatus, attempts: u32) -> BatchRunRecord {
        let mut record = BatchRunRecord::aborted(index, EngineIdentity::new("e", "1.0.0"), "x".into());
        record.status = status;
        record.attempt_count = attempts;
        record
    }

    #[test]
    fn test_failure_kind_from_error() {
        let err = AdapterError::engine_execution("e", "數據缺口");
        assert_eq!(FailureKind::from_error(&err), FailureKind::EngineExecution);
        assert!(FailureKind::from_error(&err).is_retryable());

        let err = AdapterError::from(ValidationError::MissingField {
            field: "symbols".into(),
        });
        assert_eq!(FailureKind::from_error(&err), FailureKind::Validation);
        assert!(!FailureKind::from_error(&err).is_retryable());
        assert!(FailureKind::Timeout.is_retryable());
    }

    #[test]
    fn test_summary_counts_statuses() {
        let records = vec![
            record(0, RecordStatus::Succeeded, 1),
            record(1, RecordStatus::Succeeded, 3),
            record(2, RecordStatus::Rejected, 1),
            record(3, RecordStatus::RetryExhausted, 3),
        ];
        let summary = BatchSummary::from_records(&records);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.retry_exhausted, 1);
        assert_eq!(summary.total_attempts, 8);
        assert_eq!(summary.retried_requests, 2);
        assert!(!summary.all_succeeded());
    }
}
