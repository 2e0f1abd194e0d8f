use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, info_span, warn, Instrument};

use super::policy::BatchSettings;
use super::record::{
    AttemptFailure, BatchRunRecord, FailureKind, PairedRunRecord, RecordStatus, RunObservation,
};
use crate::adapter::EngineAdapter;
use crate::contract::{BacktestRunRequest, BacktestRunResult};
use crate::monitor::metrics::BatchMetrics;
use crate::parity::ParityHarness;

/// 批次執行器
///
/// 不同請求之間並行執行（上限為 `max_concurrency`），同一請求的重試嚴格依序進行。
/// 輸出紀錄一律依請求索引排序。
#[derive(Debug, Clone, Default)]
pub struct BatchExecutor {
    settings: BatchSettings,
}

impl BatchExecutor {
    pub fn new(settings: BatchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// 以單一適配器執行整個批次
    pub async fn execute(
        &self,
        adapter: Arc<dyn EngineAdapter>,
        requests: Vec<BacktestRunRequest>,
    ) -> Vec<BatchRunRecord> {
        info!(
            "開始批次執行: {} 個請求，引擎 {}，並行上限 {}",
            requests.len(),
            adapter.identity(),
            self.settings.max_concurrency
        );

        let mut records: Vec<BatchRunRecord> = stream::iter(requests.into_iter().enumerate())
            .map(|(index, request)| {
                let adapter = adapter.clone();
                let settings = self.settings.clone();
                async move {
                    let engine = adapter.identity().clone();
                    let handle = tokio::spawn(run_with_retry(index, adapter, request, settings));
                    match handle.await {
                        Ok(record) => record,
                        Err(e) => {
                            warn!("請求 {} 的執行任務異常終止: {}", index, e);
                            BatchRunRecord::aborted(index, engine, format!("執行任務異常終止: {}", e))
                        }
                    }
                }
            })
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;

        records.sort_by_key(|r| r.index);
        records
    }

    /// 每個請求同時交給兩個適配器，兩側都成功時產生一致性報告
    pub async fn execute_paired(
        &self,
        adapter_a: Arc<dyn EngineAdapter>,
        adapter_b: Arc<dyn EngineAdapter>,
        requests: Vec<BacktestRunRequest>,
        harness: &ParityHarness,
    ) -> Vec<PairedRunRecord> {
        info!(
            "開始成對批次執行: {} 個請求，{} 對 {}",
            requests.len(),
            adapter_a.identity(),
            adapter_b.identity()
        );

        let mut pairs: Vec<(BatchRunRecord, BatchRunRecord)> =
            stream::iter(requests.into_iter().enumerate())
                .map(|(index, request)| {
                    let adapter_a = adapter_a.clone();
                    let adapter_b = adapter_b.clone();
                    let settings = self.settings.clone();
                    async move {
                        let engine_a = adapter_a.identity().clone();
                        let engine_b = adapter_b.identity().clone();
                        let handle = tokio::spawn(async move {
                            futures::join!(
                                run_with_retry(index, adapter_a, request.clone(), settings.clone()),
                                run_with_retry(index, adapter_b, request, settings)
                            )
                        });
                        match handle.await {
                            Ok(pair) => pair,
                            Err(e) => {
                                warn!("請求 {} 的成對執行任務異常終止: {}", index, e);
                                let reason = format!("執行任務異常終止: {}", e);
                                (
                                    BatchRunRecord::aborted(index, engine_a, reason.clone()),
                                    BatchRunRecord::aborted(index, engine_b, reason),
                                )
                            }
                        }
                    }
                })
                .buffer_unordered(self.settings.max_concurrency.max(1))
                .collect()
                .await;

        pairs.sort_by_key(|(a, _)| a.index);
        pairs
            .into_iter()
            .map(|(record_a, record_b)| {
                let parity = match (&record_a.result, &record_b.result) {
                    (Some(a), Some(b)) => {
                        Some(harness.compare(&format!("request-{}", record_a.index), a, b))
                    }
                    _ => None,
                };
                PairedRunRecord {
                    index: record_a.index,
                    record_a,
                    record_b,
                    parity,
                }
            })
            .collect()
    }
}

/// 單一請求的執行單元，內含依序的重試迴圈
async fn run_with_retry(
    index: usize,
    adapter: Arc<dyn EngineAdapter>,
    request: BacktestRunRequest,
    settings: BatchSettings,
) -> BatchRunRecord {
    let engine = adapter.identity().clone();
    let span = info_span!(
        "batch_request",
        index,
        engine = %engine,
        strategy = %request.strategy_name()
    );

    async move {
        let started_at = Utc::now();
        let clock = Instant::now();
        let max_attempts = settings.retry.max_attempts();
        let mut failures: Vec<AttemptFailure> = Vec::new();
        let mut attempt_elapsed_ms: Vec<u64> = Vec::new();
        let mut attempt: u32 = 0;

        let (status, result) = loop {
            attempt += 1;
            let attempt_clock = Instant::now();
            let outcome = run_attempt(adapter.as_ref(), &request, attempt, settings.attempt_timeout).await;
            let elapsed = attempt_clock.elapsed();
            attempt_elapsed_ms.push(elapsed.as_millis() as u64);
            BatchMetrics::record_attempt(&engine.name, outcome.is_ok(), elapsed);

            match outcome {
                Ok(result) => break (RecordStatus::Succeeded, Some(result)),
                Err((kind, reason)) => {
                    failures.push(AttemptFailure {
                        attempt,
                        kind,
                        reason,
                        elapsed_ms: elapsed.as_millis() as u64,
                    });
                    if !kind.is_retryable() {
                        break (RecordStatus::Rejected, None);
                    }
                    if !settings.retry.retry_failed {
                        break (RecordStatus::Failed, None);
                    }
                    if attempt >= max_attempts {
                        break (RecordStatus::RetryExhausted, None);
                    }

                    let delay = settings.retry.delay_before_retry(attempt);
                    BatchMetrics::record_retry(&engine.name);
                    debug!("第 {} 次嘗試失敗，{:?} 後重試", attempt, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        };

        BatchMetrics::record_outcome(&engine.name, status);
        let final_attempt_success = status == RecordStatus::Succeeded;
        match status {
            RecordStatus::Succeeded => info!("請求完成，共 {} 次嘗試", attempt),
            _ => warn!(
                "請求以 {} 結束，共 {} 次嘗試，最後原因: {}",
                status.as_str(),
                attempt,
                failures.last().map(|f| f.reason.as_str()).unwrap_or("")
            ),
        }

        BatchRunRecord {
            index,
            status,
            result,
            attempt_count: attempt,
            final_attempt_success,
            failures,
            observation: RunObservation {
                engine: engine.clone(),
                started_at,
                finished_at: Utc::now(),
                attempt_elapsed_ms,
                total_elapsed_ms: clock.elapsed().as_millis() as u64,
            },
        }
    }
    .instrument(span)
    .await
}

async fn run_attempt(
    adapter: &dyn EngineAdapter,
    request: &BacktestRunRequest,
    attempt: u32,
    timeout: Option<Duration>,
) -> Result<BacktestRunResult, (FailureKind, String)> {
    let span = info_span!("batch_attempt", attempt);
    async move {
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, adapter.run(request)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err((
                        FailureKind::Timeout,
                        format!("嘗試超過 {:?} 未完成", limit),
                    ))
                }
            },
            None => adapter.run(request).await,
        };
        outcome.map_err(|e| (FailureKind::from_error(&e), e.to_string()))
    }
    .instrument(span)
    .await
}
