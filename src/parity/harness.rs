use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn, Instrument};

use super::check::compare_metrics;
use super::drift::check_drift;
use super::error::{ParityError, ParityResult, Side};
use super::report::{classify, overall_passed, DocumentedDeviation, ParityClassification, ParityReport};
use super::tolerance::ParityTolerances;
use crate::adapter::{AdapterError, EngineAdapter};
use crate::contract::{BacktestRunRequest, BacktestRunResult};
use crate::monitor::metrics::ParityMetrics;

/// 一個比較情境：同一個請求交給兩個引擎
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityScenario {
    pub id: String,
    pub request: BacktestRunRequest,
}

impl ParityScenario {
    pub fn new(id: impl Into<String>, request: BacktestRunRequest) -> Self {
        Self {
            id: id.into(),
            request,
        }
    }
}

/// 一致性驗證器
#[derive(Debug, Clone, Default)]
pub struct ParityHarness {
    tolerances: ParityTolerances,
    deviations: Vec<DocumentedDeviation>,
}

impl ParityHarness {
    pub fn new(tolerances: ParityTolerances) -> Self {
        Self {
            tolerances,
            deviations: Vec::new(),
        }
    }

    pub fn with_deviation(mut self, deviation: DocumentedDeviation) -> Self {
        self.deviations.push(deviation);
        self
    }

    pub fn tolerances(&self) -> &ParityTolerances {
        &self.tolerances
    }

    pub fn deviations(&self) -> &[DocumentedDeviation] {
        &self.deviations
    }

    /// 比較兩個已存在的結果
    pub fn compare(
        &self,
        scenario_id: &str,
        result_a: &BacktestRunResult,
        result_b: &BacktestRunResult,
    ) -> ParityReport {
        if result_a.metadata.config_hash == result_b.metadata.config_hash {
            warn!("情境 {} 兩側的設定雜湊相同，可能是同一個引擎", scenario_id);
        }

        let checks = compare_metrics(&result_a.metrics, &result_b.metrics, &self.tolerances);
        let drift = check_drift(
            result_a.value_history.as_deref(),
            result_b.value_history.as_deref(),
            &self.tolerances.drift,
        );
        let verdict = classify(&checks, &drift, &self.deviations);

        let report = ParityReport {
            scenario_id: scenario_id.to_string(),
            engine_a: result_a.metadata.engine(),
            engine_b: result_b.metadata.engine(),
            config_hash_a: result_a.metadata.config_hash.clone(),
            config_hash_b: result_b.metadata.config_hash.clone(),
            overall_passed: overall_passed(&checks),
            checks,
            drift,
            verdict,
            generated_at: Utc::now(),
        };

        ParityMetrics::record_report(&report);
        match report.verdict.classification {
            ParityClassification::Equivalent | ParityClassification::DocumentedDeviation => info!(
                "情境 {} 判定為 {}: {}",
                scenario_id,
                report.verdict.classification.as_str(),
                report.verdict.justification
            ),
            _ => warn!(
                "情境 {} 判定為 {}: {}",
                scenario_id,
                report.verdict.classification.as_str(),
                report.verdict.justification
            ),
        }
        report
    }

    /// 同時執行兩側並比較
    pub async fn run_scenario(
        &self,
        scenario: &ParityScenario,
        adapter_a: &dyn EngineAdapter,
        adapter_b: &dyn EngineAdapter,
    ) -> ParityResult<ParityReport> {
        let span = info_span!(
            "parity_scenario",
            scenario = %scenario.id,
            engine_a = %adapter_a.identity(),
            engine_b = %adapter_b.identity()
        );
        async {
            let (a, b) = futures::join!(
                adapter_a.run(&scenario.request),
                adapter_b.run(&scenario.request)
            );
            let result_a = a.map_err(|e| side_failed(scenario, Side::A, adapter_a, e))?;
            let result_b = b.map_err(|e| side_failed(scenario, Side::B, adapter_b, e))?;
            Ok::<_, ParityError>(self.compare(&scenario.id, &result_a, &result_b))
        }
        .instrument(span)
        .await
    }

    /// 依序執行多個情境；任一側失敗的情境以錯誤返回，不影響其他情境
    pub async fn run_scenarios(
        &self,
        scenarios: &[ParityScenario],
        adapter_a: &dyn EngineAdapter,
        adapter_b: &dyn EngineAdapter,
    ) -> Vec<ParityResult<ParityReport>> {
        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            reports.push(self.run_scenario(scenario, adapter_a, adapter_b).await);
        }
        reports
    }
}

fn side_failed(
    scenario: &ParityScenario,
    side: Side,
    adapter: &dyn EngineAdapter,
    source: AdapterError,
) -> ParityError {
    ParityError::SideFailed {
        scenario_id: scenario.id.clone(),
        side,
        engine: adapter.identity().to_string(),
        source,
    }
}
