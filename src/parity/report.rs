use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::check::ParityCheck;
use super::drift::{DriftStatus, DriftVerdict};
use crate::contract::{CanonicalMetric, EngineIdentity};

/// 一致性判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParityClassification {
    /// 所有檢查與漂移檢查都通過
    Equivalent,
    /// 有未通過的檢查，但全部被已記錄的偏差涵蓋
    DocumentedDeviation,
    /// 缺少數據而無法判定
    Inconclusive,
    /// 有無法解釋的差異
    Divergent,
}

impl ParityClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equivalent => "equivalent",
            Self::DocumentedDeviation => "documented_deviation",
            Self::Inconclusive => "inconclusive",
            Self::Divergent => "divergent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityVerdict {
    pub classification: ParityClassification,
    pub justification: String,
    /// 被引用的已記錄偏差
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deviation_ids: Vec<String>,
}

/// 已知且被接受的引擎差異（例如整股與零股成交）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentedDeviation {
    pub id: String,
    pub explanation: String,
    #[serde(default)]
    pub metrics: Vec<CanonicalMetric>,
    #[serde(default)]
    pub covers_drift: bool,
}

impl DocumentedDeviation {
    pub fn new(id: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            explanation: explanation.into(),
            metrics: Vec::new(),
            covers_drift: false,
        }
    }

    pub fn covering(mut self, metric: CanonicalMetric) -> Self {
        self.metrics.push(metric);
        self
    }

    pub fn covering_drift(mut self) -> Self {
        self.covers_drift = true;
        self
    }
}

/// 一個情境的一致性報告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityReport {
    pub scenario_id: String,
    pub engine_a: EngineIdentity,
    pub engine_b: EngineIdentity,
    pub config_hash_a: String,
    pub config_hash_b: String,
    pub checks: Vec<ParityCheck>,
    pub drift: DriftVerdict,
    /// 所有指標檢查皆通過（沒有任何檢查時為 false）
    pub overall_passed: bool,
    pub verdict: ParityVerdict,
    pub generated_at: DateTime<Utc>,
}

impl ParityReport {
    /// 閘門：只有等價或已記錄偏差才放行
    pub fn gate(&self) -> bool {
        matches!(
            self.verdict.classification,
            ParityClassification::Equivalent | ParityClassification::DocumentedDeviation
        )
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &ParityCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

pub(crate) fn overall_passed(checks: &[ParityCheck]) -> bool {
    !checks.is_empty() && checks.iter().all(|c| c.passed)
}

/// 依檢查結果與已記錄偏差給出判定
///
/// 順序：缺少數據 -> 無法解釋的失敗 -> 漂移被跳過 -> 已記錄偏差 -> 等價。
pub fn classify(
    checks: &[ParityCheck],
    drift: &DriftVerdict,
    deviations: &[DocumentedDeviation],
) -> ParityVerdict {
    let inconclusive = |justification: String| ParityVerdict {
        classification: ParityClassification::Inconclusive,
        justification,
        deviation_ids: Vec::new(),
    };

    if checks.is_empty() {
        return inconclusive("no metrics were compared".to_string());
    }
    let missing: Vec<&str> = checks
        .iter()
        .filter(|c| c.is_missing_data())
        .map(|c| c.metric_name.as_str())
        .collect();
    if !missing.is_empty() {
        return inconclusive(format!("missing data for: {}", missing.join(", ")));
    }

    let mut used: Vec<String> = Vec::new();
    let mut unexplained: Vec<String> = Vec::new();
    let mut cite = |deviation: &DocumentedDeviation| {
        if !used.contains(&deviation.id) {
            used.push(deviation.id.clone());
        }
    };

    for check in checks.iter().filter(|c| !c.passed) {
        let covering = check
            .metric()
            .and_then(|m| deviations.iter().find(|d| d.metrics.contains(&m)));
        match covering {
            Some(deviation) => cite(deviation),
            None => unexplained.push(check.metric_name.clone()),
        }
    }
    if drift.status == DriftStatus::Failed {
        match deviations.iter().find(|d| d.covers_drift) {
            Some(deviation) => cite(deviation),
            None => unexplained.push(format!("value_history drift ({})", drift.reason)),
        }
    }

    if !unexplained.is_empty() {
        return ParityVerdict {
            classification: ParityClassification::Divergent,
            justification: format!("unexplained differences: {}", unexplained.join(", ")),
            deviation_ids: used,
        };
    }
    if drift.is_skipped() {
        return inconclusive(format!("drift check skipped: {}", drift.reason));
    }
    if !used.is_empty() {
        return ParityVerdict {
            classification: ParityClassification::DocumentedDeviation,
            justification: format!("all differences covered by: {}", used.join(", ")),
            deviation_ids: used,
        };
    }
    ParityVerdict {
        classification: ParityClassification::Equivalent,
        justification: format!(
            "{} metric checks passed; drift: {}",
            checks.len(),
            drift.reason
        ),
        deviation_ids: Vec::new(),
    }
}
