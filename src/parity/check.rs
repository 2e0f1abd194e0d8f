use serde::{Deserialize, Serialize};

use super::tolerance::{ComparisonKind, MetricTolerance, ParityTolerances};
use crate::contract::{CanonicalMetric, MetricSet};

/// 單一指標的比較結果
///
/// 未通過的檢查不是錯誤，而是報告的一部分。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityCheck {
    pub metric_name: String,
    pub value_a: Option<f64>,
    pub value_b: Option<f64>,
    /// 任一側缺少數值時為 None
    pub difference: Option<f64>,
    pub threshold: f64,
    pub kind: ComparisonKind,
    pub passed: bool,
    pub message: String,
}

impl ParityCheck {
    pub fn evaluate(
        metric: CanonicalMetric,
        value_a: Option<f64>,
        value_b: Option<f64>,
        tolerance: MetricTolerance,
    ) -> Self {
        let usable = |v: Option<f64>| v.filter(|x| x.is_finite());
        let (difference, passed, message) = match (usable(value_a), usable(value_b)) {
            (Some(a), Some(b)) => {
                let diff = tolerance.difference(a, b);
                let passed = tolerance.accepts(diff);
                let verb = if passed { "within" } else { "exceeds" };
                (
                    Some(diff),
                    passed,
                    format!(
                        "{} {:?} difference {:.6} {} threshold {}",
                        metric, tolerance.kind, diff, verb, tolerance.threshold
                    ),
                )
            }
            (a, b) => {
                let side = match (a, b) {
                    (None, None) => "both sides",
                    (None, _) => "side A",
                    _ => "side B",
                };
                (
                    None,
                    false,
                    format!("{} missing or non-finite on {}", metric, side),
                )
            }
        };

        Self {
            metric_name: metric.as_str().to_string(),
            value_a,
            value_b,
            difference,
            threshold: tolerance.threshold,
            kind: tolerance.kind,
            passed,
            message,
        }
    }

    /// 因缺少數據而無法比較
    pub fn is_missing_data(&self) -> bool {
        self.difference.is_none()
    }

    pub fn metric(&self) -> Option<CanonicalMetric> {
        CanonicalMetric::from_name(&self.metric_name)
    }
}

/// 依標準順序比較所有標準指標
pub fn compare_metrics(a: &MetricSet, b: &MetricSet, tolerances: &ParityTolerances) -> Vec<ParityCheck> {
    CanonicalMetric::ALL
        .iter()
        .map(|metric| {
            ParityCheck::evaluate(
                *metric,
                a.get(*metric),
                b.get(*metric),
                tolerances.tolerance_for(*metric),
            )
        })
        .collect()
}
