use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::contract::CanonicalMetric;

/// 差異的計算方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonKind {
    /// |a - b|
    Absolute,
    /// |a - b| / max(|a|, |b|)，兩者皆為 0 時為 0
    Relative,
}

/// 單一指標的容許誤差
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricTolerance {
    pub kind: ComparisonKind,
    pub threshold: f64,
}

impl MetricTolerance {
    pub const fn absolute(threshold: f64) -> Self {
        Self {
            kind: ComparisonKind::Absolute,
            threshold,
        }
    }

    pub const fn relative(threshold: f64) -> Self {
        Self {
            kind: ComparisonKind::Relative,
            threshold,
        }
    }

    pub fn difference(&self, a: f64, b: f64) -> f64 {
        match self.kind {
            ComparisonKind::Absolute => (a - b).abs(),
            ComparisonKind::Relative => relative_difference(a, b),
        }
    }

    pub fn accepts(&self, difference: f64) -> bool {
        difference.is_finite() && difference <= self.threshold
    }
}

pub fn relative_difference(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        0.0
    } else {
        (a - b).abs() / scale
    }
}

/// 各標準指標的預設容許誤差
pub fn default_tolerance(metric: CanonicalMetric) -> MetricTolerance {
    match metric {
        CanonicalMetric::StartingValue | CanonicalMetric::EndingValue => MetricTolerance::relative(0.001),
        CanonicalMetric::Roi => MetricTolerance::absolute(0.001),
        CanonicalMetric::Cagr => MetricTolerance::absolute(0.0015),
        CanonicalMetric::MaxDrawdown => MetricTolerance::absolute(0.002),
        CanonicalMetric::Sharpe => MetricTolerance::absolute(0.05),
        CanonicalMetric::MeanCashUtilization => MetricTolerance::absolute(0.02),
    }
}

/// 資產價值曲線漂移的容許範圍
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftTolerance {
    /// 單點相對誤差的帶寬
    pub band: f64,
    /// 落在帶寬內的點數比例下限
    pub min_fraction_within: f64,
    /// 任何一點的相對誤差上限
    pub ceiling: f64,
    /// 配對點數少於此值時跳過檢查
    pub min_paired_points: usize,
}

impl Default for DriftTolerance {
    fn default() -> Self {
        Self {
            band: 0.0025,
            min_fraction_within: 0.99,
            ceiling: 0.01,
            min_paired_points: 2,
        }
    }
}

/// 一致性驗證的全部容許誤差
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParityTolerances {
    /// 覆寫的指標容許誤差；未列出的指標使用預設值
    pub metrics: BTreeMap<CanonicalMetric, MetricTolerance>,
    pub drift: DriftTolerance,
}

impl Default for ParityTolerances {
    fn default() -> Self {
        Self {
            metrics: CanonicalMetric::ALL
                .iter()
                .map(|m| (*m, default_tolerance(*m)))
                .collect(),
            drift: DriftTolerance::default(),
        }
    }
}

impl ParityTolerances {
    pub fn tolerance_for(&self, metric: CanonicalMetric) -> MetricTolerance {
        self.metrics
            .get(&metric)
            .copied()
            .unwrap_or_else(|| default_tolerance(metric))
    }

    pub fn with_metric(mut self, metric: CanonicalMetric, tolerance: MetricTolerance) -> Self {
        self.metrics.insert(metric, tolerance);
        self
    }

    pub fn with_drift(mut self, drift: DriftTolerance) -> Self {
        self.drift = drift;
        self
    }
}
