// 資產價值曲線漂移檢查
//
// 兩條曲線以時間戳交集配對，逐點計算相對誤差。缺少曲線或配對點不足時
// 檢查被跳過，跳過永遠不算通過。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};

use super::tolerance::{relative_difference, DriftTolerance};
use crate::contract::ValuePoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftStatistics {
    pub paired_points: usize,
    pub fraction_within_band: f64,
    pub mean_relative_error: f64,
    pub p99_relative_error: f64,
    pub max_relative_error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftVerdict {
    pub status: DriftStatus,
    pub passed: bool,
    pub reason: String,
    pub statistics: Option<DriftStatistics>,
}

impl DriftVerdict {
    fn skipped(reason: impl Into<String>, statistics: Option<DriftStatistics>) -> Self {
        Self {
            status: DriftStatus::Skipped,
            passed: false,
            reason: reason.into(),
            statistics,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.status == DriftStatus::Skipped
    }
}

/// 比較兩條資產價值曲線
pub fn check_drift(
    series_a: Option<&[ValuePoint]>,
    series_b: Option<&[ValuePoint]>,
    tolerance: &DriftTolerance,
) -> DriftVerdict {
    let (a, b) = match (series_a, series_b) {
        (Some(a), Some(b)) => (a, b),
        (None, None) => return DriftVerdict::skipped("value_history missing on both sides", None),
        (None, _) => return DriftVerdict::skipped("value_history missing on side A", None),
        (_, None) => return DriftVerdict::skipped("value_history missing on side B", None),
    };

    let by_time: BTreeMap<_, f64> = a.iter().map(|p| (p.timestamp, p.value)).collect();
    let errors: Vec<f64> = b
        .iter()
        .filter_map(|p| by_time.get(&p.timestamp).map(|va| relative_difference(*va, p.value)))
        .map(|e| if e.is_finite() { e } else { f64::INFINITY })
        .collect();

    if errors.len() < tolerance.min_paired_points.max(1) {
        return DriftVerdict::skipped(
            format!(
                "only {} paired points (minimum {})",
                errors.len(),
                tolerance.min_paired_points
            ),
            None,
        );
    }

    let within = errors.iter().filter(|e| **e <= tolerance.band).count();
    let fraction_within_band = within as f64 / errors.len() as f64;
    let max_relative_error = errors.iter().copied().fold(0.0_f64, f64::max);
    let statistics = DriftStatistics {
        paired_points: errors.len(),
        fraction_within_band,
        mean_relative_error: errors.iter().mean(),
        p99_relative_error: Data::new(errors.clone()).percentile(99),
        max_relative_error,
    };

    let passed = fraction_within_band >= tolerance.min_fraction_within
        && max_relative_error <= tolerance.ceiling;
    let reason = if passed {
        format!(
            "{:.2}% of {} points within {:.4}, max error {:.6}",
            fraction_within_band * 100.0,
            statistics.paired_points,
            tolerance.band,
            max_relative_error
        )
    } else if max_relative_error > tolerance.ceiling {
        format!(
            "max relative error {:.6} above ceiling {}",
            max_relative_error, tolerance.ceiling
        )
    } else {
        format!(
            "only {:.2}% of points within {:.4} (required {:.2}%)",
            fraction_within_band * 100.0,
            tolerance.band,
            tolerance.min_fraction_within * 100.0
        )
    };

    DriftVerdict {
        status: if passed { DriftStatus::Passed } else { DriftStatus::Failed },
        passed,
        reason,
        statistics: Some(statistics),
    }
}
