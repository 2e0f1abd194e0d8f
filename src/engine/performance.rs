use chrono::{DateTime, Utc};
use statrs::statistics::Statistics;

/// 年化期數（日K線）
pub const PERIODS_PER_YEAR: f64 = 252.0;

const SECONDS_PER_YEAR: f64 = 365.25 * 86_400.0;

/// 由資產曲線計算的績效摘要
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceSummary {
    pub starting_value: f64,
    pub ending_value: f64,
    pub total_return: f64,
    pub cagr: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub mean_utilization: f64,
}

impl PerformanceSummary {
    /// `timestamps`、`equity`、`utilization` 長度必須相同且非空
    pub fn from_curve(timestamps: &[DateTime<Utc>], equity: &[f64], utilization: &[f64]) -> Self {
        let starting_value = equity.first().copied().unwrap_or(0.0);
        let ending_value = equity.last().copied().unwrap_or(starting_value);
        let total_return = if starting_value != 0.0 {
            ending_value / starting_value - 1.0
        } else {
            0.0
        };
        let cagr = match (timestamps.first(), timestamps.last()) {
            (Some(first), Some(last)) => cagr(starting_value, ending_value, *first, *last),
            _ => 0.0,
        };
        let mean_utilization = if utilization.is_empty() {
            0.0
        } else {
            utilization.iter().mean()
        };

        Self {
            starting_value,
            ending_value,
            total_return,
            cagr,
            sharpe: sharpe_ratio(&period_returns(equity)),
            max_drawdown: max_drawdown(equity),
            mean_utilization,
        }
    }
}

/// 逐期簡單報酬
pub fn period_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .filter(|w| w[0].abs() > f64::EPSILON)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

/// 年化夏普比率（無風險利率 0，樣本標準差）；無法計算時為 0
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().mean();
    let std_dev = returns.iter().std_dev();
    if !std_dev.is_finite() || std_dev <= f64::EPSILON {
        return 0.0;
    }
    mean / std_dev * PERIODS_PER_YEAR.sqrt()
}

/// 最大回撤，以正數小數表示
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for value in equity {
        if *value > peak {
            peak = *value;
        }
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }
    worst
}

/// 年化複合成長率（一年 365.25 天）
pub fn cagr(starting: f64, ending: f64, first: DateTime<Utc>, last: DateTime<Utc>) -> f64 {
    let years = (last - first).num_seconds() as f64 / SECONDS_PER_YEAR;
    if years <= 0.0 || starting <= 0.0 {
        return 0.0;
    }
    if ending <= 0.0 {
        return -1.0;
    }
    (ending / starting).powf(1.0 / years) - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_max_drawdown_is_positive_fraction() {
        assert_eq!(max_drawdown(&[100.0, 120.0, 90.0, 130.0, 117.0]), 0.25);
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_sharpe_of_flat_curve_is_zero() {
        assert_eq!(sharpe_ratio(&period_returns(&[100.0, 100.0, 100.0])), 0.0);
        assert_eq!(sharpe_ratio(&[0.01]), 0.0);
    }

    #[test]
    fn test_sharpe_sign_follows_mean_return() {
        assert!(sharpe_ratio(&[0.01, 0.02, -0.005, 0.015]) > 0.0);
        assert!(sharpe_ratio(&[-0.01, -0.02, 0.005, -0.015]) < 0.0);
    }

    #[test]
    fn test_cagr_over_one_year() {
        let first = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let last = first + Duration::seconds(SECONDS_PER_YEAR as i64);
        assert!((cagr(100.0, 110.0, first, last) - 0.10).abs() < 1e-9);
        assert_eq!(cagr(100.0, 110.0, first, first), 0.0);
    }

    #[test]
    fn test_summary_from_curve() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ts: Vec<_> = (0..3).map(|d| t0 + Duration::days(d)).collect();
        let summary = PerformanceSummary::from_curve(&ts, &[100.0, 90.0, 110.0], &[0.0, 1.0, 1.0]);

        assert_eq!(summary.starting_value, 100.0);
        assert_eq!(summary.ending_value, 110.0);
        assert!((summary.total_return - 0.1).abs() < 1e-12);
        assert!((summary.max_drawdown - 0.1).abs() < 1e-12);
        assert!((summary.mean_utilization - 2.0 / 3.0).abs() < 1e-12);
    }
}
