//! 向量化引擎
//!
//! 策略一次產生整段期間的目標權重矩陣，引擎在標記為調整的K線上以收盤價
//! 零股成交，手續費為成交金額的固定基點。

use chrono::{DateTime, Utc};
use tracing::debug;

use super::performance::PerformanceSummary;
use super::{check_weights, EngineError, EngineResult};
use crate::market_data::PriceFrame;

/// 目標權重矩陣：`weights[t][i]` 只在 `rebalance[t]` 為 true 時生效
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSchedule {
    pub weights: Vec<Vec<f64>>,
    pub rebalance: Vec<bool>,
}

impl TargetSchedule {
    /// 依固定權重，在 `rebalance_at(t)` 為 true 的時間點調整
    pub fn constant(frame: &PriceFrame, weights: Vec<f64>, rebalance_at: impl Fn(usize) -> bool) -> Self {
        let n = frame.len();
        Self {
            weights: vec![weights; n],
            rebalance: (0..n).map(rebalance_at).collect(),
        }
    }
}

/// 向量化策略
pub trait VectorStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn schedule(&self, frame: &PriceFrame) -> TargetSchedule;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorizedConfig {
    /// 手續費（成交金額的基點）
    pub commission_bps: f64,
}

impl Default for VectorizedConfig {
    fn default() -> Self {
        Self { commission_bps: 1.0 }
    }
}

/// 引擎原生統計（型別化欄位，而非名稱表）
#[derive(Debug, Clone, PartialEq)]
pub struct VectorizedStats {
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub average_exposure: f64,
    pub rebalance_count: usize,
    pub turnover: f64,
    pub fees: f64,
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
}

pub struct VectorizedEngine {
    config: VectorizedConfig,
}

impl VectorizedEngine {
    pub fn new(config: VectorizedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VectorizedConfig {
        &self.config
    }

    pub fn run(
        &self,
        frame: &PriceFrame,
        initial_capital: f64,
        strategy: &dyn VectorStrategy,
    ) -> EngineResult<VectorizedStats> {
        if frame.len() < 2 {
            return Err(EngineError::InsufficientData {
                required: 2,
                available: frame.len(),
            });
        }
        let schedule = strategy.schedule(frame);
        if schedule.weights.len() != frame.len() || schedule.rebalance.len() != frame.len() {
            return Err(EngineError::InvalidSignal(format!(
                "權重矩陣長度 {} 與K線數量 {} 不符",
                schedule.weights.len(),
                frame.len()
            )));
        }

        let fee_rate = self.config.commission_bps / 10_000.0;
        let mut cash = initial_capital;
        let mut holdings = vec![0.0_f64; frame.symbol_count()];
        let mut rebalance_count = 0;
        let mut turnover = 0.0;
        let mut fees = 0.0;

        let mut equity = Vec::with_capacity(frame.len());
        let mut exposure = Vec::with_capacity(frame.len());

        for t in 0..frame.len() {
            let closes = frame.closes(t);
            let value = cash + dot(&holdings, &closes);

            if schedule.rebalance[t] {
                let weights = &schedule.weights[t];
                check_weights(weights, frame.symbol_count())?;

                let mut target: Vec<f64> = weights
                    .iter()
                    .zip(&closes)
                    .map(|(w, p)| w * value / p)
                    .collect();
                let mut traded = traded_notional(&holdings, &target, &closes);
                let mut fee = traded * fee_rate;
                let invested = dot(&target, &closes);
                if invested + fee > value && invested > 0.0 {
                    let scale = (value - fee) / invested;
                    target.iter_mut().for_each(|q| *q *= scale);
                    traded = traded_notional(&holdings, &target, &closes);
                    fee = traded * fee_rate;
                }

                cash = (value - dot(&target, &closes) - fee).max(0.0);
                holdings = target;
                turnover += traded;
                fees += fee;
                rebalance_count += 1;
            }

            let invested = dot(&holdings, &closes);
            let total = cash + invested;
            equity.push(total);
            exposure.push(if total > 0.0 { invested / total } else { 0.0 });
        }

        let summary = PerformanceSummary::from_curve(frame.timestamps(), &equity, &exposure);
        debug!(
            "向量化回測完成: 策略={} 調整次數={} 期末={:.2}",
            strategy.name(),
            rebalance_count,
            summary.ending_value
        );

        Ok(VectorizedStats {
            initial_capital,
            final_equity: summary.ending_value,
            total_return: summary.ending_value / initial_capital - 1.0,
            annualized_return: summary.cagr,
            sharpe_ratio: summary.sharpe,
            max_drawdown: summary.max_drawdown,
            average_exposure: summary.mean_utilization,
            rebalance_count,
            turnover,
            fees,
            equity_curve: frame.timestamps().iter().copied().zip(equity).collect(),
        })
    }
}

fn dot(quantities: &[f64], prices: &[f64]) -> f64 {
    quantities.iter().zip(prices).map(|(q, p)| q * p).sum()
}

fn traded_notional(current: &[f64], target: &[f64], prices: &[f64]) -> f64 {
    current
        .iter()
        .zip(target)
        .zip(prices)
        .map(|((c, t), p)| (t - c).abs() * p)
        .sum()
}

/// 買入持有：第一根K線等權重建倉，之後不再調整
#[derive(Debug, Default)]
pub struct BuyAndHold;

impl VectorStrategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn schedule(&self, frame: &PriceFrame) -> TargetSchedule {
        let n = frame.symbol_count();
        TargetSchedule::constant(frame, vec![1.0 / n as f64; n], |t| t == 0)
    }
}

/// 定期等權重再平衡
#[derive(Debug)]
pub struct EqualWeightRebalance {
    every: usize,
}

impl EqualWeightRebalance {
    pub const DEFAULT_EVERY: usize = 21;

    pub fn new(every: usize) -> EngineResult<Self> {
        if every == 0 {
            return Err(EngineError::invalid_parameter("every", "必須大於 0"));
        }
        Ok(Self { every })
    }
}

impl VectorStrategy for EqualWeightRebalance {
    fn name(&self) -> &str {
        "equal_weight_rebalance"
    }

    fn schedule(&self, frame: &PriceFrame) -> TargetSchedule {
        let n = frame.symbol_count();
        let every = self.every;
        TargetSchedule::constant(frame, vec![1.0 / n as f64; n], move |t| t % every == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Bar;
    use chrono::{Duration, TimeZone};

    fn series(closes: &[f64]) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| Bar {
                timestamp: t0 + Duration::days(i as i64),
                open: *c,
                high: *c,
                low: *c,
                close: *c,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_buy_and_hold_without_fees_tracks_price() {
        let frame = PriceFrame::align(vec![("AAA".to_string(), series(&[10.0, 12.0, 15.0]))]).unwrap();
        let engine = VectorizedEngine::new(VectorizedConfig { commission_bps: 0.0 });
        let stats = engine.run(&frame, 1_000.0, &BuyAndHold).unwrap();

        assert!((stats.final_equity - 1_500.0).abs() < 1e-9);
        assert!((stats.total_return - 0.5).abs() < 1e-12);
        assert_eq!(stats.rebalance_count, 1);
        assert!((stats.average_exposure - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fees_never_make_cash_negative() {
        let frame = PriceFrame::align(vec![("AAA".to_string(), series(&[10.0, 10.0]))]).unwrap();
        let engine = VectorizedEngine::new(VectorizedConfig { commission_bps: 10.0 });
        let stats = engine.run(&frame, 1_000.0, &BuyAndHold).unwrap();

        assert!(stats.fees > 0.0);
        assert!(stats.final_equity <= 1_000.0);
        assert!((stats.final_equity - (1_000.0 - stats.fees)).abs() < 1e-9);
    }

    #[test]
    fn test_equal_weight_rebalance_schedule() {
        let frame = PriceFrame::align(vec![
            ("AAA".to_string(), series(&[10.0, 11.0, 12.0, 13.0, 14.0])),
            ("BBB".to_string(), series(&[20.0, 19.0, 18.0, 17.0, 16.0])),
        ])
        .unwrap();
        let schedule = EqualWeightRebalance::new(2).unwrap().schedule(&frame);
        assert_eq!(schedule.rebalance, vec![true, false, true, false, true]);
        assert_eq!(schedule.weights[0], vec![0.5, 0.5]);

        let stats = VectorizedEngine::new(VectorizedConfig::default())
            .run(&frame, 10_000.0, &EqualWeightRebalance::new(2).unwrap())
            .unwrap();
        assert_eq!(stats.rebalance_count, 3);
        assert_eq!(stats.equity_curve.len(), 5);
    }

    #[test]
    fn test_rebalance_interval_must_be_positive() {
        assert!(EqualWeightRebalance::new(0).is_err());
    }
}
