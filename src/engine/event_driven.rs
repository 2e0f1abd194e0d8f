//! 事件驅動引擎
//!
//! 每根K線依序處理：
//! 1. 以本根開盤價執行上一根K線產生的目標權重（先賣後買，整股）
//! 2. 以收盤價計算資產價值
//! 3. 呼叫策略，產生下一根K線要執行的目標權重
//!
//! 最後一根K線產生的訊號不會成交。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use super::performance::PerformanceSummary;
use super::{check_weights, EngineError, EngineResult};
use crate::market_data::PriceFrame;

/// 策略在每根K線收盤後看到的狀態
pub struct BarContext<'a> {
    pub index: usize,
    pub frame: &'a PriceFrame,
    pub positions: &'a [f64],
    pub cash: f64,
    pub equity: f64,
}

impl BarContext<'_> {
    /// 最近 `window` 根收盤價的簡單平均；數據不足時為 None
    pub fn sma(&self, symbol: usize, window: usize) -> Option<f64> {
        if window == 0 || self.index + 1 < window {
            return None;
        }
        let start = self.index + 1 - window;
        let sum: f64 = (start..=self.index)
            .map(|t| self.frame.bar(symbol, t).close)
            .sum();
        Some(sum / window as f64)
    }
}

/// 事件驅動策略
pub trait EventStrategy: Send {
    fn name(&self) -> &str;

    /// 返回新的目標權重（每個商品一個），`None` 代表維持現有部位
    fn on_bar(&mut self, ctx: &BarContext<'_>) -> Option<Vec<f64>>;
}

/// 引擎設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventEngineConfig {
    /// 每筆成交的固定手續費
    pub commission_per_trade: f64,
    /// 滑價上限（基點），實際滑價在 [0, 上限] 之間隨機
    pub slippage_bps: f64,
    pub seed: u64,
}

impl Default for EventEngineConfig {
    fn default() -> Self {
        Self {
            commission_per_trade: 1.0,
            slippage_bps: 0.0,
            seed: 0,
        }
    }
}

/// 引擎原始輸出
#[derive(Debug, Clone)]
pub struct EventRunOutput {
    /// 原生統計（名稱為引擎自己的命名）
    pub stats: BTreeMap<String, f64>,
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
    pub trades: usize,
    pub commission_paid: f64,
}

pub struct EventDrivenEngine {
    config: EventEngineConfig,
}

impl EventDrivenEngine {
    pub fn new(config: EventEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EventEngineConfig {
        &self.config
    }

    pub fn run(
        &self,
        frame: &PriceFrame,
        initial_cash: f64,
        strategy: &mut dyn EventStrategy,
    ) -> EngineResult<EventRunOutput> {
        if frame.len() < 2 {
            return Err(EngineError::InsufficientData {
                required: 2,
                available: frame.len(),
            });
        }

        let symbols = frame.symbol_count();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut cash = initial_cash;
        let mut positions = vec![0.0_f64; symbols];
        let mut pending: Option<Vec<f64>> = None;
        let mut trades = 0usize;
        let mut commission_paid = 0.0;

        let mut equity_curve = Vec::with_capacity(frame.len());
        let mut equity_values = Vec::with_capacity(frame.len());
        let mut utilization = Vec::with_capacity(frame.len());

        for t in 0..frame.len() {
            if let Some(targets) = pending.take() {
                let opens = frame.opens(t);
                let fills = self.rebalance(&mut cash, &mut positions, &targets, &opens, &mut rng);
                trades += fills;
                commission_paid += fills as f64 * self.config.commission_per_trade;
            }

            let closes = frame.closes(t);
            let invested: f64 = positions.iter().zip(&closes).map(|(q, p)| q * p).sum();
            let equity = cash + invested;
            equity_curve.push((frame.timestamps()[t], equity));
            equity_values.push(equity);
            utilization.push(if equity > 0.0 { invested / equity } else { 0.0 });

            let ctx = BarContext {
                index: t,
                frame,
                positions: &positions,
                cash,
                equity,
            };
            if let Some(targets) = strategy.on_bar(&ctx) {
                check_weights(&targets, symbols)?;
                if t + 1 < frame.len() {
                    pending = Some(targets);
                } else {
                    trace!("最後一根K線的訊號被忽略");
                }
            }
        }

        let summary = PerformanceSummary::from_curve(frame.timestamps(), &equity_values, &utilization);
        debug!(
            "事件驅動回測完成: 策略={} 成交={} 期末={:.2}",
            strategy.name(),
            trades,
            summary.ending_value
        );

        let mut stats = BTreeMap::new();
        stats.insert("Starting Value".to_string(), initial_cash);
        stats.insert("Ending Value".to_string(), summary.ending_value);
        stats.insert("Return".to_string(), summary.total_return);
        stats.insert("CAGR".to_string(), summary.cagr);
        stats.insert("Sharpe".to_string(), summary.sharpe);
        stats.insert("Max Drawdown".to_string(), summary.max_drawdown);
        stats.insert("Cash Utilization".to_string(), summary.mean_utilization);
        stats.insert("Trades".to_string(), trades as f64);
        stats.insert("Commission Paid".to_string(), commission_paid);

        Ok(EventRunOutput {
            stats,
            equity_curve,
            trades,
            commission_paid,
        })
    }

    /// 以開盤價調整到目標權重，返回成交筆數
    fn rebalance(
        &self,
        cash: &mut f64,
        positions: &mut [f64],
        targets: &[f64],
        opens: &[f64],
        rng: &mut StdRng,
    ) -> usize {
        let equity: f64 = *cash + positions.iter().zip(opens).map(|(q, p)| q * p).sum::<f64>();
        let desired: Vec<f64> = targets
            .iter()
            .zip(opens)
            .map(|(w, p)| (w * equity / p).floor())
            .collect();
        let commission = self.config.commission_per_trade;
        let mut fills = 0;

        // 先賣
        for i in 0..positions.len() {
            let diff = desired[i] - positions[i];
            if diff < 0.0 {
                let price = opens[i] * (1.0 - self.slippage(rng));
                *cash += -diff * price - commission;
                positions[i] = desired[i];
                fills += 1;
            }
        }

        // 後買，現金不足時減少股數
        for i in 0..positions.len() {
            let diff = desired[i] - positions[i];
            if diff > 0.0 {
                let price = opens[i] * (1.0 + self.slippage(rng));
                let affordable = ((*cash - commission) / price).floor().max(0.0);
                let quantity = diff.min(affordable);
                if quantity > 0.0 {
                    *cash -= quantity * price + commission;
                    positions[i] += quantity;
                    fills += 1;
                }
            }
        }
        fills
    }

    fn slippage(&self, rng: &mut StdRng) -> f64 {
        if self.config.slippage_bps <= 0.0 {
            return 0.0;
        }
        rng.random_range(0.0..=self.config.slippage_bps) / 10_000.0
    }
}

/// 買入持有：第一根K線收盤後等權重買入，之後不再調整
#[derive(Debug, Default)]
pub struct BuyAndHold {
    entered: bool,
}

impl EventStrategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn on_bar(&mut self, ctx: &BarContext<'_>) -> Option<Vec<f64>> {
        if self.entered {
            return None;
        }
        self.entered = true;
        let n = ctx.frame.symbol_count();
        Some(vec![1.0 / n as f64; n])
    }
}

/// 均線交叉：快線在慢線之上時持有該商品（等權重分配）
#[derive(Debug)]
pub struct SmaCrossover {
    fast: usize,
    slow: usize,
    last_signal: Option<Vec<bool>>,
}

impl SmaCrossover {
    pub const DEFAULT_FAST: usize = 5;
    pub const DEFAULT_SLOW: usize = 20;

    pub fn new(fast: usize, slow: usize) -> EngineResult<Self> {
        if fast == 0 {
            return Err(EngineError::invalid_parameter("fast", "必須大於 0"));
        }
        if fast >= slow {
            return Err(EngineError::invalid_parameter(
                "slow",
                format!("必須大於 fast ({})", fast),
            ));
        }
        Ok(Self {
            fast,
            slow,
            last_signal: None,
        })
    }
}

impl EventStrategy for SmaCrossover {
    fn name(&self) -> &str {
        "sma_crossover"
    }

    fn on_bar(&mut self, ctx: &BarContext<'_>) -> Option<Vec<f64>> {
        let n = ctx.frame.symbol_count();
        let mut signal = Vec::with_capacity(n);
        for symbol in 0..n {
            let fast = ctx.sma(symbol, self.fast)?;
            let slow = ctx.sma(symbol, self.slow)?;
            signal.push(fast > slow);
        }
        if self.last_signal.as_ref() == Some(&signal) {
            return None;
        }
        let weight = 1.0 / n as f64;
        let targets = signal.iter().map(|on| if *on { weight } else { 0.0 }).collect();
        self.last_signal = Some(signal);
        Some(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Bar;
    use chrono::{Duration, TimeZone};

    fn frame(closes: &[f64]) -> PriceFrame {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let open = if i == 0 { *c } else { closes[i - 1] };
                Bar {
                    timestamp: t0 + Duration::days(i as i64),
                    open,
                    high: open.max(*c),
                    low: open.min(*c),
                    close: *c,
                    volume: 1_000.0,
                }
            })
            .collect();
        PriceFrame::align(vec![("AAA".to_string(), bars)]).unwrap()
    }

    #[test]
    fn test_buy_and_hold_fills_next_open_in_whole_shares() {
        let engine = EventDrivenEngine::new(EventEngineConfig::default());
        let frame = frame(&[10.0, 11.0, 12.0]);
        let output = engine.run(&frame, 1_005.0, &mut BuyAndHold::default()).unwrap();

        // 第 1 根開盤價 10：floor(1005 / 10) = 100 股，現金剩 1005 - 1000 - 1 = 4
        assert_eq!(output.trades, 1);
        assert_eq!(output.equity_curve[0].1, 1_005.0);
        assert_eq!(output.equity_curve[1].1, 4.0 + 100.0 * 11.0);
        assert_eq!(output.stats["Ending Value"], 4.0 + 100.0 * 12.0);
        assert_eq!(output.stats["Starting Value"], 1_005.0);
    }

    #[test]
    fn test_insufficient_data() {
        let engine = EventDrivenEngine::new(EventEngineConfig::default());
        let err = engine.run(&frame(&[10.0]), 1_000.0, &mut BuyAndHold::default()).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { .. }));
    }

    #[test]
    fn test_sma_crossover_parameters_validated() {
        assert!(SmaCrossover::new(5, 20).is_ok());
        assert!(matches!(
            SmaCrossover::new(20, 5),
            Err(EngineError::InvalidParameter { ref name, .. }) if name == "slow"
        ));
        assert!(SmaCrossover::new(0, 5).is_err());
    }

    #[test]
    fn test_sma_crossover_exits_on_downtrend() {
        let engine = EventDrivenEngine::new(EventEngineConfig::default());
        let closes = [10.0, 11.0, 12.0, 13.0, 14.0, 13.0, 12.0, 11.0, 10.0, 9.0];
        let output = engine
            .run(&frame(&closes), 1_000.0, &mut SmaCrossover::new(2, 3).unwrap())
            .unwrap();

        assert_eq!(output.trades, 2);
        assert!(output.stats["Ending Value"].is_finite());
    }

    #[test]
    fn test_seeded_slippage_is_reproducible() {
        let config = EventEngineConfig {
            slippage_bps: 5.0,
            seed: 7,
            ..EventEngineConfig::default()
        };
        let frame = frame(&[10.0, 11.0, 12.0, 11.5]);
        let a = EventDrivenEngine::new(config).run(&frame, 10_000.0, &mut BuyAndHold::default()).unwrap();
        let b = EventDrivenEngine::new(config).run(&frame, 10_000.0, &mut BuyAndHold::default()).unwrap();
        assert_eq!(a.equity_curve, b.equity_curve);
    }
}
