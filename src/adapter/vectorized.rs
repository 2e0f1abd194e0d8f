use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::error::AdapterError;
use super::registry::{positive_int_param, StrategyRegistry};
use super::traits::EngineAdapter;
use crate::contract::{
    BacktestRunMetadata, BacktestRunRequest, BacktestRunResult, CanonicalMetric, EngineIdentity,
    MetricSet, ValuePoint,
};
use crate::engine::vectorized::{BuyAndHold, EqualWeightRebalance};
use crate::engine::{VectorStrategy, VectorizedConfig, VectorizedEngine, VectorizedStats};
use crate::market_data::{load_frame, MarketDataSource};
use crate::schema::SchemaError;

pub const ENGINE_NAME: &str = "vectorized";
pub const ENGINE_VERSION: &str = "0.9.0";

/// 向量化引擎的適配器
///
/// 原生統計是型別化結構，以明確的欄位對應轉成標準指標。
pub struct VectorizedAdapter {
    identity: EngineIdentity,
    data: Arc<dyn MarketDataSource>,
    config: VectorizedConfig,
    strategies: StrategyRegistry<Box<dyn VectorStrategy>>,
}

fn default_strategies() -> StrategyRegistry<Box<dyn VectorStrategy>> {
    StrategyRegistry::new()
        .register("buy_and_hold", |_| Ok(Box::new(BuyAndHold) as Box<dyn VectorStrategy>))
        .register("equal_weight_rebalance", |request| {
            let every = positive_int_param(request, "every", EqualWeightRebalance::DEFAULT_EVERY)?;
            let strategy = EqualWeightRebalance::new(every)
                .map_err(|e| AdapterError::from_engine(ENGINE_NAME, e))?;
            Ok(Box::new(strategy) as Box<dyn VectorStrategy>)
        })
}

/// 原生欄位 -> 標準指標
fn canonical_metrics(stats: &VectorizedStats) -> MetricSet {
    MetricSet::new()
        .with(CanonicalMetric::StartingValue, stats.initial_capital)
        .with(CanonicalMetric::EndingValue, stats.final_equity)
        .with(CanonicalMetric::Roi, stats.total_return)
        .with(CanonicalMetric::Cagr, stats.annualized_return)
        .with(CanonicalMetric::Sharpe, stats.sharpe_ratio)
        .with(CanonicalMetric::MaxDrawdown, stats.max_drawdown)
        .with(CanonicalMetric::MeanCashUtilization, stats.average_exposure)
}

impl VectorizedAdapter {
    pub fn new(data: Arc<dyn MarketDataSource>) -> Self {
        Self::with_config(data, VectorizedConfig::default())
    }

    pub fn with_config(data: Arc<dyn MarketDataSource>, config: VectorizedConfig) -> Self {
        Self {
            identity: EngineIdentity::new(ENGINE_NAME, ENGINE_VERSION),
            data,
            config,
            strategies: default_strategies(),
        }
    }
}

#[async_trait]
impl EngineAdapter for VectorizedAdapter {
    fn identity(&self) -> &EngineIdentity {
        &self.identity
    }

    fn strategies(&self) -> Vec<String> {
        self.strategies.names()
    }

    #[instrument(skip_all, fields(engine = ENGINE_NAME, strategy = %request.strategy_name()))]
    async fn run(&self, request: &BacktestRunRequest) -> Result<BacktestRunResult, AdapterError> {
        let strategy = self.strategies.resolve(ENGINE_NAME, request)?;
        let metadata = BacktestRunMetadata::begin_run(request, &self.identity);
        debug!("開始執行 run_id={}", metadata.run_id);

        let frame = load_frame(self.data.as_ref(), request)
            .await
            .map_err(|e| AdapterError::engine_execution(ENGINE_NAME, e))?;
        let stats = VectorizedEngine::new(self.config)
            .run(&frame, request.initial_cash(), strategy.as_ref())
            .map_err(|e| AdapterError::from_engine(ENGINE_NAME, e))?;

        let metrics = canonical_metrics(&stats);
        if let Some((metric, value)) = metrics.first_non_finite() {
            return Err(SchemaError::NonFiniteValue {
                field: format!("metrics.{}", metric),
                value,
            }
            .into());
        }

        let history = stats
            .equity_curve
            .iter()
            .map(|(ts, value)| ValuePoint::new(*ts, *value))
            .collect();

        Ok(BacktestRunResult::new(metadata, metrics)
            .with_assumption("fill_timing", "signal_bar_close")
            .with_assumption("position_sizing", "fractional")
            .with_assumption("commission_model", "bps_of_notional")
            .with_assumption("commission_bps", self.config.commission_bps)
            .with_assumption("rebalance_count", stats.rebalance_count as u64)
            .with_assumption("turnover", stats.turnover)
            .with_assumption("fees", stats.fees)
            .with_assumption("data_source", self.data.describe())
            .with_assumption("bars", frame.len() as u64)
            .with_value_history(history))
    }
}
