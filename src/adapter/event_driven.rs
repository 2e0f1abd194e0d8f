use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::error::AdapterError;
use super::registry::{positive_int_param, StrategyRegistry};
use super::traits::EngineAdapter;
use crate::contract::{BacktestRunMetadata, BacktestRunRequest, BacktestRunResult, EngineIdentity, ValuePoint};
use crate::engine::event_driven::{BuyAndHold, SmaCrossover};
use crate::engine::{EventDrivenEngine, EventEngineConfig, EventStrategy};
use crate::market_data::{load_frame, MarketDataSource};
use crate::schema::LegacyKeyTable;
use crate::serialization::result_from_native_stats;

pub const ENGINE_NAME: &str = "event-driven";
pub const ENGINE_VERSION: &str = "1.2.0";

/// 事件驅動引擎的適配器
///
/// 原生統計是以舊版名稱為鍵的數值表，透過共用的對照表轉成標準指標。
pub struct EventDrivenAdapter {
    identity: EngineIdentity,
    data: Arc<dyn MarketDataSource>,
    config: EventEngineConfig,
    strategies: StrategyRegistry<Box<dyn EventStrategy>>,
    key_table: LegacyKeyTable,
}

fn default_strategies() -> StrategyRegistry<Box<dyn EventStrategy>> {
    StrategyRegistry::new()
        .register("buy_and_hold", |_| {
            Ok(Box::new(BuyAndHold::default()) as Box<dyn EventStrategy>)
        })
        .register("sma_crossover", |request| {
            let fast = positive_int_param(request, "fast", SmaCrossover::DEFAULT_FAST)?;
            let slow = positive_int_param(request, "slow", SmaCrossover::DEFAULT_SLOW)?;
            let strategy = SmaCrossover::new(fast, slow)
                .map_err(|e| AdapterError::from_engine(ENGINE_NAME, e))?;
            Ok(Box::new(strategy) as Box<dyn EventStrategy>)
        })
}

impl EventDrivenAdapter {
    pub fn new(data: Arc<dyn MarketDataSource>) -> Self {
        Self::with_config(data, EventEngineConfig::default())
    }

    pub fn with_config(data: Arc<dyn MarketDataSource>, config: EventEngineConfig) -> Self {
        Self {
            identity: EngineIdentity::new(ENGINE_NAME, ENGINE_VERSION),
            data,
            config,
            strategies: default_strategies(),
            key_table: LegacyKeyTable::default(),
        }
    }

    /// 以擴充過的對照表翻譯原生統計
    pub fn with_key_table(mut self, key_table: LegacyKeyTable) -> Self {
        self.key_table = key_table;
        self
    }
}

#[async_trait]
impl EngineAdapter for EventDrivenAdapter {
    fn identity(&self) -> &EngineIdentity {
        &self.identity
    }

    fn strategies(&self) -> Vec<String> {
        self.strategies.names()
    }

    #[instrument(skip_all, fields(engine = ENGINE_NAME, strategy = %request.strategy_name()))]
    async fn run(&self, request: &BacktestRunRequest) -> Result<BacktestRunResult, AdapterError> {
        let mut strategy = self.strategies.resolve(ENGINE_NAME, request)?;
        let metadata = BacktestRunMetadata::begin_run(request, &self.identity);
        debug!("開始執行 run_id={}", metadata.run_id);

        let frame = load_frame(self.data.as_ref(), request)
            .await
            .map_err(|e| AdapterError::engine_execution(ENGINE_NAME, e))?;

        let config = EventEngineConfig {
            seed: request.random_seed().unwrap_or(self.config.seed),
            ..self.config
        };
        let output = EventDrivenEngine::new(config)
            .run(&frame, request.initial_cash(), strategy.as_mut())
            .map_err(|e| AdapterError::from_engine(ENGINE_NAME, e))?;

        let history = output
            .equity_curve
            .iter()
            .map(|(ts, value)| ValuePoint::new(*ts, *value))
            .collect();

        let result = result_from_native_stats(metadata, &output.stats, &self.key_table)?
            .with_assumption("fill_timing", "next_bar_open")
            .with_assumption("position_sizing", "whole_shares")
            .with_assumption("commission_model", "flat_per_trade")
            .with_assumption("commission_per_trade", config.commission_per_trade)
            .with_assumption("slippage_bps_max", config.slippage_bps)
            .with_assumption("slippage_seed", config.seed)
            .with_assumption("data_source", self.data.describe())
            .with_assumption("bars", frame.len() as u64)
            .with_value_history(history);
        Ok(result)
    }
}
