#![allow(dead_code)]

use std::sync::Arc;

use backtest_parity::adapter::{EngineAdapter, EventDrivenAdapter, VectorizedAdapter};
use backtest_parity::contract::BacktestRunRequest;
use backtest_parity::market_data::{Bar, InMemoryDataSource, MarketDataSource};
use chrono::{DateTime, Duration, TimeZone, Utc};

pub const SYMBOLS: [&str; 2] = ["AAA", "BBB"];
pub const SNAPSHOT_ID: &str = "snap-2024";
pub const BAR_COUNT: usize = 120;
pub const INITIAL_CASH: f64 = 100_000.0;

pub fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

/// 緩慢上漲並帶有週期擺動的收盤價；開盤價等於前一根收盤價
pub fn fixture_bars(scale: f64) -> Vec<Bar> {
    gapped_bars(scale, 0.0)
}

/// 同 `fixture_bars`，但開盤價相對前一根收盤價跳空 `gap`（奇數根向下、偶數根向上）
pub fn gapped_bars(scale: f64, gap: f64) -> Vec<Bar> {
    let close = |t: usize| {
        let t = t as f64;
        scale * 100.0 * (1.0 + 0.0015 * t) * (1.0 + 0.01 * (t / 3.0).sin())
    };
    (0..BAR_COUNT)
        .map(|t| {
            let c = close(t);
            let o = if t == 0 {
                c
            } else if t % 2 == 1 {
                close(t - 1) * (1.0 - gap)
            } else {
                close(t - 1) * (1.0 + gap)
            };
            Bar {
                timestamp: origin() + Duration::days(t as i64),
                open: o,
                high: o.max(c),
                low: o.min(c),
                close: c,
                volume: 1_000.0,
            }
        })
        .collect()
}

/// 即時數據與快照內容相同的記憶體行情來源
pub fn data_source() -> Arc<dyn MarketDataSource> {
    let mut source = InMemoryDataSource::new();
    for (i, symbol) in SYMBOLS.iter().enumerate() {
        let scale = 1.0 + 0.5 * i as f64;
        source = source
            .with_live(*symbol, fixture_bars(scale))
            .with_snapshot(SNAPSHOT_ID, *symbol, fixture_bars(scale));
    }
    Arc::new(source)
}

pub fn event_adapter() -> Arc<dyn EngineAdapter> {
    Arc::new(EventDrivenAdapter::new(data_source()))
}

pub fn vectorized_adapter() -> Arc<dyn EngineAdapter> {
    Arc::new(VectorizedAdapter::new(data_source()))
}

pub fn request(strategy: &str) -> BacktestRunRequest {
    BacktestRunRequest::builder(strategy, SYMBOLS, INITIAL_CASH)
        .data_snapshot_id(SNAPSHOT_ID)
        .random_seed(7)
        .build()
        .expect("valid request")
}

/// 只有一個商品、開盤價有跳空的快照
pub fn gapped_source(gap: f64) -> Arc<dyn MarketDataSource> {
    Arc::new(InMemoryDataSource::new().with_snapshot(SNAPSHOT_ID, "AAA", gapped_bars(1.0, gap)))
}

pub fn single_symbol_request(strategy: &str) -> BacktestRunRequest {
    BacktestRunRequest::builder(strategy, ["AAA"], INITIAL_CASH)
        .data_snapshot_id(SNAPSHOT_ID)
        .random_seed(7)
        .build()
        .expect("valid request")
}
