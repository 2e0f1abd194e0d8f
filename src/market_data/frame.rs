use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use tracing::{debug, warn};

use super::{Bar, DataError, DataResult, DateRange, MarketDataSource};
use crate::contract::BacktestRunRequest;

/// 多商品對齊後的K線矩陣
///
/// `bars[i][t]` 是第 i 個商品在 `timestamps[t]` 的K線，所有商品的時間軸相同。
#[derive(Debug, Clone, PartialEq)]
pub struct PriceFrame {
    symbols: Vec<String>,
    timestamps: Vec<DateTime<Utc>>,
    bars: Vec<Vec<Bar>>,
}

impl PriceFrame {
    /// 以時間交集對齊多個商品的K線
    pub fn align(series: Vec<(String, Vec<Bar>)>) -> DataResult<Self> {
        let mut common: Option<BTreeSet<DateTime<Utc>>> = None;
        for (_, bars) in &series {
            let stamps: BTreeSet<_> = bars.iter().map(|b| b.timestamp).collect();
            common = Some(match common {
                None => stamps,
                Some(acc) => acc.intersection(&stamps).copied().collect(),
            });
        }
        let timestamps: Vec<DateTime<Utc>> = common.unwrap_or_default().into_iter().collect();
        if timestamps.is_empty() {
            return Err(DataError::NoCommonTimestamps);
        }

        let mut symbols = Vec::with_capacity(series.len());
        let mut aligned = Vec::with_capacity(series.len());
        for (symbol, bars) in series {
            let mut kept: Vec<Bar> = bars
                .iter()
                .filter(|b| timestamps.binary_search(&b.timestamp).is_ok())
                .copied()
                .collect();
            kept.sort_by_key(|b| b.timestamp);
            kept.dedup_by_key(|b| b.timestamp);
            let dropped = bars.len().saturating_sub(kept.len());
            if dropped > 0 {
                debug!("{} 對齊時捨棄 {} 根K線", symbol, dropped);
            }
            symbols.push(symbol);
            aligned.push(kept);
        }

        Ok(Self {
            symbols,
            timestamps,
            bars: aligned,
        })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// 時間點數量
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn bar(&self, symbol_index: usize, t: usize) -> &Bar {
        &self.bars[symbol_index][t]
    }

    pub fn closes(&self, t: usize) -> Vec<f64> {
        self.bars.iter().map(|series| series[t].close).collect()
    }

    pub fn opens(&self, t: usize) -> Vec<f64> {
        self.bars.iter().map(|series| series[t].open).collect()
    }
}

/// 依請求載入並對齊所有商品
pub async fn load_frame(
    source: &dyn MarketDataSource,
    request: &BacktestRunRequest,
) -> DataResult<PriceFrame> {
    let range = DateRange::of_request(request);
    let snapshot = request.data_snapshot_id();
    let loads = request.symbols().iter().map(|symbol| async move {
        let bars = source.load_bars(symbol, range, snapshot).await?;
        if let Some(bad) = bars.iter().find(|b| !b.is_valid()) {
            return Err(DataError::Malformed {
                location: format!("{}@{}", symbol, bad.timestamp),
                message: "價格必須是正的有限數".to_string(),
            });
        }
        Ok::<_, DataError>((symbol.clone(), bars))
    });
    let series = try_join_all(loads).await?;
    let frame = PriceFrame::align(series)?;
    if frame.len() < 2 {
        warn!("對齊後只有 {} 個時間點", frame.len());
    }
    Ok(frame)
}
