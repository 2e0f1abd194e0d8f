use std::collections::HashMap;

use async_trait::async_trait;

use super::source::finalize_bars;
use super::{Bar, DataError, DataResult, DateRange, MarketDataSource};

/// 記憶體內的行情來源（測試與示範用）
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataSource {
    live: HashMap<String, Vec<Bar>>,
    snapshots: HashMap<String, HashMap<String, Vec<Bar>>>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_live(mut self, symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        self.live.insert(symbol.into(), bars);
        self
    }

    pub fn with_snapshot(
        mut self,
        snapshot_id: impl Into<String>,
        symbol: impl Into<String>,
        bars: Vec<Bar>,
    ) -> Self {
        self.snapshots
            .entry(snapshot_id.into())
            .or_default()
            .insert(symbol.into(), bars);
        self
    }
}

#[async_trait]
impl MarketDataSource for InMemoryDataSource {
    async fn load_bars(
        &self,
        symbol: &str,
        range: DateRange,
        snapshot_id: Option<&str>,
    ) -> DataResult<Vec<Bar>> {
        let table = match snapshot_id {
            Some(id) => self
                .snapshots
                .get(id)
                .ok_or_else(|| DataError::UnknownSnapshot {
                    snapshot_id: id.to_string(),
                })?,
            None => &self.live,
        };
        let bars = table.get(symbol).ok_or_else(|| DataError::UnknownSymbol {
            symbol: symbol.to_string(),
        })?;
        finalize_bars(symbol, bars.clone(), range)
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
