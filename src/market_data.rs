//! 歷史行情數據模組
//!
//! 參考引擎只透過 [`MarketDataSource`] 取得K線。請求指定了數據快照時，
//! 所有數據都必須來自該快照，不可退回即時數據。

pub mod csv_snapshot;
pub mod frame;
pub mod memory;
pub mod source;
pub mod synthetic;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::contract::BacktestRunRequest;

// 重新導出常用組件
pub use csv_snapshot::CsvSnapshotSource;
pub use frame::{load_frame, PriceFrame};
pub use memory::InMemoryDataSource;
pub use source::MarketDataSource;
pub use synthetic::SyntheticDataSource;

/// OHLCV K線
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Bar {
    /// 四個價格都必須是正的有限數
    pub fn is_valid(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|p| p.is_finite() && *p > 0.0)
            && self.volume.is_finite()
            && self.volume >= 0.0
    }
}

/// 時間範圍（兩端皆含）；未設定的一端不設限
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn of_request(request: &BacktestRunRequest) -> Self {
        Self::new(request.start(), request.end())
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts <= e)
    }
}

/// 行情數據錯誤
#[derive(Error, Debug)]
pub enum DataError {
    #[error("未知的商品代碼: {symbol}")]
    UnknownSymbol { symbol: String },

    #[error("未知的數據快照: {snapshot_id}")]
    UnknownSnapshot { snapshot_id: String },

    #[error("商品 {symbol} 在指定範圍內沒有數據")]
    EmptyRange { symbol: String },

    #[error("數據格式錯誤 ({location}): {message}")]
    Malformed { location: String, message: String },

    #[error("所有商品沒有共同的時間點")]
    NoCommonTimestamps,

    #[error("IO 錯誤: {0}")]
    Io(#[from] std::io::Error),
}

/// 行情數據結果類型
pub type DataResult<T> = Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_range_bounds_are_inclusive() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        let range = DateRange::new(Some(start), Some(end));

        assert!(range.contains(start));
        assert!(range.contains(end));
        assert!(!range.contains(end + chrono::Duration::seconds(1)));
        assert!(DateRange::unbounded().contains(start));
    }

    #[test]
    fn test_bar_validity() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let bar = Bar { timestamp: ts, open: 1.0, high: 1.2, low: 0.9, close: 1.1, volume: 10.0 };
        assert!(bar.is_valid());
        assert!(!Bar { close: f64::NAN, ..bar }.is_valid());
        assert!(!Bar { open: 0.0, ..bar }.is_valid());
    }
}
