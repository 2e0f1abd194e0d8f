use async_trait::async_trait;

use super::{Bar, DataResult, DateRange};

/// 行情數據來源
///
/// 返回的K線依時間遞增排列，且全部落在 `range` 內。
/// `snapshot_id` 為 `Some` 時只能讀取該快照；快照不存在時返回 `UnknownSnapshot`。
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn load_bars(
        &self,
        symbol: &str,
        range: DateRange,
        snapshot_id: Option<&str>,
    ) -> DataResult<Vec<Bar>>;

    /// 來源名稱（記錄在結果的 assumptions 中）
    fn describe(&self) -> String;
}

/// 套用範圍並排序，空結果視為錯誤
pub(crate) fn finalize_bars(symbol: &str, mut bars: Vec<Bar>, range: DateRange) -> DataResult<Vec<Bar>> {
    bars.retain(|bar| range.contains(bar.timestamp));
    bars.sort_by_key(|bar| bar.timestamp);
    bars.dedup_by_key(|bar| bar.timestamp);
    if bars.is_empty() {
        return Err(super::DataError::EmptyRange {
            symbol: symbol.to_string(),
        });
    }
    Ok(bars)
}
