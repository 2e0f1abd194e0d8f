//! CSV 快照目錄
//!
//! 目錄結構：`<root>/<snapshot_id>/<SYMBOL>.csv`，即時數據位於 `<root>/live/`。
//! 欄位為 `timestamp,open,high,low,close,volume`，時間為 RFC 3339。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::source::finalize_bars;
use super::{Bar, DataError, DataResult, DateRange, MarketDataSource};
use crate::contract::request::is_plain_symbol;

pub const LIVE_DIRECTORY: &str = "live";

#[derive(Debug, Clone)]
pub struct CsvSnapshotSource {
    root: PathBuf,
}

impl CsvSnapshotSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn directory(&self, snapshot_id: Option<&str>) -> DataResult<PathBuf> {
        let name = match snapshot_id {
            Some(id) => {
                let valid = !id.is_empty()
                    && id != LIVE_DIRECTORY
                    && id
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
                    && !id.starts_with('.');
                if !valid {
                    return Err(DataError::UnknownSnapshot {
                        snapshot_id: id.to_string(),
                    });
                }
                id
            }
            None => LIVE_DIRECTORY,
        };
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Err(match snapshot_id {
                Some(id) => DataError::UnknownSnapshot {
                    snapshot_id: id.to_string(),
                },
                None => DataError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("找不到即時數據目錄 {}", dir.display()),
                )),
            });
        }
        Ok(dir)
    }
}

fn read_bars(path: &Path) -> DataResult<Vec<Bar>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| malformed(path, e))?;

    let mut bars = Vec::new();
    for row in reader.deserialize::<Bar>() {
        bars.push(row.map_err(|e| malformed(path, e))?);
    }
    Ok(bars)
}

fn malformed(path: &Path, error: csv::Error) -> DataError {
    let location = match error.position() {
        Some(pos) => format!("{}:{}", path.display(), pos.line()),
        None => path.display().to_string(),
    };
    match error.into_kind() {
        csv::ErrorKind::Io(io) => DataError::Io(io),
        other => DataError::Malformed {
            location,
            message: format!("{:?}", other),
        },
    }
}

#[async_trait]
impl MarketDataSource for CsvSnapshotSource {
    async fn load_bars(
        &self,
        symbol: &str,
        range: DateRange,
        snapshot_id: Option<&str>,
    ) -> DataResult<Vec<Bar>> {
        if !is_plain_symbol(symbol) {
            return Err(DataError::UnknownSymbol {
                symbol: symbol.to_string(),
            });
        }
        let path = self.directory(snapshot_id)?.join(format!("{}.csv", symbol));
        if !path.is_file() {
            return Err(DataError::UnknownSymbol {
                symbol: symbol.to_string(),
            });
        }
        debug!("讀取 CSV 行情 {}", path.display());

        let bars = tokio::task::spawn_blocking(move || read_bars(&path))
            .await
            .map_err(|e| DataError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
        finalize_bars(symbol, bars, range)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::fs;

    const CSV: &str = "timestamp,open,high,low,close,volume\n\
        2024-01-03T00:00:00Z,10.5,11,10,10.8,1200\n\
        2024-01-02T00:00:00Z,10,10.6,9.9,10.5,1000\n";

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("snap-1")).unwrap();
        fs::create_dir_all(dir.path().join("live")).unwrap();
        fs::write(dir.path().join("snap-1/AAA.csv"), CSV).unwrap();
        fs::write(dir.path().join("live/BBB.csv"), CSV).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_reads_snapshot_in_time_order() {
        let dir = fixture();
        let source = CsvSnapshotSource::new(dir.path());

        let bars = source
            .load_bars("AAA", DateRange::unbounded(), Some("snap-1"))
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 10.5);
        assert_eq!(bars[1].volume, 1200.0);
    }

    #[tokio::test]
    async fn test_snapshot_and_live_are_isolated() {
        let dir = fixture();
        let source = CsvSnapshotSource::new(dir.path());

        assert_matches!(
            source.load_bars("BBB", DateRange::unbounded(), Some("snap-1")).await,
            Err(DataError::UnknownSymbol { .. })
        );
        assert_matches!(
            source.load_bars("AAA", DateRange::unbounded(), Some("missing")).await,
            Err(DataError::UnknownSnapshot { .. })
        );
        assert_matches!(
            source.load_bars("AAA", DateRange::unbounded(), Some("../snap-1")).await,
            Err(DataError::UnknownSnapshot { .. })
        );
        assert_matches!(
            source.load_bars("../live/BBB", DateRange::unbounded(), Some("snap-1")).await,
            Err(DataError::UnknownSymbol { .. })
        );
        assert_matches!(
            source.load_bars("../snap-1/AAA", DateRange::unbounded(), None).await,
            Err(DataError::UnknownSymbol { .. })
        );
        assert!(source.load_bars("BBB", DateRange::unbounded(), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_row_reports_location() {
        let dir = fixture();
        fs::write(
            dir.path().join("snap-1/BAD.csv"),
            "timestamp,open,high,low,close,volume\nnot-a-date,1,1,1,1,1\n",
        )
        .unwrap();
        let source = CsvSnapshotSource::new(dir.path());

        let err = source
            .load_bars("BAD", DateRange::unbounded(), Some("snap-1"))
            .await
            .unwrap_err();
        assert_matches!(err, DataError::Malformed { ref location, .. } if location.contains("BAD.csv"));
    }
}
