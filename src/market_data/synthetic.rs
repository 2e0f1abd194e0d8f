use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use super::source::finalize_bars;
use super::{Bar, DataResult, DateRange, MarketDataSource};

/// 以種子決定的隨機漫步行情
///
/// 同一個 (商品, 快照) 永遠產生同一條序列，與查詢範圍無關；
/// 快照編號只是種子的一部分，因此任何快照編號都可用。
#[derive(Debug, Clone)]
pub struct SyntheticDataSource {
    origin: DateTime<Utc>,
    bar_count: usize,
    initial_price: f64,
    drift: f64,
    volatility: f64,
}

impl Default for SyntheticDataSource {
    fn default() -> Self {
        Self {
            origin: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single().unwrap_or_default(),
            bar_count: 756,
            initial_price: 100.0,
            drift: 0.0003,
            volatility: 0.012,
        }
    }
}

impl SyntheticDataSource {
    pub fn new(origin: DateTime<Utc>, bar_count: usize) -> Self {
        Self {
            origin,
            bar_count,
            ..Self::default()
        }
    }

    pub fn with_dynamics(mut self, initial_price: f64, drift: f64, volatility: f64) -> Self {
        self.initial_price = initial_price;
        self.drift = drift;
        self.volatility = volatility;
        self
    }

    fn seed(symbol: &str, snapshot_id: Option<&str>) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(symbol.as_bytes());
        hasher.update(b"|");
        hasher.update(snapshot_id.unwrap_or("live").as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes)
    }

    fn generate(&self, symbol: &str, snapshot_id: Option<&str>) -> Vec<Bar> {
        let mut rng = StdRng::seed_from_u64(Self::seed(symbol, snapshot_id));
        let mut previous = self.initial_price;
        let mut bars = Vec::with_capacity(self.bar_count);

        for day in 0..self.bar_count {
            // Box-Muller
            let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
            let u2: f64 = rng.random();
            let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();

            let open = previous;
            let close = open * (self.drift + self.volatility * z).exp();
            let wick: f64 = rng.random_range(0.0..0.004);
            bars.push(Bar {
                timestamp: self.origin + Duration::days(day as i64),
                open,
                high: open.max(close) * (1.0 + wick),
                low: open.min(close) * (1.0 - wick),
                close,
                volume: rng.random_range(1_000.0..5_000.0_f64).round(),
            });
            previous = close;
        }
        bars
    }
}

#[async_trait]
impl MarketDataSource for SyntheticDataSource {
    async fn load_bars(
        &self,
        symbol: &str,
        range: DateRange,
        snapshot_id: Option<&str>,
    ) -> DataResult<Vec<Bar>> {
        finalize_bars(symbol, self.generate(symbol, snapshot_id), range)
    }

    fn describe(&self) -> String {
        format!("synthetic:{}x{}", self.origin.date_naive(), self.bar_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_seed_same_series() {
        let source = SyntheticDataSource::default();
        let a = source.load_bars("AAA", DateRange::unbounded(), Some("s1")).await.unwrap();
        let b = source.load_bars("AAA", DateRange::unbounded(), Some("s1")).await.unwrap();
        let c = source.load_bars("AAA", DateRange::unbounded(), Some("s2")).await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 756);
        assert!(a.iter().all(Bar::is_valid));
    }

    #[tokio::test]
    async fn test_range_does_not_change_values() {
        let source = SyntheticDataSource::default();
        let full = source.load_bars("AAA", DateRange::unbounded(), None).await.unwrap();
        let tail = source
            .load_bars("AAA", DateRange::new(Some(full[10].timestamp), None), None)
            .await
            .unwrap();
        assert_eq!(&full[10..], &tail[..]);
    }
}
