use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 標準績效指標
///
/// 封閉集合：每個適配器都必須填滿全部指標。新增指標需要升級次版本號，
/// 移除指標需要升級主版本號。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalMetric {
    /// 起始資產價值
    StartingValue,
    /// 期末資產價值
    EndingValue,
    /// 總報酬率（小數，0.25 代表 +25%）
    Roi,
    /// 年化複合成長率
    Cagr,
    /// 年化夏普比率（每年 252 期）
    Sharpe,
    /// 最大回撤（正數小數）
    MaxDrawdown,
    /// 平均資金使用率
    MeanCashUtilization,
}

impl CanonicalMetric {
    pub const ALL: [CanonicalMetric; 7] = [
        CanonicalMetric::StartingValue,
        CanonicalMetric::EndingValue,
        CanonicalMetric::Roi,
        CanonicalMetric::Cagr,
        CanonicalMetric::Sharpe,
        CanonicalMetric::MaxDrawdown,
        CanonicalMetric::MeanCashUtilization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalMetric::StartingValue => "starting_value",
            CanonicalMetric::EndingValue => "ending_value",
            CanonicalMetric::Roi => "roi",
            CanonicalMetric::Cagr => "cagr",
            CanonicalMetric::Sharpe => "sharpe",
            CanonicalMetric::MaxDrawdown => "max_drawdown",
            CanonicalMetric::MeanCashUtilization => "mean_cash_utilization",
        }
    }

    /// 依標準名稱查找（只接受精確的 snake_case 名稱）
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.as_str() == name)
    }
}

impl fmt::Display for CanonicalMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CanonicalMetric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CanonicalMetric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        CanonicalMetric::from_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("未知的標準指標: {}", name)))
    }
}

/// 標準指標集合
///
/// 鍵的型別就是 [`CanonicalMetric`]，因此集合內不可能出現引擎原生名稱。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSet(BTreeMap<CanonicalMetric, f64>);

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, metric: CanonicalMetric, value: f64) -> Option<f64> {
        self.0.insert(metric, value)
    }

    pub fn with(mut self, metric: CanonicalMetric, value: f64) -> Self {
        self.insert(metric, value);
        self
    }

    pub fn get(&self, metric: CanonicalMetric) -> Option<f64> {
        self.0.get(&metric).copied()
    }

    /// 缺少的標準指標（依標準順序）
    pub fn missing(&self) -> Vec<CanonicalMetric> {
        CanonicalMetric::ALL
            .iter()
            .copied()
            .filter(|m| !self.0.contains_key(m))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.0.len() == CanonicalMetric::ALL.len()
    }

    /// 第一個非有限值的指標
    pub fn first_non_finite(&self) -> Option<(CanonicalMetric, f64)> {
        self.0
            .iter()
            .find(|(_, v)| !v.is_finite())
            .map(|(m, v)| (*m, *v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalMetric, f64)> + '_ {
        self.0.iter().map(|(m, v)| (*m, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(CanonicalMetric, f64)> for MetricSet {
    fn from_iter<T: IntoIterator<Item = (CanonicalMetric, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
