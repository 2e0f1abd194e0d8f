use std::collections::HashMap;

use crate::contract::CanonicalMetric;

use super::error::{SchemaError, SchemaResult};

/// 舊版統計名稱 -> 標準指標對照表
///
/// 查找時忽略大小寫、空白與標點（`%` 除外），因此 `Max. Drawdown`、
/// `max drawdown`、`MAX_DRAWDOWN` 都會落到同一個鍵。
#[derive(Debug, Clone)]
pub struct LegacyKeyTable {
    entries: HashMap<String, CanonicalMetric>,
}

const DEFAULT_SYNONYMS: &[(&str, CanonicalMetric)] = &[
    ("Starting Value", CanonicalMetric::StartingValue),
    ("Start Value", CanonicalMetric::StartingValue),
    ("Ending Value", CanonicalMetric::EndingValue),
    ("End Value", CanonicalMetric::EndingValue),
    ("Final Value", CanonicalMetric::EndingValue),
    ("Return", CanonicalMetric::Roi),
    ("Total Return", CanonicalMetric::Roi),
    ("ROI", CanonicalMetric::Roi),
    ("CAGR", CanonicalMetric::Cagr),
    ("Annual Return", CanonicalMetric::Cagr),
    ("Sharpe", CanonicalMetric::Sharpe),
    ("Sharpe Ratio", CanonicalMetric::Sharpe),
    ("Max Drawdown", CanonicalMetric::MaxDrawdown),
    ("Max. Drawdown", CanonicalMetric::MaxDrawdown),
    ("Mean Cash Utilization", CanonicalMetric::MeanCashUtilization),
    ("Cash Utilization", CanonicalMetric::MeanCashUtilization),
];

fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric() || *c == '%')
        .flat_map(char::to_lowercase)
        .collect()
}

impl Default for LegacyKeyTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for metric in CanonicalMetric::ALL {
            table.insert(metric.as_str(), metric);
        }
        for (synonym, metric) in DEFAULT_SYNONYMS {
            table.insert(synonym, *metric);
        }
        table
    }
}

impl LegacyKeyTable {
    /// 沒有任何對照的空表（標準名稱也不會自動對應）
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, synonym: &str, metric: CanonicalMetric) {
        self.entries.insert(normalize(synonym), metric);
    }

    /// 新增同義詞；已存在的同義詞會被覆蓋
    pub fn with_synonym(mut self, synonym: &str, metric: CanonicalMetric) -> Self {
        self.insert(synonym, metric);
        self
    }

    /// 以標準名稱字串新增同義詞（例如從設定檔讀入）
    pub fn try_with_synonym(self, synonym: &str, target: &str) -> SchemaResult<Self> {
        let metric = CanonicalMetric::from_name(target.trim()).ok_or_else(|| {
            SchemaError::UnknownSynonymTarget {
                synonym: synonym.to_string(),
                target: target.to_string(),
            }
        })?;
        Ok(self.with_synonym(synonym, metric))
    }

    pub fn resolve(&self, key: &str) -> Option<CanonicalMetric> {
        self.entries.get(&normalize(key)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
