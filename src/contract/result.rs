use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metadata::BacktestRunMetadata;
use super::metrics::MetricSet;
use crate::schema::version::RESULT_SCHEMA_VERSION;

/// 資產價值時間序列上的一個點
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuePoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl ValuePoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// 回測執行結果
///
/// 每次成功的嘗試恰好產生一個結果，產生後不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRunResult {
    pub schema_version: String,
    pub metadata: BacktestRunMetadata,
    pub metrics: MetricSet,
    /// 引擎特有的執行假設（佣金、部位計算、成交模型…），不參與一致性比較
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumptions: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// 完整的資產價值歷史（1.1.0 起）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_history: Option<Vec<ValuePoint>>,
}

impl BacktestRunResult {
    /// 以目前的結構版本建立結果
    pub fn new(metadata: BacktestRunMetadata, metrics: MetricSet) -> Self {
        Self {
            schema_version: RESULT_SCHEMA_VERSION.to_string(),
            metadata,
            metrics,
            assumptions: None,
            artifacts: None,
            warnings: Vec::new(),
            value_history: None,
        }
    }

    pub fn with_assumption(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.assumptions
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_artifact(mut self, name: impl Into<String>, reference: impl Into<String>) -> Self {
        self.artifacts
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), reference.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_value_history(mut self, history: Vec<ValuePoint>) -> Self {
        self.value_history = Some(history);
        self
    }

    pub fn assumption(&self, key: &str) -> Option<&serde_json::Value> {
        self.assumptions.as_ref().and_then(|a| a.get(key))
    }
}
