// 引擎原生統計 -> 標準結果
//
// 與舊版負載共用同一張對照表，原生名稱只在這裡出現一次。

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::contract::{BacktestRunMetadata, BacktestRunResult, MetricSet};
use crate::schema::{LegacyKeyTable, SchemaError, SchemaResult};

/// 以引擎原生統計表建立結果
///
/// 所有標準指標都必須能從 `stats` 對應出來，否則返回 `MissingMetrics`；
/// 對應不到的統計保留在 `assumptions["extra_stats"]`。
pub fn result_from_native_stats(
    metadata: BacktestRunMetadata,
    stats: &BTreeMap<String, f64>,
    key_table: &LegacyKeyTable,
) -> SchemaResult<BacktestRunResult> {
    let mut metrics = MetricSet::new();
    let mut extra = Map::new();
    let mut warnings = Vec::new();

    for (key, value) in stats {
        match key_table.resolve(key) {
            Some(metric) => {
                if !value.is_finite() {
                    return Err(SchemaError::NonFiniteValue {
                        field: format!("stats.{}", key),
                        value: *value,
                    });
                }
                if metrics.get(metric).is_some() {
                    warnings.push(format!(
                        "native stat '{}' duplicates {}; keeping the first value",
                        key, metric
                    ));
                } else {
                    metrics.insert(metric, *value);
                }
            }
            None if !value.is_finite() => {
                // JSON 無法表示非有限數，保留下來只會變成 null
                warnings.push(format!("native stat '{}' is not finite ({}); dropped", key, value));
            }
            None => {
                extra.insert(key.clone(), Value::from(*value));
            }
        }
    }

    let missing = metrics.missing();
    if !missing.is_empty() {
        return Err(SchemaError::MissingMetrics {
            metrics: missing.iter().map(|m| m.as_str().to_string()).collect(),
        });
    }

    let mut result = BacktestRunResult::new(metadata, metrics);
    if !extra.is_empty() {
        result = result.with_assumption("extra_stats", Value::Object(extra));
    }
    for warning in warnings {
        result = result.with_warning(warning);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{BacktestRunRequest, CanonicalMetric, EngineIdentity};
    use assert_matches::assert_matches;

    fn metadata() -> BacktestRunMetadata {
        let request = BacktestRunRequest::builder("buy_and_hold", ["AAA"], 1_000.0)
            .build()
            .unwrap();
        BacktestRunMetadata::begin_run(&request, &EngineIdentity::new("event-driven", "1.0.0"))
    }

    fn native_stats() -> BTreeMap<String, f64> {
        [
            ("Starting Value", 1_000.0),
            ("Ending Value", 1_100.0),
            ("Return", 0.1),
            ("CAGR", 0.2),
            ("Sharpe", 1.1),
            ("Max Drawdown", 0.05),
            ("Cash Utilization", 0.9),
            ("Trades", 3.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn test_native_names_are_translated() {
        let result =
            result_from_native_stats(metadata(), &native_stats(), &LegacyKeyTable::default()).unwrap();
        assert!(result.metrics.is_complete());
        assert_eq!(result.metrics.get(CanonicalMetric::EndingValue), Some(1_100.0));
        assert_eq!(result.metrics.get(CanonicalMetric::MeanCashUtilization), Some(0.9));
        assert_eq!(
            result.assumption("extra_stats"),
            Some(&serde_json::json!({"Trades": 3.0}))
        );
    }

    #[test]
    fn test_non_finite_extra_stat_is_dropped_with_warning() {
        let mut stats = native_stats();
        stats.insert("Profit Factor".to_string(), f64::INFINITY);
        stats.insert("Sortino".to_string(), f64::NAN);
        let result = result_from_native_stats(metadata(), &stats, &LegacyKeyTable::default()).unwrap();

        assert_eq!(
            result.assumption("extra_stats"),
            Some(&serde_json::json!({"Trades": 3.0}))
        );
        assert_eq!(result.warnings.len(), 2);
        assert!(result.warnings.iter().any(|w| w.contains("'Profit Factor'")));
        assert!(result.warnings.iter().any(|w| w.contains("'Sortino'")));
    }

    #[test]
    fn test_incomplete_native_stats_fail() {
        let mut stats = native_stats();
        stats.remove("Sharpe");
        let err = result_from_native_stats(metadata(), &stats, &LegacyKeyTable::default()).unwrap_err();
        assert_matches!(err, SchemaError::MissingMetrics { ref metrics } if metrics == &vec!["sharpe".to_string()]);
    }
}
