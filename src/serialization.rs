//! 結果序列化
//!
//! 寫出時一律蓋上目前的結構版本並要求完整的標準指標集合；
//! 讀入時一律先遷移，因此呼叫端只會看到目前結構的 [`BacktestRunResult`]。

pub mod native;

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::contract::BacktestRunResult;
use crate::schema::{Migrator, SchemaError, SchemaResult, RESULT_SCHEMA_VERSION};

pub use native::result_from_native_stats;

/// 寫出前的檢查：缺少或非有限的指標都會被拒絕
fn ensure_writable(result: &BacktestRunResult) -> SchemaResult<()> {
    let missing = result.metrics.missing();
    if !missing.is_empty() {
        return Err(SchemaError::MissingMetrics {
            metrics: missing.iter().map(|m| m.as_str().to_string()).collect(),
        });
    }
    if let Some((metric, value)) = result.metrics.first_non_finite() {
        return Err(SchemaError::NonFiniteValue {
            field: format!("metrics.{}", metric),
            value,
        });
    }
    if let Some(history) = &result.value_history {
        if let Some((index, point)) = history.iter().enumerate().find(|(_, p)| !p.value.is_finite()) {
            return Err(SchemaError::NonFiniteValue {
                field: format!("value_history[{}]", index),
                value: point.value,
            });
        }
    }
    Ok(())
}

/// 結果 -> 目前結構的 JSON 負載
pub fn to_payload(result: &BacktestRunResult) -> SchemaResult<Value> {
    ensure_writable(result)?;
    let mut payload = serde_json::to_value(result)?;
    if let Value::Object(map) = &mut payload {
        map.insert(
            "schema_version".to_string(),
            Value::String(RESULT_SCHEMA_VERSION.to_string()),
        );
    }
    Ok(payload)
}

pub fn to_json_string(result: &BacktestRunResult) -> SchemaResult<String> {
    Ok(serde_json::to_string_pretty(&to_payload(result)?)?)
}

/// 任意版本的負載 -> 結果（先遷移）
pub fn from_payload(payload: Value) -> SchemaResult<BacktestRunResult> {
    from_payload_with(&Migrator::default(), payload)
}

/// 以指定的遷移器（例如擴充過同義詞表）讀入負載
pub fn from_payload_with(migrator: &Migrator, payload: Value) -> SchemaResult<BacktestRunResult> {
    let migrated = migrator.migrate(payload)?;
    let result: BacktestRunResult = serde_json::from_value(migrated)?;
    debug!(
        "讀入結果 run_id={} schema_version={}",
        result.metadata.run_id, result.schema_version
    );
    Ok(result)
}

pub fn from_json_str(raw: &str) -> SchemaResult<BacktestRunResult> {
    from_payload(serde_json::from_str(raw)?)
}

/// 寫出結果檔（格式化 JSON）
pub fn write_result(path: impl AsRef<Path>, result: &BacktestRunResult) -> SchemaResult<()> {
    let body = to_json_string(result)?;
    std::fs::write(path.as_ref(), body)?;
    Ok(())
}

/// 讀入結果檔（任意版本）
pub fn read_result(path: impl AsRef<Path>) -> SchemaResult<BacktestRunResult> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    from_json_str(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{
        BacktestRunMetadata, BacktestRunRequest, CanonicalMetric, EngineIdentity, MetricSet,
    };
    use assert_matches::assert_matches;

    fn complete_result() -> BacktestRunResult {
        let request = BacktestRunRequest::builder("buy_and_hold", ["AAA"], 1_000.0)
            .build()
            .unwrap();
        let metadata =
            BacktestRunMetadata::begin_run(&request, &EngineIdentity::new("event-driven", "1.0.0"));
        let metrics = CanonicalMetric::ALL.iter().map(|m| (*m, 0.5)).collect::<MetricSet>();
        BacktestRunResult::new(metadata, metrics)
    }

    #[test]
    fn test_payload_round_trip() {
        let result = complete_result().with_warning("note");
        let payload = to_payload(&result).unwrap();
        assert_eq!(payload["schema_version"], serde_json::json!(RESULT_SCHEMA_VERSION));
        assert_eq!(from_payload(payload).unwrap(), result);
    }

    #[test]
    fn test_missing_metric_refused_on_write() {
        let mut result = complete_result();
        result.metrics = MetricSet::new().with(CanonicalMetric::Roi, 0.1);
        let err = to_payload(&result).unwrap_err();
        assert_matches!(err, SchemaError::MissingMetrics { ref metrics } if metrics.len() == 6);
    }

    #[test]
    fn test_non_finite_metric_refused_on_write() {
        let mut result = complete_result();
        result.metrics.insert(CanonicalMetric::Sharpe, f64::NAN);
        let err = to_payload(&result).unwrap_err();
        assert_eq!(err.field(), Some("metrics.sharpe"));
    }

    #[test]
    fn test_garbage_json_is_an_error() {
        assert_matches!(from_json_str("{not json"), Err(SchemaError::Json(_)));
    }
}
