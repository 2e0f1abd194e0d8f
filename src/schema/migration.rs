//! 結果負載遷移
//!
//! 每個歷史結構各有一個升級步驟，`Migrator::migrate` 從偵測到的結構一路串接到
//! 目前結構。所有步驟都是純函數：相同輸入永遠得到相同輸出，已是目前結構的負載
//! 原封不動返回。

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::error::{SchemaError, SchemaResult};
use super::legacy::LegacyKeyTable;
use super::version::{parse_version, PayloadShape};
use crate::contract::fingerprint::legacy_config_hash;
use crate::contract::{CanonicalMetric, EngineIdentity};

static DEFAULT_MIGRATOR: Lazy<Migrator> = Lazy::new(Migrator::default);

/// 以預設對照表遷移負載
pub fn migrate(payload: Value) -> SchemaResult<Value> {
    DEFAULT_MIGRATOR.migrate(payload)
}

/// 判斷負載目前的結構
///
/// 沒有 `schema_version` 的物件視為合約之前的舊版負載。
pub fn detect_shape(payload: &Value) -> SchemaResult<PayloadShape> {
    let object = payload.as_object().ok_or(SchemaError::NotAnObject)?;
    match object.get("schema_version") {
        None | Some(Value::Null) => Ok(PayloadShape::Legacy),
        Some(Value::String(raw)) => PayloadShape::detect(&parse_version(raw)?),
        Some(other) => Err(SchemaError::unparseable(
            "schema_version",
            format!("必須是字串，實際為 {}", other),
        )),
    }
}

/// 負載遷移器
#[derive(Debug, Clone, Default)]
pub struct Migrator {
    key_table: LegacyKeyTable,
}

impl Migrator {
    pub fn new(key_table: LegacyKeyTable) -> Self {
        Self { key_table }
    }

    pub fn key_table(&self) -> &LegacyKeyTable {
        &self.key_table
    }

    /// 把負載升級到目前結構
    pub fn migrate(&self, payload: Value) -> SchemaResult<Value> {
        let mut shape = detect_shape(&payload)?;
        if shape == PayloadShape::CURRENT {
            return Ok(payload);
        }

        let mut current = payload;
        while let Some(next) = shape.next() {
            debug!("升級負載結構 {:?} -> {:?}", shape, next);
            current = self.step(shape, current)?;
            shape = next;
        }
        Ok(current)
    }

    fn step(&self, from: PayloadShape, payload: Value) -> SchemaResult<Value> {
        match from {
            PayloadShape::Legacy => self.upgrade_legacy(payload),
            PayloadShape::V1_0 => upgrade_v1_0(payload),
            PayloadShape::V1_1 => Ok(payload),
        }
    }

    /// 0.x -> 1.0.0：合成元數據、改名統計鍵
    fn upgrade_legacy(&self, payload: Value) -> SchemaResult<Value> {
        let fingerprint = payload.to_string();
        let mut top = match payload {
            Value::Object(map) => map,
            _ => return Err(SchemaError::NotAnObject),
        };
        top.remove("schema_version");

        let mut nested = match top.remove("metadata") {
            Some(Value::Object(map)) => map,
            None | Some(Value::Null) => Map::new(),
            Some(other) => {
                return Err(SchemaError::unparseable(
                    "metadata",
                    format!("必須是物件，實際為 {}", other),
                ))
            }
        };
        let mut fields = LegacyFields {
            nested: &mut nested,
            top: &mut top,
        };

        let mut warnings = fields.take_string_array("warnings")?;

        let strategy_name = fields
            .take_string(&["strategy_name", "strategy"])?
            .unwrap_or_else(|| "unknown".to_string());
        let engine = EngineIdentity::new(
            fields
                .take_string(&["engine_name", "engine"])?
                .unwrap_or_else(|| "legacy".to_string()),
            fields
                .take_string(&["engine_version"])?
                .unwrap_or_else(|| "0.0.0".to_string()),
        );
        let parameters = fields.take(&["parameters", "params"]).filter(|v| !v.is_null());

        let run_id = match fields.take_string(&["run_id"])? {
            Some(id) => id,
            None => synthesize_run_id(&fingerprint),
        };
        let created_at = match fields.take_timestamp(&["created_at", "timestamp"])? {
            Some(ts) => ts,
            None => {
                warnings.push("legacy payload has no created_at; using the Unix epoch".to_string());
                DateTime::<Utc>::UNIX_EPOCH
            }
        };
        let config_hash = match fields.take_string(&["config_hash"])? {
            Some(hash) => hash,
            None => legacy_config_hash(&strategy_name, &engine, parameters.as_ref()),
        };
        let data_snapshot_id = fields.take_string(&["data_snapshot_id", "snapshot_id"])?;
        let random_seed = fields.take_seed(&["random_seed", "seed"])?;

        let stats = match fields.take(&["stats", "metrics"]) {
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(SchemaError::unparseable(
                    "stats",
                    format!("必須是物件，實際為 {}", other),
                ))
            }
            None => {
                return Err(SchemaError::MissingField {
                    field: "stats".to_string(),
                })
            }
        };
        let (metrics, extra_stats) = self.translate_stats(stats, &mut warnings)?;

        let mut assumptions = match fields.take(&["assumptions"]) {
            Some(Value::Object(map)) => map,
            None | Some(Value::Null) => Map::new(),
            Some(other) => {
                return Err(SchemaError::unparseable(
                    "assumptions",
                    format!("必須是物件，實際為 {}", other),
                ))
            }
        };
        let artifacts = fields.take_artifacts()?;

        if !extra_stats.is_empty() {
            assumptions.insert("extra_stats".to_string(), Value::Object(extra_stats));
        }
        if let Some(parameters) = parameters {
            assumptions.entry("parameters").or_insert(parameters);
        }
        let leftovers = fields.into_leftovers();
        if !leftovers.is_empty() {
            assumptions.insert("legacy_fields".to_string(), Value::Object(leftovers));
        }

        let mut metadata = Map::new();
        metadata.insert("run_id".into(), Value::String(run_id));
        metadata.insert("engine_name".into(), Value::String(engine.name));
        metadata.insert("engine_version".into(), Value::String(engine.version));
        metadata.insert("strategy_name".into(), Value::String(strategy_name));
        metadata.insert(
            "created_at".into(),
            Value::String(created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );
        metadata.insert("config_hash".into(), Value::String(config_hash));
        metadata.insert(
            "data_snapshot_id".into(),
            data_snapshot_id.map(Value::String).unwrap_or(Value::Null),
        );
        if let Some(seed) = random_seed {
            metadata.insert("random_seed".into(), Value::from(seed));
        }

        let mut upgraded = Map::new();
        upgraded.insert(
            "schema_version".into(),
            Value::String(PayloadShape::V1_0.stamped_version().to_string()),
        );
        upgraded.insert("metadata".into(), Value::Object(metadata));
        upgraded.insert("metrics".into(), Value::Object(metrics));
        if !assumptions.is_empty() {
            upgraded.insert("assumptions".into(), Value::Object(assumptions));
        }
        if let Some(artifacts) = artifacts {
            upgraded.insert("artifacts".into(), Value::Object(artifacts));
        }
        upgraded.insert(
            "warnings".into(),
            Value::Array(warnings.into_iter().map(Value::String).collect()),
        );
        Ok(Value::Object(upgraded))
    }

    /// 統計鍵改名；返回 (標準指標, 非標準統計)
    fn translate_stats(
        &self,
        stats: Map<String, Value>,
        warnings: &mut Vec<String>,
    ) -> SchemaResult<(Map<String, Value>, Map<String, Value>)> {
        let mut canonical: Vec<(CanonicalMetric, f64)> = Vec::new();
        let mut extra = Map::new();

        for (key, value) in stats {
            let number = value.as_f64().ok_or_else(|| {
                SchemaError::unparseable(format!("stats.{}", key), format!("必須是數字，實際為 {}", value))
            })?;
            match self.key_table.resolve(&key) {
                Some(metric) => {
                    if canonical.iter().any(|(m, _)| *m == metric) {
                        warnings.push(format!(
                            "legacy stat '{}' duplicates {}; keeping the first value",
                            key, metric
                        ));
                    } else {
                        canonical.push((metric, number));
                    }
                }
                None => {
                    extra.insert(key, value);
                }
            }
        }

        let lookup = |metric: CanonicalMetric| {
            canonical
                .iter()
                .find(|(m, _)| *m == metric)
                .map(|(_, v)| *v)
        };
        let starting = lookup(CanonicalMetric::StartingValue).ok_or_else(|| SchemaError::MissingField {
            field: "stats.Starting Value".to_string(),
        })?;
        let ending = lookup(CanonicalMetric::EndingValue).ok_or_else(|| SchemaError::MissingField {
            field: "stats.Ending Value".to_string(),
        })?;

        let mut metrics = Map::new();
        for metric in CanonicalMetric::ALL {
            let value = match lookup(metric) {
                Some(v) => v,
                None if metric == CanonicalMetric::Roi && starting != 0.0 => {
                    let derived = ending / starting - 1.0;
                    if !derived.is_finite() {
                        return Err(SchemaError::NonFiniteValue {
                            field: "stats.Ending Value".to_string(),
                            value: derived,
                        });
                    }
                    warnings.push("legacy payload has no roi; derived from ending/starting value".to_string());
                    derived
                }
                None => {
                    warnings.push(format!("legacy payload has no {}; filled with 0.0", metric));
                    0.0
                }
            };
            metrics.insert(metric.as_str().to_string(), Value::from(value));
        }
        Ok((metrics, extra))
    }
}

/// 1.0.x -> 1.1.0：新增可選欄位 value_history，既有欄位不變
fn upgrade_v1_0(payload: Value) -> SchemaResult<Value> {
    let mut object = match payload {
        Value::Object(map) => map,
        _ => return Err(SchemaError::NotAnObject),
    };
    object.insert(
        "schema_version".into(),
        Value::String(PayloadShape::V1_1.stamped_version().to_string()),
    );
    Ok(Value::Object(object))
}

fn synthesize_run_id(fingerprint: &str) -> String {
    let digest = hex::encode(Sha256::digest(fingerprint.as_bytes()));
    format!("legacy-{}", &digest[..16])
}

/// 舊版負載的欄位來源：先查巢狀 metadata，再查頂層
struct LegacyFields<'a> {
    nested: &'a mut Map<String, Value>,
    top: &'a mut Map<String, Value>,
}

impl LegacyFields<'_> {
    fn take(&mut self, aliases: &[&str]) -> Option<Value> {
        let mut found = None;
        for alias in aliases {
            for source in [&mut *self.nested, &mut *self.top] {
                if let Some(value) = source.remove(*alias) {
                    if found.is_none() {
                        found = Some(value);
                    }
                }
            }
        }
        found
    }

    fn take_string(&mut self, aliases: &[&str]) -> SchemaResult<Option<String>> {
        match self.take(aliases) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(SchemaError::unparseable(
                aliases[0],
                format!("必須是字串，實際為 {}", other),
            )),
        }
    }

    fn take_timestamp(&mut self, aliases: &[&str]) -> SchemaResult<Option<DateTime<Utc>>> {
        match self.take(aliases) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw.trim())
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(|e| SchemaError::unparseable(aliases[0], e.to_string())),
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .map(Some)
                .ok_or_else(|| SchemaError::unparseable(aliases[0], format!("無效的 Unix 秒數 {}", n))),
            Some(other) => Err(SchemaError::unparseable(
                aliases[0],
                format!("必須是 RFC 3339 字串，實際為 {}", other),
            )),
        }
    }

    fn take_seed(&mut self, aliases: &[&str]) -> SchemaResult<Option<u64>> {
        match self.take(aliases) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| SchemaError::unparseable(aliases[0], format!("必須是非負整數，實際為 {}", n))),
            Some(other) => Err(SchemaError::unparseable(
                aliases[0],
                format!("必須是非負整數，實際為 {}", other),
            )),
        }
    }

    fn take_string_array(&mut self, field: &str) -> SchemaResult<Vec<String>> {
        match self.take(&[field]) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    other => Err(SchemaError::unparseable(
                        field,
                        format!("元素必須是字串，實際為 {}", other),
                    )),
                })
                .collect(),
            Some(other) => Err(SchemaError::unparseable(
                field,
                format!("必須是字串陣列，實際為 {}", other),
            )),
        }
    }

    fn take_artifacts(&mut self) -> SchemaResult<Option<Map<String, Value>>> {
        match self.take(&["artifacts"]) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => {
                if let Some((name, _)) = map.iter().find(|(_, v)| !v.is_string()) {
                    return Err(SchemaError::unparseable(
                        format!("artifacts.{}", name),
                        "必須是字串",
                    ));
                }
                Ok(Some(map))
            }
            Some(other) => Err(SchemaError::unparseable(
                "artifacts",
                format!("必須是物件，實際為 {}", other),
            )),
        }
    }

    /// 其餘未使用的欄位，巢狀 metadata 的欄位優先
    fn into_leftovers(self) -> Map<String, Value> {
        let mut leftovers = std::mem::take(self.top);
        for (key, value) in std::mem::take(self.nested) {
            leftovers.insert(key, value);
        }
        leftovers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn legacy_payload() -> Value {
        json!({
            "strategy": "sma_crossover",
            "engine": "event-driven",
            "engine_version": "0.9.2",
            "created_at": "2023-06-01T12:00:00Z",
            "parameters": {"fast": 5, "slow": 20},
            "stats": {
                "Starting Value": 10000.0,
                "Ending Value": 12500.0,
                "CAGR": 0.118,
                "Sharpe Ratio": 1.4,
                "Max. Drawdown": 0.07,
                "Cash Utilization": 0.8,
                "Trades": 14
            }
        })
    }

    #[test]
    fn test_legacy_payload_is_upgraded_to_current() {
        let migrated = migrate(legacy_payload()).unwrap();

        assert_eq!(migrated["schema_version"], json!("1.1.0"));
        assert_eq!(migrated["metadata"]["strategy_name"], json!("sma_crossover"));
        assert_eq!(migrated["metadata"]["engine_name"], json!("event-driven"));
        assert_eq!(migrated["metadata"]["engine_version"], json!("0.9.2"));
        assert_eq!(migrated["metadata"]["created_at"], json!("2023-06-01T12:00:00Z"));
        assert_eq!(migrated["metrics"]["starting_value"], json!(10000.0));
        assert_eq!(migrated["metrics"]["ending_value"], json!(12500.0));
        assert_eq!(migrated["metrics"]["sharpe"], json!(1.4));
        assert_eq!(migrated["metrics"]["max_drawdown"], json!(0.07));
        assert_eq!(migrated["metrics"]["mean_cash_utilization"], json!(0.8));
        assert_eq!(migrated["assumptions"]["extra_stats"]["Trades"], json!(14));
        assert_eq!(migrated["assumptions"]["parameters"]["slow"], json!(20));
    }

    #[test]
    fn test_missing_roi_is_derived() {
        let migrated = migrate(legacy_payload()).unwrap();
        let roi = migrated["metrics"]["roi"].as_f64().unwrap();
        assert!((roi - 0.25).abs() < 1e-12);
        let warnings = migrated["warnings"].as_array().unwrap();
        assert!(warnings.iter().any(|w| w.as_str().unwrap().contains("roi")));
    }

    #[test]
    fn test_missing_metric_filled_with_warning() {
        let payload = json!({
            "stats": {"Starting Value": 100.0, "Ending Value": 90.0}
        });
        let migrated = migrate(payload).unwrap();

        assert_eq!(migrated["metrics"]["sharpe"], json!(0.0));
        assert_eq!(migrated["metadata"]["strategy_name"], json!("unknown"));
        assert_eq!(migrated["metadata"]["engine_name"], json!("legacy"));
        assert_eq!(migrated["metadata"]["created_at"], json!("1970-01-01T00:00:00Z"));
        let warnings: Vec<&str> = migrated["warnings"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(warnings.iter().any(|w| w.contains("sharpe")));
        assert!(warnings.iter().any(|w| w.contains("created_at")));
    }

    #[test]
    fn test_synthesized_identity_is_deterministic() {
        let first = migrate(legacy_payload()).unwrap();
        let second = migrate(legacy_payload()).unwrap();
        assert_eq!(first, second);

        let run_id = first["metadata"]["run_id"].as_str().unwrap();
        assert!(run_id.starts_with("legacy-"));
        assert_eq!(run_id.len(), "legacy-".len() + 16);
        assert_eq!(first["metadata"]["config_hash"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn test_migration_is_idempotent() {
        let once = migrate(legacy_payload()).unwrap();
        let twice = migrate(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_nested_metadata_takes_precedence() {
        let payload = json!({
            "strategy": "top_level",
            "metadata": {"strategy_name": "nested", "run_id": "abc", "note": "kept"},
            "stats": {"Starting Value": 1.0, "Ending Value": 1.0}
        });
        let migrated = migrate(payload).unwrap();
        assert_eq!(migrated["metadata"]["strategy_name"], json!("nested"));
        assert_eq!(migrated["metadata"]["run_id"], json!("abc"));
        assert_eq!(migrated["assumptions"]["legacy_fields"]["note"], json!("kept"));
    }

    #[test]
    fn test_duplicate_stat_keeps_first_and_warns() {
        let payload = json!({
            "stats": {"Ending Value": 2.0, "Return": 1.0, "Starting Value": 1.0, "Total Return": 0.5}
        });
        let migrated = migrate(payload).unwrap();
        assert_eq!(migrated["metrics"]["roi"], json!(1.0));
        assert!(migrated["warnings"]
            .as_array()
            .unwrap()
            .iter()
            .any(|w| w.as_str().unwrap().contains("Total Return")));
    }

    #[test]
    fn test_missing_starting_value_names_field() {
        let err = migrate(json!({"stats": {"Ending Value": 5.0}})).unwrap_err();
        assert_matches!(&err, SchemaError::MissingField { field } if field == "stats.Starting Value");
        assert_eq!(err.field(), Some("stats.Starting Value"));
    }

    #[test]
    fn test_overflowing_derived_roi_names_ending_value() {
        let err = migrate(json!({"stats": {"Starting Value": 1e-300, "Ending Value": 1e300}})).unwrap_err();
        assert_matches!(&err, SchemaError::NonFiniteValue { value, .. } if value.is_infinite());
        assert_eq!(err.field(), Some("stats.Ending Value"));
    }

    #[test]
    fn test_non_numeric_stat_is_rejected() {
        let err = migrate(json!({"stats": {"Starting Value": "lots", "Ending Value": 5.0}})).unwrap_err();
        assert_eq!(err.field(), Some("stats.Starting Value"));
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        assert_matches!(migrate(json!([1, 2, 3])), Err(SchemaError::NotAnObject));
    }

    #[test]
    fn test_v1_0_payload_is_restamped() {
        let payload = json!({"schema_version": "1.0.0", "metadata": {}, "metrics": {}});
        let migrated = migrate(payload).unwrap();
        assert_eq!(migrated["schema_version"], json!("1.1.0"));
        assert_eq!(migrated["metadata"], json!({}));
    }

    #[test]
    fn test_newer_minor_is_returned_unchanged() {
        let payload = json!({"schema_version": "1.4.0", "metrics": {}, "future_field": true});
        assert_eq!(migrate(payload.clone()).unwrap(), payload);
    }

    #[test]
    fn test_incompatible_major_is_rejected() {
        let err = migrate(json!({"schema_version": "2.0.0"})).unwrap_err();
        assert_matches!(err, SchemaError::IncompatibleVersion { .. });
    }

    #[test]
    fn test_custom_synonym_is_used() {
        let migrator = Migrator::new(
            LegacyKeyTable::default().with_synonym("Equity Final [$]", CanonicalMetric::EndingValue),
        );
        let migrated = migrator
            .migrate(json!({"stats": {"Starting Value": 1.0, "Equity Final [$]": 3.0}}))
            .unwrap();
        assert_eq!(migrated["metrics"]["ending_value"], json!(3.0));
    }
}
