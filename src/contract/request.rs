use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use semver::Version;

use super::error::ValidationError;
use crate::schema::version::{is_compatible, request_contract_version, REQUEST_CONTRACT_VERSION};

/// 策略參數值
///
/// 合約只允許基本型別，讓任何引擎都能無損地接收參數。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// 以浮點數讀取（整數會被轉換）
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// 以整數讀取；浮點數只有在沒有小數部分時才接受
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// 類型名稱，用於錯誤訊息與雜湊標記
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            // 負零與正零視為相同
            ParamValue::Float(v) => write!(f, "{}", if *v == 0.0 { 0.0 } else { *v }),
            ParamValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// 回測執行請求
///
/// 由呼叫端建立一次後即不可變。建構（包含反序列化）時會驗證全部不變式，
/// 因此持有一個 `BacktestRunRequest` 就代表它已經是合法的請求。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRunRequest")]
pub struct BacktestRunRequest {
    strategy_name: String,
    symbols: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<DateTime<Utc>>,
    initial_cash: f64,
    parameters: BTreeMap<String, ParamValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_snapshot_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    random_seed: Option<u64>,
}

/// 反序列化用的未驗證請求
#[derive(Debug, Clone, Default, Deserialize)]
struct RawRunRequest {
    strategy_name: String,
    symbols: Vec<String>,
    #[serde(default)]
    start: Option<DateTime<Utc>>,
    #[serde(default)]
    end: Option<DateTime<Utc>>,
    initial_cash: f64,
    #[serde(default)]
    parameters: BTreeMap<String, ParamValue>,
    #[serde(default)]
    data_snapshot_id: Option<String>,
    #[serde(default)]
    random_seed: Option<u64>,
    /// 呼叫端宣告的合約版本，省略時視為目前版本
    #[serde(default)]
    contract_version: Option<String>,
}

/// 商品代碼會被行情來源拿來組檔名，因此不可含路徑成分
pub(crate) fn is_plain_symbol(symbol: &str) -> bool {
    !symbol.starts_with('.')
        && !symbol.contains("..")
        && !symbol.chars().any(|c| c == '/' || c == '\\' || c.is_control())
}

impl TryFrom<RawRunRequest> for BacktestRunRequest {
    type Error = ValidationError;

    fn try_from(raw: RawRunRequest) -> Result<Self, Self::Error> {
        if let Some(declared) = &raw.contract_version {
            let current = request_contract_version();
            let compatible = Version::parse(declared.trim())
                .map(|v| is_compatible(&v, &current))
                .unwrap_or(false);
            if !compatible {
                return Err(ValidationError::invalid(
                    "contract_version",
                    format!("{:?} 與目前合約 {} 不相容", declared, REQUEST_CONTRACT_VERSION),
                ));
            }
        }

        if raw.strategy_name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "strategy_name".to_string(),
            });
        }

        if raw.symbols.is_empty() {
            return Err(ValidationError::MissingField {
                field: "symbols".to_string(),
            });
        }
        let mut seen = HashSet::with_capacity(raw.symbols.len());
        for symbol in &raw.symbols {
            if symbol.trim().is_empty() {
                return Err(ValidationError::invalid("symbols", "商品代碼不可為空白"));
            }
            if !is_plain_symbol(symbol) {
                return Err(ValidationError::invalid(
                    "symbols",
                    format!("商品代碼 {:?} 不可含路徑分隔符、`..` 或以 `.` 開頭", symbol),
                ));
            }
            if !seen.insert(symbol.as_str()) {
                return Err(ValidationError::Duplicate {
                    field: "symbols".to_string(),
                    value: symbol.clone(),
                });
            }
        }

        if let (Some(start), Some(end)) = (raw.start, raw.end) {
            if start > end {
                return Err(ValidationError::InvalidDateRange { start, end });
            }
        }

        if !raw.initial_cash.is_finite() || raw.initial_cash <= 0.0 {
            return Err(ValidationError::invalid(
                "initial_cash",
                format!("必須為正數，實際為 {}", raw.initial_cash),
            ));
        }

        for (key, value) in &raw.parameters {
            if key.trim().is_empty() {
                return Err(ValidationError::invalid("parameters", "參數名稱不可為空白"));
            }
            if let ParamValue::Float(v) = value {
                if !v.is_finite() {
                    return Err(ValidationError::invalid(
                        format!("parameters.{}", key),
                        "浮點參數必須為有限數",
                    ));
                }
            }
        }

        if let Some(snapshot) = &raw.data_snapshot_id {
            if snapshot.trim().is_empty() {
                return Err(ValidationError::invalid("data_snapshot_id", "快照 ID 不可為空白"));
            }
        }

        Ok(Self {
            strategy_name: raw.strategy_name,
            symbols: raw.symbols,
            start: raw.start,
            end: raw.end,
            initial_cash: raw.initial_cash,
            parameters: raw.parameters,
            data_snapshot_id: raw.data_snapshot_id,
            random_seed: raw.random_seed,
        })
    }
}

impl BacktestRunRequest {
    /// 建立請求建構器
    pub fn builder<I, S>(strategy_name: impl Into<String>, symbols: I, initial_cash: f64) -> BacktestRunRequestBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BacktestRunRequestBuilder {
            raw: RawRunRequest {
                strategy_name: strategy_name.into(),
                symbols: symbols.into_iter().map(Into::into).collect(),
                initial_cash,
                ..RawRunRequest::default()
            },
        }
    }

    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn parameters(&self) -> &BTreeMap<String, ParamValue> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.get(name)
    }

    pub fn data_snapshot_id(&self) -> Option<&str> {
        self.data_snapshot_id.as_deref()
    }

    pub fn random_seed(&self) -> Option<u64> {
        self.random_seed
    }
}

/// 回測請求建構器
#[derive(Debug, Clone)]
pub struct BacktestRunRequestBuilder {
    raw: RawRunRequest,
}

impl BacktestRunRequestBuilder {
    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.raw.start = Some(start);
        self
    }

    pub fn end(mut self, end: DateTime<Utc>) -> Self {
        self.raw.end = Some(end);
        self
    }

    /// 同時設定起訖時間
    pub fn window(self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start(start).end(end)
    }

    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.raw.parameters.insert(name.into(), value.into());
        self
    }

    pub fn data_snapshot_id(mut self, snapshot_id: impl Into<String>) -> Self {
        self.raw.data_snapshot_id = Some(snapshot_id.into());
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.raw.random_seed = Some(seed);
        self
    }

    /// 驗證並建立請求
    pub fn build(self) -> Result<BacktestRunRequest, ValidationError> {
        BacktestRunRequest::try_from(self.raw)
    }
}
