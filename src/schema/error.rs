use thiserror::Error;

/// 結構/負載錯誤
///
/// 負載無法遷移或無法寫出時拋出；永遠不會被靜默修正。
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("負載必須是 JSON 物件")]
    NotAnObject,

    #[error("缺少必要欄位: {field}")]
    MissingField { field: String },

    #[error("無法解析欄位 {field}: {message}")]
    UnparseableField { field: String, message: String },

    #[error("不相容的結構版本 {found}（目前版本 {current}）")]
    IncompatibleVersion { found: String, current: String },

    #[error("缺少標準指標: {}", metrics.join(", "))]
    MissingMetrics { metrics: Vec<String> },

    #[error("欄位 {field} 的值不是有限數: {value}")]
    NonFiniteValue { field: String, value: f64 },

    #[error("同義詞 {synonym} 指向未知的標準指標 {target}")]
    UnknownSynonymTarget { synonym: String, target: String },

    #[error("JSON 錯誤: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO 錯誤: {0}")]
    Io(#[from] std::io::Error),
}

impl SchemaError {
    /// 出錯的欄位（若可指出）
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField { field }
            | Self::UnparseableField { field, .. }
            | Self::NonFiniteValue { field, .. } => Some(field),
            Self::IncompatibleVersion { .. } => Some("schema_version"),
            Self::MissingMetrics { .. } => Some("metrics"),
            _ => None,
        }
    }

    pub(crate) fn unparseable(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnparseableField {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// 結構操作結果類型
pub type SchemaResult<T> = Result<T, SchemaError>;
