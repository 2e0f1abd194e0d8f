use chrono::{DateTime, Utc};
use thiserror::Error;

/// 回測請求驗證錯誤
///
/// 在任何引擎工作開始之前拋出，永遠不會被自動重試。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("缺少必要欄位: {field}")]
    MissingField { field: String },

    #[error("欄位 {field} 的值無效: {message}")]
    InvalidValue { field: String, message: String },

    #[error("欄位 {field} 含有重複值: {value}")]
    Duplicate { field: String, value: String },

    #[error("日期範圍錯誤: start ({start}) 晚於 end ({end})")]
    InvalidDateRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl ValidationError {
    /// 出錯的欄位名稱
    pub fn field(&self) -> &str {
        match self {
            Self::MissingField { field } => field,
            Self::InvalidValue { field, .. } => field,
            Self::Duplicate { field, .. } => field,
            Self::InvalidDateRange { .. } => "start",
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}
