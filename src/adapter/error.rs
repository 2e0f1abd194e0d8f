use thiserror::Error;

use crate::contract::ValidationError;
use crate::engine::EngineError;
use crate::schema::SchemaError;

/// 適配器錯誤
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("請求驗證失敗: {0}")]
    Validation(#[from] ValidationError),

    #[error("引擎 {engine} 不支援策略 {strategy}")]
    UnknownStrategy { engine: String, strategy: String },

    #[error("引擎 {engine} 執行失敗: {message}")]
    EngineExecution { engine: String, message: String },

    #[error("結果結構錯誤: {0}")]
    Schema(#[from] SchemaError),
}

impl AdapterError {
    pub fn engine_execution(engine: impl Into<String>, message: impl ToString) -> Self {
        Self::EngineExecution {
            engine: engine.into(),
            message: message.to_string(),
        }
    }

    /// 只有引擎執行期間的失敗才值得重試
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EngineExecution { .. })
    }

    /// 錯誤類別名稱（用於紀錄與指標標籤）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UnknownStrategy { .. } => "unknown_strategy",
            Self::EngineExecution { .. } => "engine_execution",
            Self::Schema(_) => "schema",
        }
    }

    /// 把引擎錯誤歸類：參數錯誤屬於請求驗證，其餘屬於執行失敗
    pub fn from_engine(engine: &str, error: EngineError) -> Self {
        match error {
            EngineError::InvalidParameter { name, message } => {
                Self::Validation(ValidationError::InvalidValue {
                    field: format!("parameters.{}", name),
                    message,
                })
            }
            other => Self::engine_execution(engine, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::DataError;
    use assert_matches::assert_matches;

    #[test]
    fn test_only_engine_execution_is_retryable() {
        assert!(AdapterError::engine_execution("e", "boom").is_retryable());
        assert!(!AdapterError::UnknownStrategy {
            engine: "e".into(),
            strategy: "s".into()
        }
        .is_retryable());
        assert!(!AdapterError::Validation(ValidationError::MissingField {
            field: "symbols".into()
        })
        .is_retryable());
    }

    #[test]
    fn test_engine_errors_are_classified() {
        let err = AdapterError::from_engine("e", EngineError::invalid_parameter("fast", "必須大於 0"));
        assert_matches!(err, AdapterError::Validation(ref v) if v.field() == "parameters.fast");

        let err = AdapterError::from_engine(
            "e",
            EngineError::Data(DataError::UnknownSymbol { symbol: "ZZZ".into() }),
        );
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "engine_execution");
    }
}
