//! 參考回測引擎
//!
//! 兩個結構不同的引擎，各自使用原生參數與原生統計輸出：
//! - [`event_driven`]：逐根K線事件迴圈，下一根開盤價整股成交
//! - [`vectorized`]：權重矩陣計算，訊號K線收盤價零股成交
//!
//! 引擎本身不認識回測合約；轉換由 `adapter` 模組負責。

pub mod event_driven;
pub mod performance;
pub mod vectorized;

use thiserror::Error;

use crate::market_data::DataError;

// 重新導出常用組件
pub use event_driven::{BarContext, EventDrivenEngine, EventEngineConfig, EventRunOutput, EventStrategy};
pub use performance::{PerformanceSummary, PERIODS_PER_YEAR};
pub use vectorized::{TargetSchedule, VectorStrategy, VectorizedEngine, VectorizedConfig, VectorizedStats};

/// 引擎錯誤
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("行情數據錯誤: {0}")]
    Data(#[from] DataError),

    #[error("參數 {name} 無效: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("數據不足: 需要至少 {required} 根K線，實際 {available} 根")]
    InsufficientData { required: usize, available: usize },

    #[error("策略輸出無效: {0}")]
    InvalidSignal(String),
}

impl EngineError {
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// 引擎結果類型
pub type EngineResult<T> = Result<T, EngineError>;

/// 檢查目標權重：長度正確、有限、非負、總和不超過 1
pub(crate) fn check_weights(weights: &[f64], symbols: usize) -> EngineResult<()> {
    if weights.len() != symbols {
        return Err(EngineError::InvalidSignal(format!(
            "權重數量 {} 與商品數量 {} 不符",
            weights.len(),
            symbols
        )));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(EngineError::InvalidSignal("權重必須是非負有限數".to_string()));
    }
    let total: f64 = weights.iter().sum();
    if total > 1.0 + 1e-9 {
        return Err(EngineError::InvalidSignal(format!("權重總和 {} 超過 1", total)));
    }
    Ok(())
}
