use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapter::AdapterError;

/// 比較中的一側
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => f.write_str("A"),
            Side::B => f.write_str("B"),
        }
    }
}

/// 一致性驗證錯誤
#[derive(Error, Debug)]
pub enum ParityError {
    #[error("情境 {scenario_id} 的 {side} 側 ({engine}) 執行失敗: {source}")]
    SideFailed {
        scenario_id: String,
        side: Side,
        engine: String,
        #[source]
        source: AdapterError,
    },
}

/// 一致性驗證結果類型
pub type ParityResult<T> = Result<T, ParityError>;
