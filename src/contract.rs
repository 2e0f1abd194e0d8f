//! 回測合約模組
//!
//! 定義與執行引擎無關的請求、結果、元數據值物件以及標準指標詞彙。
//! 任何引擎的輸出都必須轉換成這裡的型別，兩個引擎的結果才能直接比較。

pub mod error;
pub mod fingerprint;
pub mod metadata;
pub mod metrics;
pub mod request;
pub mod result;

// 重新導出常用類型
pub use error::ValidationError;
pub use fingerprint::config_hash;
pub use metadata::{BacktestRunMetadata, EngineIdentity};
pub use metrics::{CanonicalMetric, MetricSet};
pub use request::{BacktestRunRequest, BacktestRunRequestBuilder, ParamValue};
pub use result::{BacktestRunResult, ValuePoint};
