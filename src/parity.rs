//! 一致性驗證模組
//!
//! 把同一個請求交給兩個引擎，逐項比較標準指標與資產價值曲線，
//! 最後給出帶有理由的判定（等價、已記錄的偏差、無法判定、分歧）。

pub mod check;
pub mod drift;
pub mod error;
pub mod harness;
pub mod report;
pub mod tolerance;

// 重新導出常用組件
pub use check::{compare_metrics, ParityCheck};
pub use drift::{check_drift, DriftStatistics, DriftStatus, DriftVerdict};
pub use error::{ParityError, Side};
pub use harness::{ParityHarness, ParityScenario};
pub use report::{
    classify, DocumentedDeviation, ParityClassification, ParityReport, ParityVerdict,
};
pub use tolerance::{ComparisonKind, DriftTolerance, MetricTolerance, ParityTolerances};
