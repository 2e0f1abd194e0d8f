//! 引擎適配器模組
//!
//! 每個執行引擎透過一個 [`EngineAdapter`] 接上回測合約：接收
//! [`BacktestRunRequest`](crate::contract::BacktestRunRequest)，返回只含標準指標的
//! [`BacktestRunResult`](crate::contract::BacktestRunResult)。
//! 批次執行器與一致性驗證只依賴這個特徵，不認識任何具體引擎。

pub mod error;
pub mod event_driven;
pub mod registry;
pub mod traits;
pub mod vectorized;

// 重新導出常用組件
pub use error::AdapterError;
pub use event_driven::EventDrivenAdapter;
pub use registry::StrategyRegistry;
pub use traits::EngineAdapter;
pub use vectorized::VectorizedAdapter;
