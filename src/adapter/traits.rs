use async_trait::async_trait;

use super::error::AdapterError;
use crate::contract::{BacktestRunRequest, BacktestRunResult, EngineIdentity};

/// 引擎適配器
///
/// 實作只能持有建構時就固定的狀態（`&self`），同一個實例可以被多個任務同時呼叫。
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// 引擎名稱與版本，寫入每個結果的元數據並參與設定雜湊
    fn identity(&self) -> &EngineIdentity;

    /// 支援的策略名稱（排序後）
    fn strategies(&self) -> Vec<String>;

    /// 執行一次回測
    ///
    /// 每次呼叫產生新的 `run_id`；返回的指標一定是完整的標準指標集合。
    async fn run(&self, request: &BacktestRunRequest) -> Result<BacktestRunResult, AdapterError>;
}
