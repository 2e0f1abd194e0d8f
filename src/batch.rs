// 批次執行、重試與觀測
//
// 每個請求是一個獨立的執行單元，單元內部依序重試；單元之間由執行器並行排程。

pub mod executor;
pub mod policy;
pub mod record;

pub use executor::BatchExecutor;
pub use policy::{BackoffShape, BatchSettings, RetryPolicy};
pub use record::{
    AttemptFailure, BatchRunRecord, BatchSummary, FailureKind, PairedRunRecord, RecordStatus,
    RunObservation,
};
