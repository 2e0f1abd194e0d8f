//! 結構版本與遷移模組
//!
//! 追蹤兩個獨立的語意化版本號（請求合約、結果負載），並提供把舊版結果負載
//! 逐步升級到目前結構的純函數。讀取端永遠只會看到目前結構的物件。

pub mod error;
pub mod legacy;
pub mod migration;
pub mod version;

// 重新導出常用組件
pub use error::{SchemaError, SchemaResult};
pub use legacy::LegacyKeyTable;
pub use migration::{detect_shape, migrate, Migrator};
pub use version::{
    is_compatible, PayloadShape, REQUEST_CONTRACT_VERSION, RESULT_SCHEMA_VERSION,
};
