use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fingerprint::config_hash;
use super::request::BacktestRunRequest;

/// 引擎身分
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineIdentity {
    pub name: String,
    pub version: String,
}

impl EngineIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for EngineIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// 單次回測執行的元數據
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRunMetadata {
    pub run_id: String,
    pub engine_name: String,
    pub engine_version: String,
    pub strategy_name: String,
    pub created_at: DateTime<Utc>,
    pub config_hash: String,
    #[serde(default)]
    pub data_snapshot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<u64>,
}

impl BacktestRunMetadata {
    /// 在執行開始時產生元數據
    ///
    /// `run_id` 每次都是新的，`config_hash` 只取決於請求與引擎身分。
    pub fn begin_run(request: &BacktestRunRequest, engine: &EngineIdentity) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            engine_name: engine.name.clone(),
            engine_version: engine.version.clone(),
            strategy_name: request.strategy_name().to_string(),
            created_at: Utc::now(),
            config_hash: config_hash(request, engine),
            data_snapshot_id: request.data_snapshot_id().map(str::to_string),
            random_seed: request.random_seed(),
        }
    }

    pub fn engine(&self) -> EngineIdentity {
        EngineIdentity::new(&self.engine_name, &self.engine_version)
    }
}
