use once_cell::sync::OnceCell;
use config::ConfigError;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::loader::{ConfigLoader, Environment};
use crate::config::types::ApplicationConfig;
use crate::config::validation::{ConfigValidationError, Validator};

// 全局配置實例
static CONFIG: OnceCell<ApplicationConfig> = OnceCell::new();

/// 配置載入錯誤
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("讀取配置失敗: {0}")]
    Source(#[from] ConfigError),

    #[error("配置驗證失敗: {0}")]
    Invalid(#[from] ConfigValidationError),
}

/// 獲取應用程序配置實例；尚未初始化時返回 None
pub fn get_config() -> Option<&'static ApplicationConfig> {
    CONFIG.get()
}

/// 初始化配置（在應用程序啟動時調用）
pub fn init_config() -> Result<&'static ApplicationConfig, ConfigLoadError> {
    if let Some(existing) = CONFIG.get() {
        warn!("配置已經被初始化，跳過重複初始化");
        return Ok(existing);
    }

    let app_config = ApplicationConfig::load_from_env()?;
    let config = CONFIG.get_or_init(|| app_config);
    debug!("配置初始化成功，環境：{:?}", Environment::from_env());
    Ok(config)
}

/// ApplicationConfig 加載方法實現
impl ApplicationConfig {
    /// 從環境變數指定的環境加載配置
    pub fn load_from_env() -> Result<Self, ConfigLoadError> {
        let env = Environment::from_env();
        debug!("從環境加載配置: {:?}", env);
        Self::load(env)
    }

    /// 從指定環境加載配置
    pub fn load(env: Environment) -> Result<Self, ConfigLoadError> {
        Self::load_from(&ConfigLoader::config_dir(), env)
    }

    /// 從指定目錄加載並驗證配置
    pub fn load_from(config_dir: &Path, env: Environment) -> Result<Self, ConfigLoadError> {
        let config_source = ConfigLoader::load_from(config_dir, env)?;

        // 使用 serde 反序列化配置
        let app_config: ApplicationConfig = config_source.try_deserialize()?;

        app_config.validate()?;
        debug!("配置驗證通過");
        Ok(app_config)
    }
}
