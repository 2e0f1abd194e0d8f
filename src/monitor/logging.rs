use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use super::{MonitorError, MonitorResult};
use crate::config::LogConfig;

/// 依日誌配置建立過濾器；`RUST_LOG` 存在時優先
fn build_filter(log_config: &LogConfig) -> MonitorResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(log_config.level.to_lowercase())
            .map_err(|e| MonitorError::LoggerError(format!("無效的日誌級別 {}: {}", log_config.level, e))),
    }
}

/// 初始化日誌系統
pub fn init_logging(log_config: &LogConfig) -> MonitorResult<()> {
    let filter = build_filter(log_config)?;

    let result = match log_config.format.to_lowercase().as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    result.map_err(|e| MonitorError::InitializationError(format!("設置日誌系統失敗: {}", e)))?;

    info!("日誌系統初始化完成");
    Ok(())
}

/// 在正式日誌系統安裝前，以預設日誌配置執行 `f`
///
/// 配置本身要先載入才知道日誌格式，這段期間的事件改由暫時的訂閱者輸出到 stderr。
pub fn with_bootstrap_logging<T>(f: impl FnOnce() -> T) -> MonitorResult<T> {
    let filter = build_filter(&LogConfig::default())?;
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    Ok(tracing::subscriber::with_default(subscriber, f))
}
