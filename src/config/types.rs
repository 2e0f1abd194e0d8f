use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::{BatchSettings, RetryPolicy};
use crate::config::validation::{ConfigValidationError, ValidationUtils, Validator};
use crate::parity::{DocumentedDeviation, ParityHarness, ParityTolerances};

/// 應用程序配置結構
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub parity: ParityConfig,
    #[serde(default)]
    pub data: DataConfig,
}

impl Validator for ApplicationConfig {
    fn validate(&self) -> Result<(), ConfigValidationError> {
        // 驗證各個部分的配置
        self.log.validate()?;
        self.batch.validate()?;
        self.parity.validate()?;
        self.data.validate()?;

        Ok(())
    }
}

/// 日誌配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Validator for LogConfig {
    fn validate(&self) -> Result<(), ConfigValidationError> {
        // 驗證日誌級別
        ValidationUtils::one_of(
            &self.level.to_lowercase().as_str(),
            &["trace", "debug", "info", "warn", "error"],
            "log.level",
        )?;

        // 驗證日誌格式
        ValidationUtils::one_of(&self.format.to_lowercase().as_str(), &["pretty", "json"], "log.format")?;

        Ok(())
    }
}

/// 批次執行配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub retry: RetryPolicy,
    /// 單次嘗試逾時（秒），未設定則不限
    #[serde(default)]
    pub attempt_timeout_seconds: Option<f64>,
    /// 並行上限，未設定則使用 CPU 核心數
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

impl BatchConfig {
    pub fn settings(&self) -> BatchSettings {
        let mut settings = BatchSettings::default().with_retry(self.retry.clone());
        if let Some(timeout) = self
            .attempt_timeout_seconds
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
        {
            settings = settings.with_attempt_timeout(timeout);
        }
        if let Some(max_concurrency) = self.max_concurrency {
            settings = settings.with_max_concurrency(max_concurrency);
        }
        settings
    }
}

impl Validator for BatchConfig {
    fn validate(&self) -> Result<(), ConfigValidationError> {
        self.retry.validate()?;
        if let Some(timeout) = self.attempt_timeout_seconds {
            ValidationUtils::finite_non_negative(timeout, "batch.attempt_timeout_seconds")?;
            if timeout == 0.0 {
                return Err(ConfigValidationError::InvalidValue(
                    "batch.attempt_timeout_seconds 必須大於 0".to_string(),
                ));
            }
        }
        if let Some(max_concurrency) = self.max_concurrency {
            ValidationUtils::in_range(max_concurrency, 1, 1024, "batch.max_concurrency")?;
        }
        Ok(())
    }
}

/// 一致性驗證配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParityConfig {
    #[serde(default)]
    pub tolerances: ParityTolerances,
    #[serde(default)]
    pub deviations: Vec<DocumentedDeviation>,
}

impl ParityConfig {
    pub fn harness(&self) -> ParityHarness {
        self.deviations
            .iter()
            .cloned()
            .fold(ParityHarness::new(self.tolerances.clone()), ParityHarness::with_deviation)
    }
}

impl Validator for ParityConfig {
    fn validate(&self) -> Result<(), ConfigValidationError> {
        for (metric, tolerance) in &self.tolerances.metrics {
            ValidationUtils::finite_non_negative(
                tolerance.threshold,
                &format!("parity.tolerances.metrics.{}.threshold", metric),
            )?;
        }

        let drift = &self.tolerances.drift;
        ValidationUtils::finite_non_negative(drift.band, "parity.tolerances.drift.band")?;
        ValidationUtils::finite_non_negative(drift.ceiling, "parity.tolerances.drift.ceiling")?;
        ValidationUtils::in_range(
            drift.min_fraction_within,
            0.0,
            1.0,
            "parity.tolerances.drift.min_fraction_within",
        )?;
        ValidationUtils::in_range(drift.min_paired_points, 1, usize::MAX, "parity.tolerances.drift.min_paired_points")?;

        for deviation in &self.deviations {
            ValidationUtils::not_empty(&deviation.id, "parity.deviations.id")?;
            ValidationUtils::not_empty(&deviation.explanation, "parity.deviations.explanation")?;
        }
        Ok(())
    }
}

/// 市場數據來源種類
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    #[default]
    Synthetic,
    Csv,
}

/// 市場數據配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub source: DataSourceKind,
    /// CSV 快照根目錄
    #[serde(default)]
    pub csv_root: Option<String>,
}

impl Validator for DataConfig {
    fn validate(&self) -> Result<(), ConfigValidationError> {
        let has_root = self
            .csv_root
            .as_deref()
            .map(|root| !root.trim().is_empty())
            .unwrap_or(false);
        ValidationUtils::check_dependency(
            self.source == DataSourceKind::Csv,
            has_root,
            "data.source = csv",
            "data.csv_root",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BackoffShape;
    use crate::contract::CanonicalMetric;
    use crate::parity::MetricTolerance;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ApplicationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_log_config_rejects_unknown_format() {
        let log = LogConfig {
            level: "info".into(),
            format: "xml".into(),
        };
        assert!(log.validate().is_err());

        let log = LogConfig {
            level: "DEBUG".into(),
            format: "json".into(),
        };
        assert!(log.validate().is_ok());
    }

    #[test]
    fn test_batch_settings_conversion() {
        let batch = BatchConfig {
            retry: RetryPolicy::enabled(2, 0.5).with_backoff(BackoffShape::Linear),
            attempt_timeout_seconds: Some(1.5),
            max_concurrency: Some(3),
        };
        assert!(batch.validate().is_ok());

        let settings = batch.settings();
        assert_eq!(settings.retry.max_attempts(), 3);
        assert_eq!(settings.attempt_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(settings.max_concurrency, 3);
    }

    #[test]
    fn test_batch_rejects_zero_timeout() {
        let batch = BatchConfig {
            attempt_timeout_seconds: Some(0.0),
            ..Default::default()
        };
        assert!(batch.validate().is_err());
    }

    #[test]
    fn test_parity_rejects_negative_threshold() {
        let parity = ParityConfig {
            tolerances: ParityTolerances::default()
                .with_metric(CanonicalMetric::Sharpe, MetricTolerance::absolute(-1.0)),
            deviations: Vec::new(),
        };
        assert!(parity.validate().is_err());
    }

    #[test]
    fn test_parity_harness_carries_deviations() {
        let parity = ParityConfig {
            tolerances: ParityTolerances::default(),
            deviations: vec![DocumentedDeviation::new("whole-shares", "整股成交")],
        };
        assert_eq!(parity.harness().deviations().len(), 1);
    }

    #[test]
    fn test_csv_source_requires_root() {
        let data = DataConfig {
            source: DataSourceKind::Csv,
            csv_root: None,
        };
        assert!(matches!(
            data.validate(),
            Err(ConfigValidationError::DependencyError { .. })
        ));
        assert!(DataConfig::default().validate().is_ok());
    }
}
