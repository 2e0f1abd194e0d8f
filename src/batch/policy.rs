use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::validation::{ConfigValidationError, ValidationUtils, Validator};

fn default_factor() -> f64 {
    2.0
}

fn default_backoff_seconds() -> f64 {
    1.0
}

fn default_max_backoff_seconds() -> f64 {
    300.0
}

/// 重試延遲的增長方式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum BackoffShape {
    /// 每次都等待基準延遲
    Constant,
    /// 基準延遲乘以重試次數
    Linear,
    /// 基準延遲乘以 factor^(重試次數 - 1)
    Exponential {
        #[serde(default = "default_factor")]
        factor: f64,
    },
}

impl Default for BackoffShape {
    fn default() -> Self {
        BackoffShape::Exponential {
            factor: default_factor(),
        }
    }
}

impl BackoffShape {
    fn multiplier(&self, retry: u32) -> f64 {
        let retry = retry.max(1);
        match self {
            BackoffShape::Constant => 1.0,
            BackoffShape::Linear => retry as f64,
            BackoffShape::Exponential { factor } => factor.powi(retry.saturating_sub(1).min(i32::MAX as u32) as i32),
        }
    }
}

/// 批次重試策略（預設不重試）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub retry_failed: bool,
    #[serde(default)]
    pub max_retry_attempts: u32,
    #[serde(default = "default_backoff_seconds")]
    pub retry_backoff_seconds: f64,
    #[serde(default)]
    pub backoff: BackoffShape,
    #[serde(default = "default_max_backoff_seconds")]
    pub max_backoff_seconds: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_failed: false,
            max_retry_attempts: 0,
            retry_backoff_seconds: default_backoff_seconds(),
            backoff: BackoffShape::default(),
            max_backoff_seconds: default_max_backoff_seconds(),
        }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn enabled(max_retry_attempts: u32, retry_backoff_seconds: f64) -> Self {
        Self {
            retry_failed: true,
            max_retry_attempts,
            retry_backoff_seconds,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffShape) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_backoff_seconds(mut self, seconds: f64) -> Self {
        self.max_backoff_seconds = seconds;
        self
    }

    /// 一個請求最多的嘗試次數（含第一次）
    pub fn max_attempts(&self) -> u32 {
        if self.retry_failed {
            self.max_retry_attempts.saturating_add(1)
        } else {
            1
        }
    }

    /// 第 `retry` 次重試前的等待時間（從 1 起算）
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let cap = sanitize_seconds(self.max_backoff_seconds);
        let seconds = sanitize_seconds(self.retry_backoff_seconds * self.backoff.multiplier(retry)).min(cap);
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }
}

fn sanitize_seconds(seconds: f64) -> f64 {
    if seconds.is_nan() || seconds <= 0.0 {
        0.0
    } else if seconds.is_infinite() {
        f64::MAX
    } else {
        seconds
    }
}

impl Validator for RetryPolicy {
    fn validate(&self) -> Result<(), ConfigValidationError> {
        ValidationUtils::finite_non_negative(self.retry_backoff_seconds, "batch.retry_backoff_seconds")?;
        ValidationUtils::finite_non_negative(self.max_backoff_seconds, "batch.max_backoff_seconds")?;
        ValidationUtils::in_range(self.max_retry_attempts, 0, 100, "batch.max_retry_attempts")?;
        if let BackoffShape::Exponential { factor } = self.backoff {
            if !factor.is_finite() || factor < 1.0 {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "batch.backoff.factor 必須是不小於 1 的有限數值，實際為 {}",
                    factor
                )));
            }
        }
        Ok(())
    }
}

/// 批次執行設定
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSettings {
    pub retry: RetryPolicy,
    /// 單次嘗試的逾時，逾時視為可重試的失敗
    pub attempt_timeout: Option<Duration>,
    pub max_concurrency: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            attempt_timeout: None,
            max_concurrency: num_cpus::get(),
        }
    }
}

impl BatchSettings {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_disabled_policy_allows_single_attempt() {
        let policy = RetryPolicy::disabled();
        assert_eq!(policy.max_attempts(), 1);

        let policy = RetryPolicy {
            max_retry_attempts: 5,
            ..RetryPolicy::disabled()
        };
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_enabled_policy_counts_first_attempt() {
        assert_eq!(RetryPolicy::enabled(2, 1.0).max_attempts(), 3);
        assert_eq!(RetryPolicy::enabled(0, 1.0).max_attempts(), 1);
    }

    #[rstest]
    #[case(BackoffShape::Constant, [1.0, 1.0, 1.0])]
    #[case(BackoffShape::Linear, [1.0, 2.0, 3.0])]
    #[case(BackoffShape::Exponential { factor: 2.0 }, [1.0, 2.0, 4.0])]
    #[case(BackoffShape::Exponential { factor: 3.0 }, [1.0, 3.0, 9.0])]
    fn test_backoff_shapes(#[case] shape: BackoffShape, #[case] expected: [f64; 3]) {
        let policy = RetryPolicy::enabled(3, 1.0).with_backoff(shape);
        for (i, seconds) in expected.iter().enumerate() {
            assert_eq!(
                policy.delay_before_retry(i as u32 + 1),
                Duration::from_secs_f64(*seconds)
            );
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::enabled(10, 1.0).with_max_backoff_seconds(5.0);
        assert_eq!(policy.delay_before_retry(10), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_base_delay() {
        let policy = RetryPolicy::enabled(2, 0.0);
        assert_eq!(policy.delay_before_retry(2), Duration::ZERO);
    }

    #[test]
    fn test_deserialize_backoff_shape() {
        let policy: RetryPolicy = serde_json::from_str(
            r#"{"retry_failed": true, "max_retry_attempts": 2, "backoff": {"shape": "linear"}}"#,
        )
        .unwrap();
        assert_eq!(policy.backoff, BackoffShape::Linear);
        assert_eq!(policy.retry_backoff_seconds, 1.0);

        let policy: RetryPolicy =
            serde_json::from_str(r#"{"backoff": {"shape": "exponential"}}"#).unwrap();
        assert_eq!(policy.backoff, BackoffShape::Exponential { factor: 2.0 });
    }

    #[test]
    fn test_validate_rejects_shrinking_factor() {
        let policy = RetryPolicy::enabled(1, 1.0).with_backoff(BackoffShape::Exponential { factor: 0.5 });
        assert!(policy.validate().is_err());
        assert!(RetryPolicy::enabled(1, -1.0).validate().is_err());
        assert!(RetryPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_concurrency_is_at_least_one() {
        assert_eq!(BatchSettings::default().with_max_concurrency(0).max_concurrency, 1);
    }
}
