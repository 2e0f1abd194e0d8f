use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::error::AdapterError;
use crate::contract::{BacktestRunRequest, ValidationError};

type Factory<S> = Arc<dyn Fn(&BacktestRunRequest) -> Result<S, AdapterError> + Send + Sync>;

/// 策略註冊表
///
/// 在適配器建構時填好，之後只讀。工廠函數負責解析並驗證策略參數。
pub struct StrategyRegistry<S> {
    factories: BTreeMap<String, Factory<S>>,
}

impl<S> Default for StrategyRegistry<S> {
    fn default() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }
}

impl<S> fmt::Debug for StrategyRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

impl<S> StrategyRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&BacktestRunRequest) -> Result<S, AdapterError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// 依請求的策略名稱建立策略實例
    pub fn resolve(&self, engine: &str, request: &BacktestRunRequest) -> Result<S, AdapterError> {
        let name = request.strategy_name().trim();
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| AdapterError::UnknownStrategy {
                engine: engine.to_string(),
                strategy: name.to_string(),
            })?;
        factory(request)
    }
}

/// 讀取正整數參數；未提供時使用預設值
pub fn positive_int_param(
    request: &BacktestRunRequest,
    name: &str,
    default: usize,
) -> Result<usize, ValidationError> {
    let Some(value) = request.parameter(name) else {
        return Ok(default);
    };
    match value.as_i64() {
        Some(v) if v > 0 => Ok(v as usize),
        Some(v) => Err(ValidationError::invalid(
            format!("parameters.{}", name),
            format!("必須是正整數，實際為 {}", v),
        )),
        None => Err(ValidationError::invalid(
            format!("parameters.{}", name),
            format!("必須是整數，實際為 {} ({})", value, value.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn registry() -> StrategyRegistry<usize> {
        StrategyRegistry::new()
            .register("fixed", |_| Ok(1))
            .register("windowed", |req| Ok(positive_int_param(req, "window", 10)?))
    }

    fn request(strategy: &str) -> BacktestRunRequest {
        BacktestRunRequest::builder(strategy, ["AAA"], 1_000.0).build().unwrap()
    }

    #[test]
    fn test_names_are_sorted() {
        assert_eq!(registry().names(), vec!["fixed".to_string(), "windowed".to_string()]);
    }

    #[test]
    fn test_unknown_strategy() {
        let err = registry().resolve("engine-x", &request("momentum")).unwrap_err();
        assert_matches!(
            err,
            AdapterError::UnknownStrategy { ref engine, ref strategy }
                if engine == "engine-x" && strategy == "momentum"
        );
    }

    #[test]
    fn test_parameter_parsing() {
        assert_eq!(registry().resolve("e", &request("windowed")).unwrap(), 10);

        let req = BacktestRunRequest::builder("windowed", ["AAA"], 1_000.0)
            .parameter("window", 3.0)
            .build()
            .unwrap();
        assert_eq!(registry().resolve("e", &req).unwrap(), 3);

        let req = BacktestRunRequest::builder("windowed", ["AAA"], 1_000.0)
            .parameter("window", "ten")
            .build()
            .unwrap();
        let err = registry().resolve("e", &req).unwrap_err();
        assert_matches!(err, AdapterError::Validation(ref v) if v.field() == "parameters.window");

        let req = BacktestRunRequest::builder("windowed", ["AAA"], 1_000.0)
            .parameter("window", -2)
            .build()
            .unwrap();
        assert!(registry().resolve("e", &req).is_err());
    }
}
