use semver::Version;

use super::error::{SchemaError, SchemaResult};

/// 請求/引擎合約版本
pub const REQUEST_CONTRACT_VERSION: &str = "1.0.0";

/// 結果負載結構版本
///
/// 1.1.0 新增了可選的 `value_history`。
pub const RESULT_SCHEMA_VERSION: &str = "1.1.0";

/// 兩個版本是否相容：只要求主版本號相同
pub fn is_compatible(a: &Version, b: &Version) -> bool {
    a.major == b.major
}

pub fn current_result_version() -> Version {
    Version::new(1, 1, 0)
}

pub fn request_contract_version() -> Version {
    Version::new(1, 0, 0)
}

/// 解析負載中的 schema_version
pub fn parse_version(raw: &str) -> SchemaResult<Version> {
    Version::parse(raw.trim()).map_err(|e| SchemaError::unparseable("schema_version", e.to_string()))
}

/// 已知的結果負載歷史結構
///
/// 每個結構只知道如何升級到下一個結構，遷移時依序串接。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PayloadShape {
    /// 合約之前的 0.x 負載（沒有 schema_version）
    Legacy,
    /// 1.0.x
    V1_0,
    /// 1.1.x 以及同主版本的較新版本
    V1_1,
}

impl PayloadShape {
    pub const CURRENT: PayloadShape = PayloadShape::V1_1;

    /// 依版本號判斷結構
    pub fn detect(version: &Version) -> SchemaResult<Self> {
        let current = current_result_version();
        match version.major {
            0 => Ok(PayloadShape::Legacy),
            _ if is_compatible(version, &current) => {
                if version.minor == 0 {
                    Ok(PayloadShape::V1_0)
                } else {
                    Ok(PayloadShape::V1_1)
                }
            }
            _ => Err(SchemaError::IncompatibleVersion {
                found: version.to_string(),
                current: current.to_string(),
            }),
        }
    }

    /// 升級後得到的結構
    pub fn next(&self) -> Option<PayloadShape> {
        match self {
            PayloadShape::Legacy => Some(PayloadShape::V1_0),
            PayloadShape::V1_0 => Some(PayloadShape::V1_1),
            PayloadShape::V1_1 => None,
        }
    }

    /// 升級到此結構時寫入的版本號
    pub fn stamped_version(&self) -> &'static str {
        match self {
            PayloadShape::Legacy => "0.0.0",
            PayloadShape::V1_0 => "1.0.0",
            PayloadShape::V1_1 => RESULT_SCHEMA_VERSION,
        }
    }
}
