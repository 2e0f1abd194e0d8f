// 請求指紋：正規化請求 + 引擎身分 -> SHA-256
//
// 每個欄位以「名稱=長度:內容;」寫入雜湊器，避免不同欄位內容拼接後產生相同位元組。

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use super::metadata::EngineIdentity;
use super::request::BacktestRunRequest;

struct FingerprintHasher {
    hasher: Sha256,
}

impl FingerprintHasher {
    fn new(domain: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain.as_bytes());
        hasher.update(b"\n");
        Self { hasher }
    }

    fn field(&mut self, name: &str, value: &str) {
        self.hasher.update(name.as_bytes());
        self.hasher.update(b"=");
        self.hasher.update((value.len() as u64).to_le_bytes());
        self.hasher.update(b":");
        self.hasher.update(value.as_bytes());
        self.hasher.update(b";");
    }

    fn optional(&mut self, name: &str, value: Option<&str>) {
        match value {
            Some(v) => self.field(name, v),
            None => self.field(name, "\u{0}none"),
        }
    }

    fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

fn timestamp(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|ts| ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn number(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        value.to_string()
    }
}

/// 計算請求的設定雜湊
///
/// 相同請求經過同一引擎永遠得到相同雜湊；引擎名稱或版本不同時雜湊也不同。
pub fn config_hash(request: &BacktestRunRequest, engine: &EngineIdentity) -> String {
    let mut fp = FingerprintHasher::new("backtest-run-request/v1");

    fp.field("strategy_name", request.strategy_name().trim());
    fp.field("symbol_count", &request.symbols().len().to_string());
    for symbol in request.symbols() {
        fp.field("symbol", symbol);
    }
    fp.optional("start", timestamp(request.start()).as_deref());
    fp.optional("end", timestamp(request.end()).as_deref());
    fp.field("initial_cash", &number(request.initial_cash()));

    fp.field("parameter_count", &request.parameters().len().to_string());
    for (key, value) in request.parameters() {
        fp.field("parameter", key);
        fp.field(value.type_name(), &value.to_string());
    }

    fp.optional("data_snapshot_id", request.data_snapshot_id());
    fp.optional(
        "random_seed",
        request.random_seed().map(|s| s.to_string()).as_deref(),
    );

    fp.field("engine_name", &engine.name);
    fp.field("engine_version", &engine.version);
    fp.finish()
}

/// 為沒有 config_hash 的舊版負載合成雜湊
pub(crate) fn legacy_config_hash(
    strategy_name: &str,
    engine: &EngineIdentity,
    parameters: Option<&serde_json::Value>,
) -> String {
    let mut fp = FingerprintHasher::new("legacy-payload/v0");
    fp.field("strategy_name", strategy_name.trim());
    fp.optional("parameters", parameters.map(|p| p.to_string()).as_deref());
    fp.field("engine_name", &engine.name);
    fp.field("engine_version", &engine.version);
    fp.finish()
}
