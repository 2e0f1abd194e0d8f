use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use backtest_parity::adapter::{EngineAdapter, EventDrivenAdapter, VectorizedAdapter};
use backtest_parity::batch::{BatchExecutor, BatchSummary};
use backtest_parity::config::{self, ApplicationConfig, DataSourceKind};
use backtest_parity::contract::BacktestRunRequest;
use backtest_parity::market_data::{CsvSnapshotSource, MarketDataSource, SyntheticDataSource};
use backtest_parity::monitor::{init_logging, with_bootstrap_logging};
use backtest_parity::parity::ParityScenario;
use backtest_parity::serialization::write_result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "backtest_parity", about = "回測引擎批次執行與一致性驗證工具")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    EventDriven,
    Vectorized,
}

#[derive(Subcommand)]
enum Commands {
    /// 以單一引擎批次執行請求
    Run {
        #[arg(short, long, value_enum)]
        engine: EngineKind,

        /// 請求檔案（JSON 陣列）
        #[arg(short, long)]
        requests: PathBuf,

        /// 結果輸出目錄
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 以兩個引擎執行情境並產生一致性報告
    Parity {
        /// 情境檔案（JSON 陣列）
        #[arg(short, long)]
        scenarios: PathBuf,

        #[arg(long, value_enum, default_value = "event-driven")]
        engine_a: EngineKind,

        #[arg(long, value_enum, default_value = "vectorized")]
        engine_b: EngineKind,

        /// 報告輸出檔案，未指定時寫到標準輸出
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 列出引擎支援的策略
    Strategies {
        #[arg(short, long, value_enum)]
        engine: Option<EngineKind>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化配置；此時日誌格式未定，先用預設值輸出
    let app_config = with_bootstrap_logging(config::init_config)
        .context("無法初始化啟動日誌")?
        .context("無法載入配置")?;

    // 初始化日誌系統
    init_logging(&app_config.log).context("無法初始化日誌系統")?;

    let cli = Cli::parse();
    let data = data_source(app_config);

    match cli.command {
        Commands::Run {
            engine,
            requests,
            output,
        } => run_batch(app_config, build_adapter(engine, data), &requests, output.as_deref()).await,
        Commands::Parity {
            scenarios,
            engine_a,
            engine_b,
            output,
        } => {
            run_parity(
                app_config,
                build_adapter(engine_a, data.clone()),
                build_adapter(engine_b, data),
                &scenarios,
                output.as_deref(),
            )
            .await
        }
        Commands::Strategies { engine } => {
            let engines = match engine {
                Some(kind) => vec![kind],
                None => vec![EngineKind::EventDriven, EngineKind::Vectorized],
            };
            for kind in engines {
                let adapter = build_adapter(kind, data.clone());
                println!("{}: {}", adapter.identity(), adapter.strategies().join(", "));
            }
            Ok(())
        }
    }
}

fn data_source(app_config: &ApplicationConfig) -> Arc<dyn MarketDataSource> {
    match (app_config.data.source, app_config.data.csv_root.as_deref()) {
        (DataSourceKind::Csv, Some(root)) => Arc::new(CsvSnapshotSource::new(root)),
        _ => Arc::new(SyntheticDataSource::default()),
    }
}

fn build_adapter(kind: EngineKind, data: Arc<dyn MarketDataSource>) -> Arc<dyn EngineAdapter> {
    match kind {
        EngineKind::EventDriven => Arc::new(EventDrivenAdapter::new(data)),
        EngineKind::Vectorized => Arc::new(VectorizedAdapter::new(data)),
    }
}

async fn run_batch(
    app_config: &ApplicationConfig,
    adapter: Arc<dyn EngineAdapter>,
    requests_path: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let raw = fs::read_to_string(requests_path)
        .with_context(|| format!("無法讀取請求檔案 {}", requests_path.display()))?;
    let requests: Vec<BacktestRunRequest> =
        serde_json::from_str(&raw).context("請求檔案格式錯誤")?;

    let executor = BatchExecutor::new(app_config.batch.settings());
    let records = executor.execute(adapter, requests).await;

    if let Some(dir) = output {
        fs::create_dir_all(dir).with_context(|| format!("無法建立輸出目錄 {}", dir.display()))?;
        for record in &records {
            if let Some(result) = &record.result {
                let path = dir.join(format!("{:04}-{}.json", record.index, result.metadata.run_id));
                write_result(&path, result)
                    .with_context(|| format!("無法寫入結果 {}", path.display()))?;
            }
        }
    }

    for record in records.iter().filter(|r| !r.is_success()) {
        warn!(
            "請求 {} 以 {} 結束: {:?}",
            record.index,
            record.status.as_str(),
            record.failure_reasons()
        );
    }

    let summary = BatchSummary::from_records(&records);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    info!("批次完成: {}/{} 成功", summary.succeeded, summary.total);
    Ok(())
}

async fn run_parity(
    app_config: &ApplicationConfig,
    adapter_a: Arc<dyn EngineAdapter>,
    adapter_b: Arc<dyn EngineAdapter>,
    scenarios_path: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let raw = fs::read_to_string(scenarios_path)
        .with_context(|| format!("無法讀取情境檔案 {}", scenarios_path.display()))?;
    let scenarios: Vec<ParityScenario> = serde_json::from_str(&raw).context("情境檔案格式錯誤")?;

    let harness = app_config.parity.harness();
    let outcomes = harness
        .run_scenarios(&scenarios, adapter_a.as_ref(), adapter_b.as_ref())
        .await;

    let mut reports = Vec::with_capacity(outcomes.len());
    let mut blocked = 0usize;
    for outcome in outcomes {
        match outcome {
            Ok(report) => {
                if !report.gate() {
                    blocked += 1;
                }
                reports.push(report);
            }
            Err(e) => {
                blocked += 1;
                warn!("{}", e);
            }
        }
    }

    let rendered = serde_json::to_string_pretty(&reports)?;
    match output {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("無法寫入報告 {}", path.display()))?,
        None => println!("{}", rendered),
    }

    if blocked > 0 {
        bail!("{} / {} 個情境未通過一致性閘門", blocked, scenarios.len());
    }
    info!("全部 {} 個情境通過一致性閘門", scenarios.len());
    Ok(())
}
