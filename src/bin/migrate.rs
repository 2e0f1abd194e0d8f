use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use backtest_parity::schema::{detect_shape, PayloadShape, RESULT_SCHEMA_VERSION};
use backtest_parity::serialization::{from_payload, to_json_string};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "migrate", about = "回測結果結構描述遷移工具")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 把結果檔案遷移到目前的結構描述版本
    Run {
        /// 輸入檔案
        input: PathBuf,

        /// 輸出檔案，未指定時寫到標準輸出
        #[arg(short, long, conflicts_with = "in_place")]
        output: Option<PathBuf>,

        /// 直接覆寫輸入檔案
        #[arg(long)]
        in_place: bool,
    },

    /// 檢查結果檔案的版本與可遷移性
    Check {
        /// 輸入檔案
        input: PathBuf,
    },
}

fn read_payload(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path).with_context(|| format!("無法讀取 {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} 不是有效的 JSON", path.display()))
}

fn main() -> Result<()> {
    // 初始化日誌系統
    tracing_subscriber::fmt()
        .with_env_filter("backtest_parity=info")
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    // 解析命令行參數
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            output,
            in_place,
        } => {
            let payload = read_payload(&input)?;
            let shape = detect_shape(&payload).context("無法判斷結構描述版本")?;
            let result = from_payload(payload).context("遷移失敗")?;
            let rendered = to_json_string(&result).context("無法序列化遷移後的結果")?;

            let target = if in_place { Some(input.clone()) } else { output };
            match target {
                Some(path) => {
                    fs::write(&path, rendered).with_context(|| format!("無法寫入 {}", path.display()))?;
                    info!(
                        "{} 已由 {:?} 遷移到 {}，寫入 {}",
                        input.display(),
                        shape,
                        RESULT_SCHEMA_VERSION,
                        path.display()
                    );
                }
                None => println!("{}", rendered),
            }
            if !result.warnings.is_empty() {
                info!("遷移產生 {} 條警告", result.warnings.len());
            }
        }
        Commands::Check { input } => {
            let payload = read_payload(&input)?;
            let shape = detect_shape(&payload).context("無法判斷結構描述版本")?;
            match from_payload(payload) {
                Ok(result) => {
                    let status = if shape == PayloadShape::CURRENT {
                        "current"
                    } else {
                        "migratable"
                    };
                    println!("{}: {:?} ({})", input.display(), shape, status);
                    for warning in &result.warnings {
                        println!("  warning: {}", warning);
                    }
                }
                Err(e) => bail!("{}: {:?} 無法遷移: {}", input.display(), shape, e),
            }
        }
    }

    Ok(())
}
