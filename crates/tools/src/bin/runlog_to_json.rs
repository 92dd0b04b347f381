use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use benchstat_core::ReportRecord;
use benchstat_core::runlog::parse_run_log;
use benchstat_tools::common::io::{open_writer, read_to_string};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "ベンチマークハーネスの標準出力ログを結果 JSON に変換する")]
struct Cli {
    /// ハーネスの実行ログ（.gz 可、- で標準入力）
    input_log: PathBuf,

    /// 出力ファイル（省略時: <input>.json、--jsonl なら <input>.jsonl）
    #[arg(long)]
    output: Option<PathBuf>,

    /// 1 行 1 レコードの JSONL で出力する
    #[arg(long)]
    jsonl: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let ext = if cli.jsonl { "jsonl" } else { "json" };
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.{ext}", cli.input_log.display())));

    let text = read_to_string(&cli.input_log)
        .with_context(|| format!("failed to read {}", cli.input_log.display()))?;
    let source = cli.input_log.display().to_string();
    let records = parse_run_log(&text, &source)?;
    if records.is_empty() {
        bail!("no result blocks found in log: {}", cli.input_log.display());
    }
    let reports: Vec<ReportRecord> = records.iter().filter_map(ReportRecord::from_record).collect();

    let mut writer =
        open_writer(&output).with_context(|| format!("failed to create {}", output.display()))?;
    if cli.jsonl {
        for r in &reports {
            serde_json::to_writer(&mut writer, r)?;
            writer.write_all(b"\n")?;
        }
    } else {
        serde_json::to_writer_pretty(&mut writer, &reports)?;
        writer.write_all(b"\n")?;
    }
    writer.close()?;

    log::info!("wrote {} records to {}", reports.len(), output.display());
    Ok(())
}
