/// ベンチマーク結果の集計ツール
///
/// 使い方:
///   # ディレクトリ（.json / .jsonl / .csv、.gz 可）を集計
///   aggregate_results results/
///
///   # 検定と run_id を絞り、JSON で出力
///   aggregate_results --test t-test --run-id 0 --json results/
///
///   # プロット用 CSV も書き出す
///   aggregate_results --plot-csv out/plot.csv results/
use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use benchstat_core::aggregate::ingest;
use benchstat_core::{AggregationIndex, Metric, RecordFilter, Summary, TestKind, TimeUnit};
use benchstat_tools::common::config::AnalysisConfig;
use benchstat_tools::common::io::{load_results, open_writer};
use benchstat_tools::plot::{plot_rows, write_plot_csv};
use clap::Parser;
use serde::Serialize;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(author, version, about = "ベンチマーク結果を複合キーごとに集計する")]
struct Cli {
    /// 結果ファイルまたはディレクトリ（省略時: 設定ファイルの results_dir）
    inputs: Vec<PathBuf>,

    /// 設定ファイル（TOML）
    #[arg(long)]
    config: Option<PathBuf>,

    /// TimeUnit を持たないレコードの単位（s / ms）
    #[arg(long)]
    time_unit: Option<TimeUnit>,

    /// 検定で絞り込む（t-test / pearson / chi2）
    #[arg(long)]
    test: Option<TestKind>,

    /// UseShares で絞り込む（旧世代レコードのみ該当）
    #[arg(long)]
    use_shares: Option<bool>,

    /// run_id で絞り込む
    #[arg(long)]
    run_id: Option<u32>,

    /// 表示するメトリクス（複数指定可、省略時: 全メトリクス）
    #[arg(long = "metric")]
    metrics: Vec<Metric>,

    /// JSON出力モード
    #[arg(long)]
    json: bool,

    /// プロット用CSVの出力先（.gz 可）
    #[arg(long)]
    plot_csv: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// 出力用の構造体
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct BucketOutput {
    test: &'static str,
    dataset_size: u32,
    num_parties: u32,
    num_categories: u32,
    records: usize,
    metrics: BTreeMap<&'static str, Summary>,
}

fn collect_buckets(index: &AggregationIndex, metrics: &[Metric]) -> Vec<BucketOutput> {
    index
        .buckets()
        .map(|bucket| {
            let key = bucket.key();
            let metrics = metrics
                .iter()
                .filter_map(|&m| match bucket.reduce(m) {
                    Ok(s) => Some((m.as_str(), s)),
                    Err(e) => {
                        log::debug!("{e}");
                        None
                    }
                })
                .collect();
            BucketOutput {
                test: key.test_kind.as_str(),
                dataset_size: key.dataset_size,
                num_parties: key.num_parties,
                num_categories: key.num_categories,
                records: bucket.record_count(),
                metrics,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let config = AnalysisConfig::load_optional(cli.config.as_deref())?;
    let inputs = config.result_inputs(&cli.inputs);
    if inputs.is_empty() {
        bail!("no input given (pass files/directories or set results_dir in --config)");
    }

    let records = load_results(&inputs, &config.normalize_options(cli.time_unit))?;
    let filter = RecordFilter {
        test_kind: cli.test,
        use_shares: cli.use_shares,
        run_id: cli.run_id.or(config.run_id),
    };
    let index = ingest(filter.apply(&records));
    if index.is_empty() {
        bail!("no records left after filtering ({} loaded)", records.len());
    }
    log::info!(
        "aggregated {} records into {} buckets",
        index.record_count(),
        index.bucket_count()
    );

    if let Some(path) = &cli.plot_csv {
        let mut writer =
            open_writer(path).with_context(|| format!("failed to create {}", path.display()))?;
        let rows: Vec<_> = index.test_kinds().flat_map(|kind| plot_rows(&index, kind)).collect();
        write_plot_csv(&mut writer, &rows)?;
        writer.close()?;
        log::info!("wrote {} plot rows to {}", rows.len(), path.display());
    }

    let metrics = if cli.metrics.is_empty() { Metric::ALL.to_vec() } else { cli.metrics.clone() };
    let buckets = collect_buckets(&index, &metrics);
    if cli.json {
        print_json(&buckets)?;
    } else {
        print_text(&buckets, &metrics);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 出力
// ---------------------------------------------------------------------------

fn print_text(buckets: &[BucketOutput], metrics: &[Metric]) {
    let mut current: Option<&str> = None;
    for b in buckets {
        if current != Some(b.test) {
            if current.is_some() {
                println!();
            }
            println!("{}", b.test);
            println!("{}", "=".repeat(75));
            current = Some(b.test);
        }
        println!(
            "rows={:<8} parties={:<4} categories={:<4} records={}",
            b.dataset_size, b.num_parties, b.num_categories, b.records
        );
        for m in metrics {
            if let Some(s) = b.metrics.get(m.as_str()) {
                println!(
                    "  {:<18} {:>12.6} ± {:<12.6} (n={})",
                    m.as_str(),
                    s.mean,
                    s.std,
                    s.count
                );
            }
        }
    }
}

fn print_json(buckets: &[BucketOutput]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(buckets)?);
    Ok(())
}
