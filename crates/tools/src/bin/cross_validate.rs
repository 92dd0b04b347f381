/// ベンチマークが報告した統計量を平文データセットからの再計算値と突き合わせる
///
/// 使い方:
///   # run_id 0 のレコードのみ検証（既定）
///   cross_validate --references datasets/ results/
///
///   # すべての run_id を並列で検証し、JSON で出力
///   cross_validate --references datasets/ --all-runs --parallel --json results/
///
///   # 設定ファイル（参照データセットのエイリアス等）を使う
///   cross_validate --config analysis.toml
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use benchstat_core::validate::{DEFAULT_TOLERANCE, SkippedRecord, ValidatedRecord};
use benchstat_core::{
    CrossValidator, Metric, RecordFilter, ReferenceRegistry, Summary, TestKind, TimeUnit,
    ValidationReport,
};
use benchstat_tools::common::config::AnalysisConfig;
use benchstat_tools::common::io::load_results;
use clap::Parser;
use serde::Serialize;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(author, version, about = "報告された検定結果を参照データセットから再計算して検証する")]
struct Cli {
    /// 結果ファイルまたはディレクトリ（省略時: 設定ファイルの results_dir）
    inputs: Vec<PathBuf>,

    /// 参照データセットのディレクトリ（省略時: 設定ファイルの references_dir）
    #[arg(long)]
    references: Option<PathBuf>,

    /// 設定ファイル（TOML）
    #[arg(long)]
    config: Option<PathBuf>,

    /// TimeUnit を持たないレコードの単位（s / ms）
    #[arg(long)]
    time_unit: Option<TimeUnit>,

    /// p 値の絶対誤差の許容値
    #[arg(long)]
    tolerance: Option<f64>,

    /// 検証対象の run_id（既定: 0）
    #[arg(long, conflicts_with = "all_runs")]
    run_id: Option<u32>,

    /// run_id で絞り込まない
    #[arg(long)]
    all_runs: bool,

    /// 検定で絞り込む（t-test / pearson / chi2）
    #[arg(long)]
    test: Option<TestKind>,

    /// rayon で並列に検証する
    #[arg(long)]
    parallel: bool,

    /// レコードごとの結果も表示する
    #[arg(long)]
    verbose: bool,

    /// JSON出力モード
    #[arg(long)]
    json: bool,
}

// ---------------------------------------------------------------------------
// 出力用の構造体
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct KindErrors {
    test: &'static str,
    #[serde(flatten)]
    summary: Summary,
}

#[derive(Serialize)]
struct RuntimeOutput {
    metric: &'static str,
    #[serde(flatten)]
    summary: Summary,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    tolerance: f64,
    validated: usize,
    tolerance_violations: usize,
    errors: Vec<KindErrors>,
    overall: Option<Summary>,
    runtimes: Vec<RuntimeOutput>,
    skipped: &'a [SkippedRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    records: Option<&'a [ValidatedRecord]>,
}

fn kind_errors(report: &ValidationReport) -> Vec<KindErrors> {
    TestKind::ALL
        .into_iter()
        .filter_map(|k| {
            report.errors.summary(k).map(|summary| KindErrors { test: k.as_str(), summary })
        })
        .collect()
}

fn runtimes(report: &ValidationReport) -> Vec<RuntimeOutput> {
    [Metric::TotalRuntime, Metric::SetupTime, Metric::AuditRuntime]
        .into_iter()
        .filter_map(|m| {
            report.runtime_summary(m).map(|summary| RuntimeOutput { metric: m.as_str(), summary })
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
    let Some(references) = cli.references.clone().or_else(|| config.references_dir.clone()) else {
        bail!("no reference directory given (--references or references_dir in --config)");
    };
    let tolerance = cli.tolerance.or(config.tolerance).unwrap_or(DEFAULT_TOLERANCE);
    if tolerance.is_nan() || tolerance < 0.0 {
        bail!("--tolerance must be a non-negative number, got {tolerance}");
    }
    let parallel = cli.parallel || config.parallel.unwrap_or(false);

    // 参照データセットは検証前に一度だけ読み込む
    let registry = ReferenceRegistry::load_dir(&references, &config.reference_aliases)
        .with_context(|| format!("failed to load references from {}", references.display()))?;

    let records = load_results(&inputs, &config.normalize_options(cli.time_unit))?;
    let run_id =
        if cli.all_runs { None } else { Some(cli.run_id.or(config.run_id).unwrap_or(0)) };
    let filter = RecordFilter {
        test_kind: cli.test,
        use_shares: None,
        run_id,
    };
    let selected: Vec<_> = filter.apply(&records).collect();
    if selected.is_empty() {
        bail!("no records left after filtering ({} loaded)", records.len());
    }

    let validator = CrossValidator::new(&registry).with_tolerance(tolerance);
    let report =
        if parallel { validator.run_parallel(&selected) } else { validator.run(&selected) };
    log::info!(
        "validated {} of {} records ({} skipped)",
        report.validated.len(),
        selected.len(),
        report.skipped.len()
    );

    if cli.json {
        print_json(&report, tolerance, cli.verbose)?;
    } else {
        print_text(&report, tolerance, cli.verbose);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 出力
// ---------------------------------------------------------------------------

fn print_summary_line(label: &str, s: &Summary) {
    println!("  {:<14} mean={:.6e}  std={:.6e}  (n={})", label, s.mean, s.std, s.count);
}

fn print_text(report: &ValidationReport, tolerance: f64, verbose: bool) {
    if verbose {
        println!("レコード別");
        println!("{}", "=".repeat(75));
        for v in &report.validated {
            let mark = if v.within_tolerance { "" } else { "  !" };
            println!(
                "#{:<5} {} run={}  stat={:.6}  p={:.6e}  reported_p={:.6e}  err={:.3e}{mark}",
                v.index,
                v.key,
                v.run_id,
                v.validation.recomputed.statistic,
                v.validation.recomputed.p_value,
                v.validation.reported_p_value,
                v.validation.abs_error,
            );
        }
        println!();
    }

    println!("p 値の絶対誤差");
    println!("{}", "=".repeat(75));
    for k in kind_errors(report) {
        print_summary_line(k.test, &k.summary);
    }
    if let Some(overall) = report.errors.overall() {
        print_summary_line("overall", &overall);
    }
    println!(
        "  許容値 {tolerance:e} 超過: {} / {}",
        report.tolerance_violations(),
        report.validated.len()
    );
    println!();

    println!("所要時間（秒）");
    println!("{}", "=".repeat(75));
    for r in runtimes(report) {
        let s = &r.summary;
        println!("  {:<14} mean={:.6}  std={:.6}  (n={})", r.metric, s.mean, s.std, s.count);
    }

    if !report.skipped.is_empty() {
        println!();
        println!("スキップしたレコード: {}", report.skipped.len());
        println!("{}", "=".repeat(75));
        for s in &report.skipped {
            println!("  #{:<5} {} run={}: {}", s.index, s.key, s.run_id, s.reason);
        }
    }
}

fn print_json(report: &ValidationReport, tolerance: f64, verbose: bool) -> Result<()> {
    let out = JsonOutput {
        tolerance,
        validated: report.validated.len(),
        tolerance_violations: report.tolerance_violations(),
        errors: kind_errors(report),
        overall: report.errors.overall(),
        runtimes: runtimes(report),
        skipped: &report.skipped,
        records: verbose.then_some(report.validated.as_slice()),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
