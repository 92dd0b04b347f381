/// ベンチマーク用データセットの生成
///
/// 出力先を省略すると、参照データセットの命名規約どおりのファイル名
/// （`benchmark_<n>.csv` / `benchmark_chisq_<n>_<k>.csv`）で `--out-dir` に書く。
///
/// 使い方:
///   gen_dataset paired --rows 1000 --min 1 --max 100 --seed 42
///   gen_dataset categorical --rows 5000 --categories 10 --out-dir datasets/
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use benchstat_core::datagen::{
    categorical_dataset, paired_dataset, seeded_rng, write_categorical_csv, write_paired_csv,
};
use benchstat_tools::common::io::{Writer, open_writer};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "ベンチマーク用の乱数データセットを生成する")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,

    /// 出力ディレクトリ（--output 省略時）
    #[arg(long, global = true, default_value = ".")]
    out_dir: PathBuf,

    /// 乱数シード
    #[arg(long, global = true, default_value_t = 0)]
    seed: u64,
}

#[derive(Subcommand)]
enum Cmd {
    /// 2 列の整数データ（t 検定・Pearson 用）
    Paired {
        #[arg(long)]
        rows: usize,
        /// 最小値（両端を含む）
        #[arg(long, default_value_t = 1)]
        min: i64,
        /// 最大値（両端を含む）
        #[arg(long, default_value_t = 100)]
        max: i64,
        /// 出力ファイル
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// one-hot のカテゴリデータ（χ² 用）
    Categorical {
        #[arg(long)]
        rows: usize,
        #[arg(long)]
        categories: usize,
        /// 出力ファイル
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn create(path: &Path) -> Result<Writer> {
    open_writer(path).with_context(|| format!("failed to create {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let mut rng = seeded_rng(cli.seed);
    let path = match cli.cmd {
        Cmd::Paired {
            rows,
            min,
            max,
            output,
        } => {
            let path = output.unwrap_or_else(|| cli.out_dir.join(format!("benchmark_{rows}.csv")));
            let data = paired_dataset(rows, min, max, &mut rng)?;
            let mut writer = create(&path)?;
            write_paired_csv(&mut writer, &data)?;
            writer.close()?;
            path
        }
        Cmd::Categorical {
            rows,
            categories,
            output,
        } => {
            let path = output.unwrap_or_else(|| {
                cli.out_dir.join(format!("benchmark_chisq_{rows}_{categories}.csv"))
            });
            let hot = categorical_dataset(rows, categories, &mut rng)?;
            let mut writer = create(&path)?;
            write_categorical_csv(&mut writer, &hot, categories)?;
            writer.close()?;
            path
        }
    };
    log::info!("wrote {} (seed={})", path.display(), cli.seed);
    Ok(())
}
