//! ベンチマーク用データセットの生成
//!
//! 生成した CSV は [`crate::reference`] の命名規約（`benchmark_<n>.csv`,
//! `benchmark_chisq_<n>_<k>.csv`）で保存すれば、そのまま参照データセットになる。

use std::io::{self, Write};

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::error::{AnalysisError, AnalysisResult};

/// シードから再現可能な乱数生成器を作る。
pub fn seeded_rng(seed: u64) -> Xoshiro256PlusPlus {
    Xoshiro256PlusPlus::seed_from_u64(seed)
}

/// `n` 行 2 列の整数データ。各値は `[min, max]` の一様乱数で、1/4 の確率で
/// 2 列目を `floor(1 列目 / 2)` に置き換えて相関を持たせる。
pub fn paired_dataset<R: Rng>(
    n: usize,
    min: i64,
    max: i64,
    rng: &mut R,
) -> AnalysisResult<Vec<(i64, i64)>> {
    if min > max {
        return Err(AnalysisError::DegenerateInput(format!(
            "empty value range [{min}, {max}]"
        )));
    }
    let rows = (0..n)
        .map(|_| {
            let x = rng.random_range(min..=max);
            let y = rng.random_range(min..=max);
            if rng.random_range(0..4) == 1 { (x, x.div_euclid(2)) } else { (x, y) }
        })
        .collect();
    Ok(rows)
}

/// `n` 行 `k` 列の one-hot カテゴリデータ。各行で 1 になる列番号を返す。
pub fn categorical_dataset<R: Rng>(n: usize, k: usize, rng: &mut R) -> AnalysisResult<Vec<usize>> {
    if k < 2 {
        return Err(AnalysisError::DegenerateInput(format!(
            "categorical dataset needs >= 2 categories, got {k}"
        )));
    }
    Ok((0..n).map(|_| rng.random_range(0..k)).collect())
}

pub fn write_paired_csv<W: Write>(writer: &mut W, rows: &[(i64, i64)]) -> io::Result<()> {
    for (x, y) in rows {
        writeln!(writer, "{x},{y}")?;
    }
    Ok(())
}

pub fn write_categorical_csv<W: Write>(writer: &mut W, hot: &[usize], k: usize) -> io::Result<()> {
    let mut line = String::with_capacity(2 * k);
    for &h in hot {
        line.clear();
        for j in 0..k {
            if j > 0 {
                line.push(',');
            }
            line.push(if j == h { '1' } else { '0' });
        }
        writeln!(writer, "{line}")?;
    }
    Ok(())
}
