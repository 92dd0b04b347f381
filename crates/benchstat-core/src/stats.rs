//! 要約統計と検定統計量・p 値の閉形式計算
//!
//! - t 検定: Welch の t 統計量と Welch–Satterthwaite 自由度、両側 p 値
//!   `p = 2 * sf_t(|t|, df)`
//! - Pearson: 相関係数 `r` と、`df = n - 2` における
//!   `p = I(df/2, 1/2, df / (df + t²))`、`t² = r² df / ((1 - r)(1 + r))`
//! - χ²: 一様分布を期待度数とする適合度統計量と `sf_χ²(stat, k - 1)`

use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF, StudentsT};
use statrs::function::beta::checked_beta_reg;

use crate::error::{AnalysisError, AnalysisResult};

/// 母平均・母標準偏差（`ddof = 0`）による要約
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
}

/// 空のスライスには `None` を返す。
pub fn summarize(samples: &[f64]) -> Option<Summary> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    Some(Summary {
        count: samples.len(),
        mean,
        // 丸め誤差で負になった分散を 0 に寄せる
        std: var.max(0.0).sqrt(),
    })
}

/// 不偏分散（`ddof = 1`）。2 件未満では `None`。
pub fn sample_variance(samples: &[f64]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    Some(samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0))
}

/// 再計算した検定結果
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TestOutcome {
    pub statistic: f64,
    pub dof: f64,
    pub p_value: f64,
}

fn ensure_finite(value: f64, what: &str) -> AnalysisResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AnalysisError::DegenerateInput(format!("{what} is not finite: {value}")))
    }
}

// ---------------------------------------------------------------------------
// t 検定
// ---------------------------------------------------------------------------

/// Welch–Satterthwaite 自由度
pub fn welch_dof(v1: f64, n1: usize, v2: f64, n2: usize) -> f64 {
    let (n1, n2) = (n1 as f64, n2 as f64);
    let vn1 = v1 / n1;
    let vn2 = v2 / n2;
    (vn1 + vn2).powi(2) / (vn1.powi(2) / (n1 - 1.0) + vn2.powi(2) / (n2 - 1.0))
}

/// 自由度 `df` の t 分布における両側 p 値
pub fn t_two_sided_p_value(t: f64, dof: f64) -> AnalysisResult<f64> {
    let t = ensure_finite(t, "t statistic")?;
    let dist = StudentsT::new(0.0, 1.0, dof).map_err(|e| {
        AnalysisError::DegenerateInput(format!("invalid t distribution (df={dof}): {e}"))
    })?;
    Ok((2.0 * dist.sf(t.abs())).clamp(0.0, 1.0))
}

/// 2 標本 Welch t 検定
pub fn welch_t_test(a: &[f64], b: &[f64]) -> AnalysisResult<TestOutcome> {
    let v1 = sample_variance(a).ok_or_else(|| {
        AnalysisError::DegenerateInput(format!(
            "t-test needs >= 2 rows per column, got {}",
            a.len()
        ))
    })?;
    let v2 = sample_variance(b).ok_or_else(|| {
        AnalysisError::DegenerateInput(format!(
            "t-test needs >= 2 rows per column, got {}",
            b.len()
        ))
    })?;
    if v1 == 0.0 || v2 == 0.0 {
        return Err(AnalysisError::DegenerateInput(
            "t-test column has zero variance".to_string(),
        ));
    }
    let m1 = a.iter().sum::<f64>() / a.len() as f64;
    let m2 = b.iter().sum::<f64>() / b.len() as f64;
    let se = (v1 / a.len() as f64 + v2 / b.len() as f64).sqrt();
    let statistic = (m1 - m2) / se;
    let dof = welch_dof(v1, a.len(), v2, b.len());
    let p_value = t_two_sided_p_value(statistic, dof)?;
    Ok(TestOutcome {
        statistic,
        dof,
        p_value,
    })
}

// ---------------------------------------------------------------------------
// Pearson 相関
// ---------------------------------------------------------------------------

/// 相関係数 `r` から両側 p 値を求める（`n` はペア数）。
pub fn pearson_p_value(r: f64, n: usize) -> AnalysisResult<f64> {
    if n < 3 {
        return Err(AnalysisError::DegenerateInput(format!(
            "pearson needs >= 3 rows, got {n}"
        )));
    }
    let r = ensure_finite(r, "correlation coefficient")?.clamp(-1.0, 1.0);
    let dof = n as f64 - 2.0;
    // |r| = 1 では t² = ∞ となり x = 0 に落ちる
    let t_squared = r * r * (dof / ((1.0 - r) * (1.0 + r)));
    let x = (dof / (dof + t_squared)).clamp(0.0, 1.0);
    let p = checked_beta_reg(0.5 * dof, 0.5, x).map_err(|e| {
        AnalysisError::DegenerateInput(format!("incomplete beta failed (df={dof}, x={x}): {e}"))
    })?;
    Ok(p.clamp(0.0, 1.0))
}

/// Pearson の積率相関係数と p 値
pub fn pearson(a: &[f64], b: &[f64]) -> AnalysisResult<TestOutcome> {
    if a.len() != b.len() {
        return Err(AnalysisError::DegenerateInput(format!(
            "pearson columns differ in length: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    let n = a.len();
    if n < 3 {
        return Err(AnalysisError::DegenerateInput(format!(
            "pearson needs >= 3 rows, got {n}"
        )));
    }
    let ma = a.iter().sum::<f64>() / n as f64;
    let mb = b.iter().sum::<f64>() / n as f64;
    let (mut sab, mut saa, mut sbb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let dx = x - ma;
        let dy = y - mb;
        sab += dx * dy;
        saa += dx * dx;
        sbb += dy * dy;
    }
    if saa == 0.0 || sbb == 0.0 {
        return Err(AnalysisError::DegenerateInput(
            "pearson column has zero variance".to_string(),
        ));
    }
    let statistic = (sab / (saa * sbb).sqrt()).clamp(-1.0, 1.0);
    let p_value = pearson_p_value(statistic, n)?;
    Ok(TestOutcome {
        statistic,
        dof: n as f64 - 2.0,
        p_value,
    })
}

// ---------------------------------------------------------------------------
// χ² 適合度検定
// ---------------------------------------------------------------------------

/// 自由度 `dof` の χ² 分布の生存関数
pub fn chi_squared_p_value(statistic: f64, dof: f64) -> AnalysisResult<f64> {
    let statistic = ensure_finite(statistic, "chi-squared statistic")?;
    let dist = ChiSquared::new(dof).map_err(|e| {
        AnalysisError::DegenerateInput(format!("invalid chi-squared distribution (df={dof}): {e}"))
    })?;
    if statistic <= 0.0 {
        return Ok(1.0);
    }
    Ok(dist.sf(statistic).clamp(0.0, 1.0))
}

/// 観測度数と、総数を一様に配った期待度数との χ² 適合度検定
pub fn chi_squared_uniform(observed: &[f64]) -> AnalysisResult<TestOutcome> {
    let k = observed.len();
    if k < 2 {
        return Err(AnalysisError::DegenerateInput(format!(
            "chi-squared needs >= 2 categories, got {k}"
        )));
    }
    let total: f64 = observed.iter().sum();
    let expected = total / k as f64;
    if expected <= 0.0 {
        return Err(AnalysisError::DegenerateInput(
            "chi-squared expected count is zero".to_string(),
        ));
    }
    let statistic = observed.iter().map(|o| (o - expected).powi(2) / expected).sum::<f64>();
    let dof = (k - 1) as f64;
    let p_value = chi_squared_p_value(statistic, dof)?;
    Ok(TestOutcome {
        statistic,
        dof,
        p_value,
    })
}
