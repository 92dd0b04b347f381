//! 解析設定ファイル（TOML）
//!
//! ```toml
//! results_dir = "results"
//! references_dir = "datasets"
//! time_unit = "s"
//! tolerance = 1e-3
//! parallel = true
//! run_id = 0
//!
//! [[reference_alias]]
//! dataset_size = 4177
//! file = "abalone_height_vs_weight.csv"
//!
//! [[reference_alias]]
//! dataset_size = 108
//! num_categories = 4
//! file = "pittsburgh_bridges_categorical.csv"
//! ```
//!
//! どの項目も省略可能で、コマンドライン引数が指定されればそちらを優先する。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use benchstat_core::{NormalizeOptions, ReferenceAlias, TimeUnit};
use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub results_dir: Option<PathBuf>,
    pub references_dir: Option<PathBuf>,
    /// `TimeUnit` を持たないレコードの所要時間単位
    pub time_unit: Option<TimeUnit>,
    pub tolerance: Option<f64>,
    pub parallel: Option<bool>,
    pub run_id: Option<u32>,
    #[serde(rename = "reference_alias")]
    pub reference_aliases: Vec<ReferenceAlias>,
}

impl AnalysisConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid analysis config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// `--config` 未指定なら既定値
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// コマンドライン指定を優先した正規化オプション
    pub fn normalize_options(&self, cli_time_unit: Option<TimeUnit>) -> NormalizeOptions {
        NormalizeOptions {
            default_time_unit: cli_time_unit.or(self.time_unit).unwrap_or_default(),
        }
    }

    /// 入力パス: コマンドライン指定がなければ `results_dir`
    pub fn result_inputs(&self, cli_inputs: &[PathBuf]) -> Vec<PathBuf> {
        if cli_inputs.is_empty() {
            self.results_dir.iter().cloned().collect()
        } else {
            cli_inputs.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let cfg = AnalysisConfig::from_toml_str(
            r#"
results_dir = "results"
references_dir = "datasets"
time_unit = "ms"
tolerance = 0.01
parallel = true
run_id = 2

[[reference_alias]]
dataset_size = 4177
file = "abalone_height_vs_weight.csv"

[[reference_alias]]
dataset_size = 108
num_categories = 4
file = "pittsburgh_bridges_categorical.csv"
"#,
        )
        .unwrap();
        assert_eq!(cfg.results_dir, Some(PathBuf::from("results")));
        assert_eq!(cfg.time_unit, Some(TimeUnit::Milliseconds));
        assert_eq!(cfg.tolerance, Some(0.01));
        assert_eq!(cfg.run_id, Some(2));
        assert_eq!(cfg.reference_aliases.len(), 2);
        assert_eq!(cfg.reference_aliases[0].num_categories, 0);
        assert_eq!(cfg.reference_aliases[1].key().num_categories, 4);
    }

    #[test]
    fn cli_values_take_precedence() {
        let cfg = AnalysisConfig::from_toml_str("time_unit = \"ms\"\nresults_dir = \"r\"").unwrap();
        assert_eq!(cfg.normalize_options(None).default_time_unit, TimeUnit::Milliseconds);
        assert_eq!(
            cfg.normalize_options(Some(TimeUnit::Seconds)).default_time_unit,
            TimeUnit::Seconds
        );
        assert_eq!(cfg.result_inputs(&[]), vec![PathBuf::from("r")]);
        assert_eq!(cfg.result_inputs(&[PathBuf::from("x")]), vec![PathBuf::from("x")]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(AnalysisConfig::from_toml_str("tolerence = 0.1").is_err());
        assert_eq!(AnalysisConfig::from_toml_str("").unwrap().tolerance, None);
    }
}
