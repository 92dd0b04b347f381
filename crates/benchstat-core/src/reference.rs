//! 参照データセット（平文）
//!
//! ファイル名の規約:
//! - `benchmark_<n>.csv`: 2 列の数値データ（t 検定・Pearson 用）、キー `(n, 0)`
//! - `benchmark_chisq_<n>_<k>.csv`: `k` 列のカテゴリ度数データ（χ² 用）、キー `(n, k)`
//!
//! 規約に合わない名前のデータセットは [`ReferenceAlias`] で明示的に登録する。

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{AnalysisError, AnalysisResult};

static PAIRED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^benchmark_(\d+)\.csv$").expect("invalid PAIRED_RE pattern"));
static CATEGORICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^benchmark_chisq_(\d+)_(\d+)\.csv$").expect("invalid CATEGORICAL_RE pattern")
});

/// 登録キー（`num_categories == 0` は 2 列データ）
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReferenceKey {
    pub dataset_size: u32,
    pub num_categories: u32,
}

impl ReferenceKey {
    pub fn paired(dataset_size: u32) -> Self {
        Self {
            dataset_size,
            num_categories: 0,
        }
    }

    pub fn categorical(dataset_size: u32, num_categories: u32) -> Self {
        Self {
            dataset_size,
            num_categories,
        }
    }

    pub fn is_categorical(&self) -> bool {
        self.num_categories > 0
    }

    /// 命名規約からキーを得る。
    pub fn from_file_name(name: &str) -> Option<Self> {
        if let Some(caps) = CATEGORICAL_RE.captures(name) {
            let n = caps.get(1)?.as_str().parse().ok()?;
            let k = caps.get(2)?.as_str().parse().ok()?;
            // k < 2 のカテゴリデータは 2 列データのキーと衝突する
            if k < 2 {
                return None;
            }
            return Some(Self::categorical(n, k));
        }
        let caps = PAIRED_RE.captures(name)?;
        Some(Self::paired(caps.get(1)?.as_str().parse().ok()?))
    }
}

/// 命名規約外のデータセットの明示登録
#[derive(Clone, Debug, Deserialize)]
pub struct ReferenceAlias {
    pub dataset_size: u32,
    #[serde(default)]
    pub num_categories: u32,
    /// 参照ディレクトリからの相対パス
    pub file: PathBuf,
}

impl ReferenceAlias {
    pub fn key(&self) -> ReferenceKey {
        ReferenceKey::categorical(self.dataset_size, self.num_categories)
    }
}

/// データセットの中身
#[derive(Clone, Debug, PartialEq)]
pub enum ReferenceData {
    /// t 検定・Pearson 用の 2 列
    Paired { a: Vec<f64>, b: Vec<f64> },
    /// χ² 用の度数列（列優先）
    Categorical { columns: Vec<Vec<f64>> },
}

/// 読み込み済みの参照データセット
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceDataset {
    name: String,
    data: ReferenceData,
}

impl ReferenceDataset {
    pub fn new(name: impl Into<String>, data: ReferenceData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// 2 列 CSV。先頭行が数値でなければヘッダとして読み飛ばす。
    ///
    /// 列数が 2 でない行はエラー。2 行目以降の数値として読めない行は警告して読み飛ばす。
    pub fn parse_paired(text: &str, name: &str) -> AnalysisResult<Self> {
        let mut a = Vec::new();
        let mut b = Vec::new();
        let mut first = true;
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let is_first = std::mem::replace(&mut first, false);
            let cols: Vec<&str> = line.split(',').map(str::trim).collect();
            if cols.len() != 2 {
                return Err(AnalysisError::InvalidValue {
                    source_name: format!("{name}:{}", i + 1),
                    reason: format!("expected 2 columns but got {}", cols.len()),
                });
            }
            match (cols[0].parse::<f64>(), cols[1].parse::<f64>()) {
                (Ok(x), Ok(y)) => {
                    a.push(x);
                    b.push(y);
                }
                _ if is_first => log::debug!("{name}: treating line {} as header", i + 1),
                _ => log::warn!("{name}:{}: skipping non-numeric row {line:?}", i + 1),
            }
        }
        if a.is_empty() {
            return Err(AnalysisError::InvalidValue {
                source_name: name.to_string(),
                reason: "no numeric rows".to_string(),
            });
        }
        Ok(Self::new(name, ReferenceData::Paired { a, b }))
    }

    /// `k` 列の度数 CSV（ヘッダなし）。列数の合わない行はエラー。
    pub fn parse_categorical(text: &str, name: &str, k: usize) -> AnalysisResult<Self> {
        let mut columns = vec![Vec::new(); k];
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let cols: Vec<&str> = line.split(',').map(str::trim).collect();
            if cols.len() != k {
                return Err(AnalysisError::InvalidValue {
                    source_name: format!("{name}:{}", i + 1),
                    reason: format!("expected {k} columns but got {}", cols.len()),
                });
            }
            for (column, cell) in columns.iter_mut().zip(cols) {
                let v = cell.parse::<f64>().map_err(|e| AnalysisError::InvalidValue {
                    source_name: format!("{name}:{}", i + 1),
                    reason: format!("{cell:?}: {e}"),
                })?;
                column.push(v);
            }
        }
        Ok(Self::new(name, ReferenceData::Categorical { columns }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ReferenceData {
        &self.data
    }

    pub fn rows(&self) -> usize {
        match &self.data {
            ReferenceData::Paired { a, .. } => a.len(),
            ReferenceData::Categorical { columns } => columns.first().map_or(0, Vec::len),
        }
    }

    /// カテゴリ度数データの列和（観測度数ヒストグラム）
    pub fn column_sums(&self) -> Option<Vec<f64>> {
        match &self.data {
            ReferenceData::Categorical { columns } => {
                Some(columns.iter().map(|c| c.iter().sum()).collect())
            }
            ReferenceData::Paired { .. } => None,
        }
    }
}

/// `(dataset_size, num_categories)` で引く参照データセット群
///
/// 検証前に一度だけ構築し、以降は共有参照のみで使う。
#[derive(Clone, Debug, Default)]
pub struct ReferenceRegistry {
    datasets: BTreeMap<ReferenceKey, ReferenceDataset>,
}

impl ReferenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ReferenceKey, dataset: ReferenceDataset) {
        if let Some(prev) = self.datasets.insert(key, dataset) {
            log::warn!(
                "reference dataset {} replaced for rows={}, categories={}",
                prev.name(),
                key.dataset_size,
                key.num_categories
            );
        }
    }

    pub fn get(
        &self,
        dataset_size: u32,
        num_categories: u32,
    ) -> AnalysisResult<&ReferenceDataset> {
        self.datasets.get(&ReferenceKey::categorical(dataset_size, num_categories)).ok_or(
            AnalysisError::MissingReferenceDataset {
                dataset_size,
                num_categories,
            },
        )
    }

    pub fn keys(&self) -> impl Iterator<Item = ReferenceKey> + '_ {
        self.datasets.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// キーに応じた形式でファイルを読み込んで登録する。
    pub fn load_file(&mut self, key: ReferenceKey, path: &Path) -> AnalysisResult<()> {
        let text = fs::read_to_string(path)?;
        let name = path.display().to_string();
        let dataset = if key.is_categorical() {
            ReferenceDataset::parse_categorical(&text, &name, key.num_categories as usize)?
        } else {
            ReferenceDataset::parse_paired(&text, &name)?
        };
        if dataset.rows() != key.dataset_size as usize {
            log::warn!(
                "{name}: registered as {} rows but contains {}",
                key.dataset_size,
                dataset.rows()
            );
        }
        self.insert(key, dataset);
        Ok(())
    }

    /// ディレクトリ内の規約名ファイルとエイリアスを登録する。
    pub fn load_dir(dir: &Path, aliases: &[ReferenceAlias]) -> AnalysisResult<Self> {
        let mut registry = Self::new();
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        entries.sort();
        for path in entries {
            let Some(key) =
                path.file_name().and_then(|n| n.to_str()).and_then(ReferenceKey::from_file_name)
            else {
                continue;
            };
            registry.load_file(key, &path)?;
        }
        for alias in aliases {
            registry.load_file(alias.key(), &dir.join(&alias.file))?;
        }
        log::info!("loaded {} reference datasets from {}", registry.len(), dir.display());
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_convention() {
        assert_eq!(
            ReferenceKey::from_file_name("benchmark_1000.csv"),
            Some(ReferenceKey::paired(1000))
        );
        assert_eq!(
            ReferenceKey::from_file_name("benchmark_chisq_5000_10.csv"),
            Some(ReferenceKey::categorical(5000, 10))
        );
        assert_eq!(ReferenceKey::from_file_name("abalone_height_vs_weight.csv"), None);
        assert_eq!(ReferenceKey::from_file_name("benchmark_1000.csv.bak"), None);
        assert_eq!(ReferenceKey::from_file_name("benchmark_chisq_1000_0.csv"), None);
        assert_eq!(ReferenceKey::from_file_name("benchmark_chisq_1000_1.csv"), None);
    }

    #[test]
    fn paired_skips_non_numeric_rows() {
        let ds = ReferenceDataset::parse_paired("A,B\n1,2\n3,4\nx,5\n", "p.csv").unwrap();
        assert_eq!(ds.rows(), 2);
        assert_eq!(
            ds.data(),
            &ReferenceData::Paired {
                a: vec![1.0, 3.0],
                b: vec![2.0, 4.0]
            }
        );
    }

    #[test]
    fn paired_rejects_rows_without_two_columns() {
        let err = ReferenceDataset::parse_paired("1,2\n5,6\n7,8,9\n", "p.csv").unwrap_err();
        match err {
            AnalysisError::InvalidValue {
                source_name,
                reason,
            } => {
                assert_eq!(source_name, "p.csv:3");
                assert!(reason.contains("got 3"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(ReferenceDataset::parse_paired("1,2\n3\n", "p.csv").is_err());
    }

    #[test]
    fn paired_keeps_only_numeric_rows_after_header() {
        let ds = ReferenceDataset::parse_paired("1,2\n3,abc\n5,6\n", "p.csv").unwrap();
        assert_eq!(
            ds.data(),
            &ReferenceData::Paired {
                a: vec![1.0, 5.0],
                b: vec![2.0, 6.0]
            }
        );
    }

    #[test]
    fn categorical_sums_columns() {
        let ds = ReferenceDataset::parse_categorical("1,0,0\n0,1,0\n1,0,0\n", "c.csv", 3).unwrap();
        assert_eq!(ds.rows(), 3);
        assert_eq!(ds.column_sums(), Some(vec![2.0, 1.0, 0.0]));
    }

    #[test]
    fn categorical_rejects_ragged_rows() {
        let err = ReferenceDataset::parse_categorical("1,0,0\n0,1\n", "c.csv", 3).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidValue { .. }));
    }

    #[test]
    fn missing_key_is_reported() {
        let registry = ReferenceRegistry::new();
        assert!(matches!(
            registry.get(1000, 0),
            Err(AnalysisError::MissingReferenceDataset {
                dataset_size: 1000,
                num_categories: 0
            })
        ));
    }
}
