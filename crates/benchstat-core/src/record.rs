//! 正規化済みのベンチマークレコード
//!
//! 2 世代あるベンチマーク結果スキーマ（[`crate::schema`] 参照）は、読み込み時に
//! すべてこのモジュールの [`BenchmarkRecord`] へ変換される。読み込み後のレコードは
//! 変更しない。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 検定の種類
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TestKind {
    #[serde(rename = "T-Test")]
    TTest,
    #[serde(rename = "Pearson")]
    Pearson,
    #[serde(rename = "Chi-Squared")]
    ChiSquared,
}

impl TestKind {
    pub const ALL: [TestKind; 3] = [TestKind::TTest, TestKind::Pearson, TestKind::ChiSquared];

    /// レポート世代の表記（`Test` フィールドの値）
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TTest => "T-Test",
            Self::Pearson => "Pearson",
            Self::ChiSquared => "Chi-Squared",
        }
    }

    /// 旧世代の表記（`TestType` フィールドの値）
    pub fn legacy_label(self) -> &'static str {
        match self {
            Self::TTest => "TTEST",
            Self::Pearson => "PEARSON",
            Self::ChiSquared => "CHI2",
        }
    }

    /// 両世代の表記を受け付ける
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "T-Test" | "TTEST" | "ttest" | "t-test" => Some(Self::TTest),
            "Pearson" | "PEARSON" | "pearson" => Some(Self::Pearson),
            "Chi-Squared" | "CHI2" | "chi2" | "chi-squared" => Some(Self::ChiSquared),
            _ => None,
        }
    }

    /// カテゴリ数の次元が意味を持つか
    pub fn uses_categories(self) -> bool {
        matches!(self, Self::ChiSquared)
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| format!("unknown test kind: {s}"))
    }
}

/// 所要時間フィールドの単位
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[default]
    #[serde(alias = "s", alias = "sec")]
    Seconds,
    #[serde(alias = "ms")]
    Milliseconds,
}

impl TimeUnit {
    pub fn to_seconds(self, value: f64) -> f64 {
        match self {
            Self::Seconds => value,
            Self::Milliseconds => value / 1000.0,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "seconds" => Some(Self::Seconds),
            "ms" | "milliseconds" => Some(Self::Milliseconds),
            _ => None,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| format!("unknown time unit: {s} (expected s or ms)"))
    }
}

/// 集計対象のメトリクス
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    ComputationTime,
    DivisionTime,
    ComparisonTime,
    TotalRuntime,
    SetupTime,
    AuditRuntime,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::ComputationTime,
        Metric::DivisionTime,
        Metric::ComparisonTime,
        Metric::TotalRuntime,
        Metric::SetupTime,
        Metric::AuditRuntime,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ComputationTime => "computation_time",
            Self::DivisionTime => "division_time",
            Self::ComparisonTime => "comparison_time",
            Self::TotalRuntime => "total_runtime",
            Self::SetupTime => "setup_time",
            Self::AuditRuntime => "audit_runtime",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().replace('-', "_").to_ascii_lowercase();
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown metric: {s}"))
    }
}

/// 報告値が検定統計量そのものか p 値か
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Statistic,
    PValue,
}

/// ベンチマーク対象システムが報告した値
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportedValue {
    pub kind: ValueKind,
    pub value: f64,
}

/// 1 回の実行の所要時間（`BenchmarkRecord::time_unit` 単位）
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    pub computation: Option<f64>,
    pub division: Option<f64>,
    /// 比較（符号ビット抽出）フェーズ
    pub comparison: Option<f64>,
    pub total: Option<f64>,
    pub setup: Option<f64>,
    pub audit: Option<f64>,
}

impl Timings {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::ComputationTime => self.computation,
            Metric::DivisionTime => self.division,
            Metric::ComparisonTime => self.comparison,
            Metric::TotalRuntime => self.total,
            Metric::SetupTime => self.setup,
            Metric::AuditRuntime => self.audit,
        }
    }
}

/// 1 回の実験実行の観測値
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub test_kind: TestKind,
    /// 旧世代レコードのみが持つ（秘密分散モードかどうか）
    pub use_shares: Option<bool>,
    pub num_parties: u32,
    pub dataset_size: u32,
    /// χ² 検定以外では 0
    pub num_categories: u32,
    pub time_unit: TimeUnit,
    pub timings: Timings,
    pub reported: ReportedValue,
    pub run_id: u32,
}

impl BenchmarkRecord {
    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(self.test_kind, self.dataset_size, self.num_parties, self.num_categories)
    }

    /// メトリクス値（秒）。記録されていなければ `None`。
    pub fn metric_seconds(&self, metric: Metric) -> Option<f64> {
        self.timings.get(metric).map(|v| self.time_unit.to_seconds(v))
    }
}

/// 集計バケットの複合キー
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompositeKey {
    pub test_kind: TestKind,
    pub dataset_size: u32,
    pub num_parties: u32,
    pub num_categories: u32,
}

impl CompositeKey {
    /// カテゴリ次元を持たない検定では `num_categories` を 0 に揃える。
    pub fn new(
        test_kind: TestKind,
        dataset_size: u32,
        num_parties: u32,
        num_categories: u32,
    ) -> Self {
        let num_categories = if test_kind.uses_categories() { num_categories } else { 0 };
        Self {
            test_kind,
            dataset_size,
            num_parties,
            num_categories,
        }
    }

    pub fn dimension(&self, dimension: Dimension) -> u32 {
        match dimension {
            Dimension::DatasetSize => self.dataset_size,
            Dimension::Parties => self.num_parties,
            Dimension::Categories => self.num_categories,
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, rows={}, parties={}, categories={})",
            self.test_kind, self.dataset_size, self.num_parties, self.num_categories
        )
    }
}

/// 複合キーの数値次元
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dimension {
    DatasetSize,
    Parties,
    Categories,
}

/// 集計・検証前に適用する事前フィルタ
#[derive(Clone, Copy, Debug, Default)]
pub struct RecordFilter {
    pub test_kind: Option<TestKind>,
    pub use_shares: Option<bool>,
    pub run_id: Option<u32>,
}

impl RecordFilter {
    pub fn matches(&self, record: &BenchmarkRecord) -> bool {
        if self.test_kind.is_some_and(|k| k != record.test_kind) {
            return false;
        }
        if self.use_shares.is_some_and(|s| record.use_shares != Some(s)) {
            return false;
        }
        if self.run_id.is_some_and(|id| id != record.run_id) {
            return false;
        }
        true
    }

    pub fn apply<'a>(
        &'a self,
        records: &'a [BenchmarkRecord],
    ) -> impl Iterator<Item = &'a BenchmarkRecord> + 'a {
        records.iter().filter(move |r| self.matches(r))
    }
}
