//! # benchstat-core
//!
//! 秘密計算ベンチマーク結果の集計と、検定統計量のクロス検証ライブラリ。
//!
//! ## モジュール構成
//!
//! - `record`: 正規化済みレコード・複合キー・メトリクス
//! - `schema`: 2 世代の結果スキーマの読み込みと正規化
//! - `aggregate`: 複合キーごとのサンプル集計と平均・標準偏差
//! - `stats`: Welch t 検定・Pearson 相関・χ² 適合度検定
//! - `reference`: 平文の参照データセット
//! - `validate`: 報告値と再計算値の突き合わせ
//! - `runlog`: ハーネスの標準出力ログの変換
//! - `datagen`: ベンチマーク用データセットの生成

pub mod aggregate;
pub mod datagen;
pub mod error;
pub mod record;
pub mod reference;
pub mod runlog;
pub mod schema;
pub mod stats;
pub mod validate;

pub use aggregate::{AggregationBucket, AggregationIndex};
pub use error::{AnalysisError, AnalysisResult};
pub use record::{
    BenchmarkRecord, CompositeKey, Dimension, Metric, RecordFilter, ReportedValue, TestKind,
    TimeUnit, Timings, ValueKind,
};
pub use reference::{ReferenceAlias, ReferenceDataset, ReferenceKey, ReferenceRegistry};
pub use schema::{NormalizeOptions, ReportRecord, SchemaGeneration};
pub use stats::{Summary, TestOutcome};
pub use validate::{CrossValidator, ErrorAccumulator, ValidationReport};
