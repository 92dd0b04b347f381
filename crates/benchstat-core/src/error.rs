//! 集計・検証で使うエラー型

use crate::record::{CompositeKey, Metric};

/// 集計・検証処理のエラー
#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    /// バケットに指定メトリクスのサンプルが存在しない
    #[error("no samples for {metric} in bucket {key}")]
    EmptyBucket { key: CompositeKey, metric: Metric },

    /// レコードに対応する参照データセットが登録されていない
    #[error("no reference dataset registered for dataset_size={dataset_size}, num_categories={num_categories}")]
    MissingReferenceDataset { dataset_size: u32, num_categories: u32 },

    /// 統計式の前提条件を満たさない入力（分散ゼロ、期待度数ゼロ等）
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// 既知のどのスキーマ世代にも一致しないレコード
    #[error("unrecognized record schema in {source_name}: {reason}")]
    SchemaNormalization { source_name: String, reason: String },

    /// 値の解析失敗（参照データセットの列数不一致など）
    #[error("invalid value in {source_name}: {reason}")]
    InvalidValue { source_name: String, reason: String },

    /// File I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;
