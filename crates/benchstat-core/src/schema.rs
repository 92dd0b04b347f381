//! ベンチマーク結果スキーマの正規化
//!
//! 結果ファイルには 2 つの世代がある。
//!
//! | 項目           | 旧世代 (`Legacy`)    | レポート世代 (`Report`)   |
//! |----------------|----------------------|---------------------------|
//! | 検定           | `TestType` (`TTEST`) | `Test` (`T-Test`)         |
//! | 行数           | `DatasetSize`        | `NumRows`                 |
//! | パーティ数     | `NumberOfParties`    | `NumParties`              |
//! | カテゴリ数     | `NumberOfCategories` | `NumCols`                 |
//! | 報告値         | `PValue` (p 値)      | `Value` (検定統計量)      |
//! | 計算時間       | `ComputationTime`    | `ComputeRuntime`          |
//! | 除算時間       | `DivisionTime`       | `DivRuntime`              |
//! | 比較時間       | `ComparisonTime`     | `SignExtractionRuntime`   |
//! | 総時間         | `TotalTime`          | `TotalRuntime`            |
//!
//! どちらにも当てはまらないレコードは読み込み全体を失敗させる。

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AnalysisError, AnalysisResult};
use crate::record::{BenchmarkRecord, ReportedValue, TestKind, TimeUnit, Timings, ValueKind};

/// レコードのスキーマ世代
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaGeneration {
    Legacy,
    Report,
}

/// 正規化オプション
#[derive(Clone, Copy, Debug, Default)]
pub struct NormalizeOptions {
    /// `TimeUnit` フィールドを持たないレコードの所要時間単位
    pub default_time_unit: TimeUnit,
}

/// フィールド名から世代を判定する。
pub fn detect_generation(fields: &Map<String, Value>) -> Option<SchemaGeneration> {
    match (fields.contains_key("TestType"), fields.contains_key("Test")) {
        (true, false) => Some(SchemaGeneration::Legacy),
        (false, true) => Some(SchemaGeneration::Report),
        _ => None,
    }
}

struct Fields<'a> {
    map: &'a Map<String, Value>,
    source: &'a str,
}

impl<'a> Fields<'a> {
    fn schema_err(&self, reason: String) -> AnalysisError {
        AnalysisError::SchemaNormalization {
            source_name: self.source.to_string(),
            reason,
        }
    }

    fn invalid(&self, reason: String) -> AnalysisError {
        AnalysisError::InvalidValue {
            source_name: self.source.to_string(),
            reason,
        }
    }

    /// null と空文字列は欠損扱い
    fn raw(&self, key: &str) -> Option<&'a Value> {
        match self.map.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(v) => Some(v),
        }
    }

    fn str(&self, key: &str) -> AnalysisResult<Option<&'a str>> {
        match self.raw(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim())),
            Some(other) => Err(self.invalid(format!("{key} must be a string, got {other}"))),
        }
    }

    fn f64(&self, key: &str) -> AnalysisResult<Option<f64>> {
        let value = match self.raw(key) {
            None => return Ok(None),
            Some(Value::Number(n)) => n.as_f64(),
            // 多倍長浮動小数点は文字列でシリアライズされる
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };
        match value {
            Some(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(self.invalid(format!("{key} is not a finite number"))),
        }
    }

    fn u32(&self, key: &str) -> AnalysisResult<Option<u32>> {
        let Some(v) = self.f64(key)? else {
            return Ok(None);
        };
        if v < 0.0 || v.fract() != 0.0 || v > f64::from(u32::MAX) {
            return Err(self.invalid(format!("{key} must be a non-negative integer, got {v}")));
        }
        Ok(Some(v as u32))
    }

    fn bool(&self, key: &str) -> AnalysisResult<Option<bool>> {
        match self.raw(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Some(true)),
                "false" | "0" => Ok(Some(false)),
                other => Err(self.invalid(format!("{key} is not a boolean: {other}"))),
            },
            Some(Value::Number(n)) => Ok(Some(n.as_f64() != Some(0.0))),
            Some(other) => Err(self.invalid(format!("{key} is not a boolean: {other}"))),
        }
    }

    fn require_u32(&self, key: &str) -> AnalysisResult<u32> {
        let v = self.u32(key)?.ok_or_else(|| self.schema_err(format!("missing field {key}")))?;
        if v == 0 {
            return Err(self.invalid(format!("{key} must be positive")));
        }
        Ok(v)
    }

    fn require_f64(&self, key: &str) -> AnalysisResult<f64> {
        self.f64(key)?.ok_or_else(|| self.schema_err(format!("missing field {key}")))
    }

    fn duration(&self, key: &str) -> AnalysisResult<Option<f64>> {
        match self.f64(key)? {
            Some(v) if v < 0.0 => Err(self.invalid(format!("{key} must be non-negative, got {v}"))),
            other => Ok(other),
        }
    }

    fn test_kind(&self, key: &str) -> AnalysisResult<TestKind> {
        let label = self.str(key)?.ok_or_else(|| self.schema_err(format!("missing field {key}")))?;
        TestKind::from_label(label)
            .ok_or_else(|| self.schema_err(format!("unknown test label {label:?} in {key}")))
    }

    fn time_unit(&self, default: TimeUnit) -> AnalysisResult<TimeUnit> {
        match self.str("TimeUnit")? {
            None => Ok(default),
            Some(label) => TimeUnit::from_label(label)
                .ok_or_else(|| self.invalid(format!("unknown TimeUnit {label:?}"))),
        }
    }

    fn categories(&self, kind: TestKind, key: &str) -> AnalysisResult<u32> {
        if !kind.uses_categories() {
            return Ok(0);
        }
        match self.u32(key)? {
            Some(k) if k >= 2 => Ok(k),
            Some(k) => Err(self.invalid(format!("{key} must be >= 2 for {kind}, got {k}"))),
            None => Err(self.schema_err(format!("missing field {key} for {kind}"))),
        }
    }
}

/// JSON オブジェクト 1 件を正規化する。
pub fn normalize_fields(
    map: &Map<String, Value>,
    source: &str,
    opts: &NormalizeOptions,
) -> AnalysisResult<BenchmarkRecord> {
    let f = Fields { map, source };
    let generation = detect_generation(map).ok_or_else(|| {
        let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.schema_err(format!("expected exactly one of TestType/Test, found fields {keys:?}"))
    })?;
    let time_unit = f.time_unit(opts.default_time_unit)?;
    let run_id = f.u32("RunId")?.unwrap_or(0);

    let record = match generation {
        SchemaGeneration::Legacy => {
            let test_kind = f.test_kind("TestType")?;
            BenchmarkRecord {
                test_kind,
                use_shares: f.bool("UseShares")?,
                num_parties: f.require_u32("NumberOfParties")?,
                dataset_size: f.require_u32("DatasetSize")?,
                num_categories: f.categories(test_kind, "NumberOfCategories")?,
                time_unit,
                timings: Timings {
                    computation: f.duration("ComputationTime")?,
                    division: f.duration("DivisionTime")?,
                    comparison: f.duration("ComparisonTime")?,
                    total: f.duration("TotalTime")?,
                    setup: f.duration("SetupTime")?,
                    audit: f.duration("AuditRuntime")?,
                },
                reported: ReportedValue {
                    kind: ValueKind::PValue,
                    value: f.require_f64("PValue")?,
                },
                run_id,
            }
        }
        SchemaGeneration::Report => {
            let test_kind = f.test_kind("Test")?;
            BenchmarkRecord {
                test_kind,
                use_shares: f.bool("UseShares")?,
                num_parties: f.require_u32("NumParties")?,
                dataset_size: f.require_u32("NumRows")?,
                num_categories: f.categories(test_kind, "NumCols")?,
                time_unit,
                timings: Timings {
                    computation: f.duration("ComputeRuntime")?,
                    division: f.duration("DivRuntime")?,
                    comparison: f.duration("SignExtractionRuntime")?,
                    total: f.duration("TotalRuntime")?,
                    setup: f.duration("SetupTime")?,
                    audit: f.duration("AuditRuntime")?,
                },
                reported: ReportedValue {
                    kind: ValueKind::Statistic,
                    value: f.require_f64("Value")?,
                },
                run_id,
            }
        }
    };
    Ok(record)
}

/// JSON 値（オブジェクトまたはオブジェクト配列）を正規化する。
pub fn normalize_value(
    value: &Value,
    source: &str,
    opts: &NormalizeOptions,
) -> AnalysisResult<Vec<BenchmarkRecord>> {
    match value {
        Value::Object(map) => Ok(vec![normalize_fields(map, source, opts)?]),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => normalize_fields(map, &format!("{source}[{i}]"), opts),
                other => Err(AnalysisError::SchemaNormalization {
                    source_name: format!("{source}[{i}]"),
                    reason: format!("expected an object, got {other}"),
                }),
            })
            .collect(),
        other => Err(AnalysisError::SchemaNormalization {
            source_name: source.to_string(),
            reason: format!("expected an object or array, got {other}"),
        }),
    }
}

/// `.json` ファイルの内容
pub fn parse_json(
    text: &str,
    source: &str,
    opts: &NormalizeOptions,
) -> AnalysisResult<Vec<BenchmarkRecord>> {
    let value: Value = serde_json::from_str(text)?;
    normalize_value(&value, source, opts)
}

/// `.jsonl` ファイルの内容（1 行 1 レコード、空行は無視）
pub fn parse_jsonl(
    text: &str,
    source: &str,
    opts: &NormalizeOptions,
) -> AnalysisResult<Vec<BenchmarkRecord>> {
    let mut records = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(trimmed)?;
        records.extend(normalize_value(&value, &format!("{source}:{}", i + 1), opts)?);
    }
    Ok(records)
}

fn parse_csv_line(line: &str) -> Vec<String> {
    // 結果 CSV は引用符なしで出力されるため、単純 split で扱う。
    line.split(',').map(|c| c.trim().trim_matches('"').to_owned()).collect()
}

/// `.csv` ファイルの内容（ヘッダ行 + 1 行 1 レコード）
pub fn parse_csv(
    text: &str,
    source: &str,
    opts: &NormalizeOptions,
) -> AnalysisResult<Vec<BenchmarkRecord>> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let Some((_, header_line)) = lines.next() else {
        return Ok(Vec::new());
    };
    let headers = parse_csv_line(header_line);
    let mut records = Vec::new();
    for (i, line) in lines {
        let cols = parse_csv_line(line);
        let row_source = format!("{source}:{}", i + 1);
        if cols.len() != headers.len() {
            return Err(AnalysisError::InvalidValue {
                source_name: row_source,
                reason: format!("expected {} columns but got {}", headers.len(), cols.len()),
            });
        }
        let map: Map<String, Value> =
            headers.iter().cloned().zip(cols.into_iter().map(Value::String)).collect();
        records.push(normalize_fields(&map, &row_source, opts)?);
    }
    Ok(records)
}

/// レポート世代の 1 レコード（書き出し用）
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReportRecord {
    pub test: &'static str,
    pub value: f64,
    pub total_runtime: Option<f64>,
    pub setup_time: Option<f64>,
    pub compute_runtime: Option<f64>,
    pub sign_extraction_runtime: Option<f64>,
    pub div_runtime: Option<f64>,
    pub audit_runtime: Option<f64>,
    pub num_parties: u32,
    pub num_rows: u32,
    pub num_cols: u32,
    pub run_id: u32,
    pub time_unit: TimeUnit,
}

impl ReportRecord {
    /// 検定統計量を報告値として持つレコードのみ変換できる。
    pub fn from_record(record: &BenchmarkRecord) -> Option<Self> {
        if record.reported.kind != ValueKind::Statistic {
            return None;
        }
        let num_cols = if record.test_kind.uses_categories() { record.num_categories } else { 2 };
        Some(Self {
            test: record.test_kind.as_str(),
            value: record.reported.value,
            total_runtime: record.timings.total,
            setup_time: record.timings.setup,
            compute_runtime: record.timings.computation,
            sign_extraction_runtime: record.timings.comparison,
            div_runtime: record.timings.division,
            audit_runtime: record.timings.audit,
            num_parties: record.num_parties,
            num_rows: record.dataset_size,
            num_cols,
            run_id: record.run_id,
            time_unit: record.time_unit,
        })
    }
}
