//! 統計量のクロス検証
//!
//! ベンチマーク対象システムが報告した値を、平文の参照データセットから直接
//! 再計算した p 値と突き合わせる。比較は常に p 値同士で行い、報告値が検定統計量
//! （`ValueKind::Statistic`）の場合は再計算と同じ式・同じ自由度で p 値へ変換する。
//!
//! レコード単位のエラー（参照データセットなし・退化入力）は、そのレコードを
//! 理由付きでスキップするだけで、パス全体は止めない。

use std::borrow::Borrow;
use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;

use crate::error::{AnalysisError, AnalysisResult};
use crate::record::{BenchmarkRecord, CompositeKey, Metric, ReportedValue, TestKind, ValueKind};
use crate::reference::{ReferenceData, ReferenceDataset, ReferenceRegistry};
use crate::stats::{
    chi_squared_p_value, chi_squared_uniform, pearson, pearson_p_value, summarize,
    t_two_sided_p_value, welch_t_test, Summary, TestOutcome,
};

/// 既定の許容誤差（p 値の絶対差）
pub const DEFAULT_TOLERANCE: f64 = 1e-3;

/// 報告された相関係数が `|r| <= 1` を丸め誤差でわずかに超える分の許容幅
const R_ROUNDING: f64 = 1e-9;

/// 全体サマリに含める所要時間メトリクス
const RUNTIME_METRICS: [Metric; 3] =
    [Metric::TotalRuntime, Metric::SetupTime, Metric::AuditRuntime];

/// 1 レコードの検証結果
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Validation {
    pub test_kind: TestKind,
    /// 参照データセットから再計算した統計量と p 値
    pub recomputed: TestOutcome,
    pub reported: ReportedValue,
    /// 報告値を p 値に換算したもの
    pub reported_p_value: f64,
    pub abs_error: f64,
}

/// 検定種別ごとの絶対誤差列
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ErrorAccumulator {
    errors: BTreeMap<TestKind, Vec<f64>>,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, test_kind: TestKind, abs_error: f64) {
        self.errors.entry(test_kind).or_default().push(abs_error);
    }

    /// `other` の誤差を後ろに連結する。
    pub fn merge(&mut self, other: ErrorAccumulator) {
        for (kind, errors) in other.errors {
            self.errors.entry(kind).or_default().extend(errors);
        }
    }

    pub fn errors(&self, test_kind: TestKind) -> &[f64] {
        self.errors.get(&test_kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self, test_kind: TestKind) -> Option<Summary> {
        summarize(self.errors(test_kind))
    }

    /// 全検定をまとめた要約
    pub fn overall(&self) -> Option<Summary> {
        let all: Vec<f64> = self.errors.values().flatten().copied().collect();
        summarize(&all)
    }

    pub fn test_kinds(&self) -> impl Iterator<Item = TestKind> + '_ {
        self.errors.keys().copied()
    }
}

/// 検証できたレコード
#[derive(Clone, Debug, Serialize)]
pub struct ValidatedRecord {
    /// 入力列中の位置
    pub index: usize,
    pub key: CompositeKey,
    pub run_id: u32,
    pub validation: Validation,
    pub within_tolerance: bool,
}

/// スキップしたレコードと理由
#[derive(Clone, Debug, Serialize)]
pub struct SkippedRecord {
    pub index: usize,
    pub key: CompositeKey,
    pub run_id: u32,
    pub reason: String,
}

/// 検証パス全体の結果
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    pub validated: Vec<ValidatedRecord>,
    pub skipped: Vec<SkippedRecord>,
    pub errors: ErrorAccumulator,
    runtimes: BTreeMap<Metric, Vec<f64>>,
}

impl ValidationReport {
    /// 後続チャンクの結果を連結する（入力順を保つこと）。
    pub fn merge(&mut self, other: ValidationReport) {
        self.validated.extend(other.validated);
        self.skipped.extend(other.skipped);
        self.errors.merge(other.errors);
        for (metric, samples) in other.runtimes {
            self.runtimes.entry(metric).or_default().extend(samples);
        }
    }

    /// 許容誤差を超えたレコード数
    pub fn tolerance_violations(&self) -> usize {
        self.validated.iter().filter(|v| !v.within_tolerance).count()
    }

    /// 検証できたレコードの所要時間要約（秒）
    pub fn runtime_summary(&self, metric: Metric) -> Option<Summary> {
        summarize(self.runtimes.get(&metric).map(Vec::as_slice).unwrap_or(&[]))
    }

    pub fn runtime_metrics(&self) -> impl Iterator<Item = Metric> + '_ {
        self.runtimes.keys().copied()
    }
}

/// クロス検証器
pub struct CrossValidator<'a> {
    registry: &'a ReferenceRegistry,
    tolerance: f64,
}

impl<'a> CrossValidator<'a> {
    pub fn new(registry: &'a ReferenceRegistry) -> Self {
        Self {
            registry,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// 1 レコードを検証する（副作用なし）。
    pub fn validate(&self, record: &BenchmarkRecord) -> AnalysisResult<Validation> {
        let dataset = self.registry.get(record.dataset_size, record.num_categories)?;
        let (recomputed, reported_p_value) = match record.test_kind {
            TestKind::TTest => {
                let (a, b) = paired_columns(dataset)?;
                let outcome = welch_t_test(a, b)?;
                let reported = reported_p_value(record.reported, |t| {
                    t_two_sided_p_value(t, outcome.dof)
                })?;
                (outcome, reported)
            }
            TestKind::Pearson => {
                let (a, b) = paired_columns(dataset)?;
                let outcome = pearson(a, b)?;
                let reported = reported_p_value(record.reported, |r| {
                    if r.abs() > 1.0 + R_ROUNDING {
                        return Err(AnalysisError::DegenerateInput(format!(
                            "reported correlation coefficient {r} is outside [-1, 1]"
                        )));
                    }
                    pearson_p_value(r, a.len())
                })?;
                (outcome, reported)
            }
            TestKind::ChiSquared => {
                let observed = dataset.column_sums().ok_or_else(|| {
                    AnalysisError::DegenerateInput(format!(
                        "{} is not a categorical dataset",
                        dataset.name()
                    ))
                })?;
                let outcome = chi_squared_uniform(&observed)?;
                let reported = reported_p_value(record.reported, |stat| {
                    if stat < 0.0 {
                        return Err(AnalysisError::DegenerateInput(format!(
                            "reported chi-squared statistic {stat} is negative"
                        )));
                    }
                    chi_squared_p_value(stat, outcome.dof)
                })?;
                (outcome, reported)
            }
        };
        Ok(Validation {
            test_kind: record.test_kind,
            recomputed,
            reported: record.reported,
            reported_p_value,
            abs_error: (recomputed.p_value - reported_p_value).abs(),
        })
    }

    /// 検証し、成功したら誤差を `errors` に積む。
    pub fn validate_into(
        &self,
        record: &BenchmarkRecord,
        errors: &mut ErrorAccumulator,
    ) -> AnalysisResult<Validation> {
        let validation = self.validate(record)?;
        errors.push(validation.test_kind, validation.abs_error);
        Ok(validation)
    }

    fn run_from<R>(&self, offset: usize, records: &[R]) -> ValidationReport
    where
        R: Borrow<BenchmarkRecord>,
    {
        let mut report = ValidationReport::default();
        for (i, record) in records.iter().enumerate() {
            let record = record.borrow();
            let index = offset + i;
            match self.validate_into(record, &mut report.errors) {
                Ok(validation) => {
                    for metric in RUNTIME_METRICS {
                        if let Some(v) = record.metric_seconds(metric) {
                            report.runtimes.entry(metric).or_default().push(v);
                        }
                    }
                    log::debug!(
                        "#{index} {}: recomputed p={:.6e} reported p={:.6e} err={:.3e}",
                        record.key(),
                        validation.recomputed.p_value,
                        validation.reported_p_value,
                        validation.abs_error
                    );
                    report.validated.push(ValidatedRecord {
                        index,
                        key: record.key(),
                        run_id: record.run_id,
                        validation,
                        within_tolerance: validation.abs_error <= self.tolerance,
                    });
                }
                Err(e) => {
                    log::warn!("skipping record #{index} {}: {e}", record.key());
                    report.skipped.push(SkippedRecord {
                        index,
                        key: record.key(),
                        run_id: record.run_id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// 入力順に逐次検証する。
    pub fn run<R: Borrow<BenchmarkRecord>>(&self, records: &[R]) -> ValidationReport {
        self.run_from(0, records)
    }

    /// チャンクごとに並列検証し、入力順にマージする。結果は [`Self::run`] と一致する。
    pub fn run_parallel<R>(&self, records: &[R]) -> ValidationReport
    where
        R: Borrow<BenchmarkRecord> + Sync,
    {
        if records.is_empty() {
            return ValidationReport::default();
        }
        let chunk_size = records.len().div_ceil(rayon::current_num_threads().max(1)).max(1);
        let parts: Vec<ValidationReport> = records
            .par_chunks(chunk_size)
            .enumerate()
            .map(|(ci, chunk)| self.run_from(ci * chunk_size, chunk))
            .collect();
        let mut report = ValidationReport::default();
        for part in parts {
            report.merge(part);
        }
        report
    }
}

fn paired_columns(dataset: &ReferenceDataset) -> AnalysisResult<(&[f64], &[f64])> {
    match dataset.data() {
        ReferenceData::Paired { a, b } => Ok((a, b)),
        ReferenceData::Categorical { .. } => Err(AnalysisError::DegenerateInput(format!(
            "{} is not a two-column dataset",
            dataset.name()
        ))),
    }
}

fn reported_p_value(
    reported: ReportedValue,
    to_p_value: impl FnOnce(f64) -> AnalysisResult<f64>,
) -> AnalysisResult<f64> {
    match reported.kind {
        ValueKind::Statistic => to_p_value(reported.value),
        ValueKind::PValue if (0.0..=1.0).contains(&reported.value) => Ok(reported.value),
        ValueKind::PValue => Err(AnalysisError::DegenerateInput(format!(
            "reported p-value {} is outside [0, 1]",
            reported.value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{TimeUnit, Timings};
    use crate::reference::ReferenceKey;

    fn registry() -> ReferenceRegistry {
        let mut reg = ReferenceRegistry::new();
        reg.insert(
            ReferenceKey::paired(5),
            ReferenceDataset::new(
                "paired",
                ReferenceData::Paired {
                    a: vec![1.0, 2.0, 3.0, 4.0, 5.0],
                    b: vec![5.0, 4.0, 3.0, 2.0, 1.0],
                },
            ),
        );
        reg.insert(
            ReferenceKey::categorical(4, 2),
            ReferenceDataset::new(
                "uniform",
                ReferenceData::Categorical {
                    columns: vec![vec![1.0, 0.0, 1.0, 0.0], vec![0.0, 1.0, 0.0, 1.0]],
                },
            ),
        );
        reg
    }

    fn record(kind: TestKind, rows: u32, cats: u32, reported: ReportedValue) -> BenchmarkRecord {
        BenchmarkRecord {
            test_kind: kind,
            use_shares: None,
            num_parties: 3,
            dataset_size: rows,
            num_categories: cats,
            time_unit: TimeUnit::Seconds,
            timings: Timings {
                total: Some(10.0),
                setup: Some(1.0),
                ..Timings::default()
            },
            reported,
            run_id: 0,
        }
    }

    fn statistic(value: f64) -> ReportedValue {
        ReportedValue {
            kind: ValueKind::Statistic,
            value,
        }
    }

    #[test]
    fn t_test_with_identical_means_agrees() {
        let reg = registry();
        let v = CrossValidator::new(&reg)
            .validate(&record(TestKind::TTest, 5, 0, statistic(0.0)))
            .unwrap();
        assert_eq!(v.recomputed.statistic, 0.0);
        assert!((v.recomputed.p_value - 1.0).abs() < 1e-9);
        assert!(v.abs_error < 1e-9);
    }

    #[test]
    fn pearson_reported_r_is_converted() {
        let reg = registry();
        let v = CrossValidator::new(&reg)
            .validate(&record(TestKind::Pearson, 5, 0, statistic(-1.0)))
            .unwrap();
        assert!((v.recomputed.statistic + 1.0).abs() < 1e-12);
        assert!(v.recomputed.p_value < 1e-6);
        assert!(v.reported_p_value < 1e-6);
    }

    #[test]
    fn chi_squared_uses_reported_statistic() {
        let reg = registry();
        let v = CrossValidator::new(&reg)
            .validate(&record(TestKind::ChiSquared, 4, 2, statistic(0.0)))
            .unwrap();
        assert_eq!(v.recomputed.statistic, 0.0);
        assert_eq!(v.recomputed.p_value, 1.0);
        assert_eq!(v.reported_p_value, 1.0);
        assert_eq!(v.abs_error, 0.0);

        // 報告統計量が違えば誤差が出る
        let v = CrossValidator::new(&reg)
            .validate(&record(TestKind::ChiSquared, 4, 2, statistic(4.0)))
            .unwrap();
        assert!(v.abs_error > 0.9);
    }

    #[test]
    fn reported_p_value_is_compared_directly() {
        let reg = registry();
        let pv = ReportedValue {
            kind: ValueKind::PValue,
            value: 0.75,
        };
        let v = CrossValidator::new(&reg).validate(&record(TestKind::TTest, 5, 0, pv)).unwrap();
        assert_eq!(v.reported_p_value, 0.75);
        assert!((v.abs_error - 0.25).abs() < 1e-9);

        let bad = ReportedValue {
            kind: ValueKind::PValue,
            value: 1.5,
        };
        assert!(matches!(
            CrossValidator::new(&reg).validate(&record(TestKind::TTest, 5, 0, bad)),
            Err(AnalysisError::DegenerateInput(_))
        ));
    }

    #[test]
    fn reported_statistic_outside_domain_is_rejected() {
        let reg = registry();
        let validator = CrossValidator::new(&reg);
        // |r| > 1 は p = 0 に丸めず、再計算値 r = -1 と一致したことにもしない
        let err =
            validator.validate(&record(TestKind::Pearson, 5, 0, statistic(1.5))).unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateInput(_)));
        assert!(err.to_string().contains("outside [-1, 1]"));
        let err =
            validator.validate(&record(TestKind::Pearson, 5, 0, statistic(-1.5))).unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateInput(_)));

        // 丸め誤差程度のはみ出しは受け入れる
        let v = validator
            .validate(&record(TestKind::Pearson, 5, 0, statistic(-1.0 - 1e-12)))
            .unwrap();
        assert!(v.abs_error < 1e-6);

        let err =
            validator.validate(&record(TestKind::ChiSquared, 4, 2, statistic(-5.0))).unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateInput(_)));
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn validation_is_deterministic() {
        let reg = registry();
        let validator = CrossValidator::new(&reg);
        let r = record(TestKind::Pearson, 5, 0, statistic(-0.9));
        assert_eq!(validator.validate(&r).unwrap(), validator.validate(&r).unwrap());
    }

    #[test]
    fn missing_reference_is_skipped_and_pass_continues() {
        let reg = registry();
        let records = vec![
            record(TestKind::TTest, 999, 0, statistic(0.0)),
            record(TestKind::TTest, 5, 0, statistic(0.0)),
            record(TestKind::ChiSquared, 4, 2, statistic(0.0)),
        ];
        let report = CrossValidator::new(&reg).run(&records);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].index, 0);
        assert!(report.skipped[0].reason.contains("dataset_size=999"));
        assert_eq!(report.validated.len(), 2);
        assert_eq!(report.errors.errors(TestKind::TTest).len(), 1);
        assert_eq!(report.errors.errors(TestKind::ChiSquared).len(), 1);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.tolerance_violations(), 0);
        // 所要時間は検証できたレコードのみ
        assert_eq!(report.runtime_summary(Metric::TotalRuntime).unwrap().count, 2);
        assert!(report.runtime_summary(Metric::AuditRuntime).is_none());
    }

    #[test]
    fn degenerate_reference_is_skipped_and_pass_continues() {
        let mut reg = registry();
        reg.insert(
            ReferenceKey::paired(4),
            ReferenceDataset::new(
                "constant",
                ReferenceData::Paired {
                    a: vec![2.0, 2.0, 2.0, 2.0],
                    b: vec![1.0, 2.0, 3.0, 4.0],
                },
            ),
        );
        let records = vec![
            record(TestKind::TTest, 5, 0, statistic(0.0)),
            record(TestKind::TTest, 4, 0, statistic(0.0)),
            record(TestKind::Pearson, 5, 0, statistic(-1.0)),
        ];
        let validator = CrossValidator::new(&reg);
        for report in [validator.run(&records), validator.run_parallel(&records)] {
            assert_eq!(report.skipped.len(), 1);
            assert_eq!(report.skipped[0].index, 1);
            assert!(report.skipped[0].reason.contains("degenerate input"));
            assert!(report.skipped[0].reason.contains("zero variance"));
            let indices: Vec<usize> = report.validated.iter().map(|v| v.index).collect();
            assert_eq!(indices, vec![0, 2]);
            assert_eq!(report.errors.errors(TestKind::Pearson).len(), 1);
            assert_eq!(report.runtime_summary(Metric::TotalRuntime).unwrap().count, 2);
        }
    }

    #[test]
    fn parallel_pass_matches_sequential() {
        let reg = registry();
        let mut records = Vec::new();
        for i in 0..40 {
            let r = match i % 4 {
                0 => record(TestKind::TTest, 5, 0, statistic(i as f64 * 0.1)),
                1 => record(TestKind::Pearson, 5, 0, statistic(-0.5)),
                2 => record(TestKind::ChiSquared, 4, 2, statistic(i as f64)),
                _ => record(TestKind::Pearson, 7, 0, statistic(0.0)),
            };
            records.push(r);
        }
        let validator = CrossValidator::new(&reg);
        let seq = validator.run(&records);
        let par = validator.run_parallel(&records);
        assert_eq!(seq.errors, par.errors);
        assert_eq!(
            seq.skipped.iter().map(|s| s.index).collect::<Vec<_>>(),
            par.skipped.iter().map(|s| s.index).collect::<Vec<_>>()
        );
        assert_eq!(seq.validated.len(), par.validated.len());
        assert_eq!(seq.tolerance_violations(), par.tolerance_violations());
    }

    #[test]
    fn accumulator_merge_and_summary() {
        let mut a = ErrorAccumulator::new();
        a.push(TestKind::TTest, 0.1);
        let mut b = ErrorAccumulator::new();
        b.push(TestKind::TTest, 0.3);
        b.push(TestKind::Pearson, 0.0);
        a.merge(b);
        let s = a.summary(TestKind::TTest).unwrap();
        assert!((s.mean - 0.2).abs() < 1e-12);
        assert!((s.std - 0.1).abs() < 1e-12);
        assert_eq!(a.overall().unwrap().count, 3);
        assert!(a.summary(TestKind::ChiSquared).is_none());
    }
}
