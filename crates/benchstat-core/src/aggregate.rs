//! 実行結果の集計
//!
//! レコード列を 1 パスで走査し、`検定種別 → データセットサイズ → パーティ数 →
//! カテゴリ数` の入れ子マップにメトリクスのサンプル列を積む。平均・標準偏差は
//! 呼び出し側が [`reduce`] したときに初めて計算し、バケットには保持しない
//! （後から追加のレコードを取り込めるようにするため）。

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{AnalysisError, AnalysisResult};
use crate::record::{BenchmarkRecord, CompositeKey, Dimension, Metric, TestKind};
use crate::stats::{Summary, summarize};

/// 1 つの複合キーに属するメトリクスのサンプル列
#[derive(Clone, Debug)]
pub struct AggregationBucket {
    key: CompositeKey,
    records: usize,
    samples: BTreeMap<Metric, Vec<f64>>,
}

impl AggregationBucket {
    fn new(key: CompositeKey) -> Self {
        Self {
            key,
            records: 0,
            samples: BTreeMap::new(),
        }
    }

    fn push_record(&mut self, record: &BenchmarkRecord) {
        self.records += 1;
        for metric in Metric::ALL {
            if let Some(v) = record.metric_seconds(metric) {
                self.samples.entry(metric).or_default().push(v);
            }
        }
    }

    pub fn key(&self) -> CompositeKey {
        self.key
    }

    /// 取り込んだレコード数
    pub fn record_count(&self) -> usize {
        self.records
    }

    /// メトリクスのサンプル列（秒、取り込み順）
    pub fn samples(&self, metric: Metric) -> &[f64] {
        self.samples.get(&metric).map(Vec::as_slice).unwrap_or(&[])
    }

    /// サンプルを 1 件以上持つメトリクス
    pub fn metrics(&self) -> impl Iterator<Item = Metric> + '_ {
        self.samples.iter().filter(|(_, v)| !v.is_empty()).map(|(m, _)| *m)
    }

    pub fn reduce(&self, metric: Metric) -> AnalysisResult<Summary> {
        summarize(self.samples(metric)).ok_or(AnalysisError::EmptyBucket {
            key: self.key,
            metric,
        })
    }
}

type CategoryMap = BTreeMap<u32, AggregationBucket>;
type PartyMap = BTreeMap<u32, CategoryMap>;
type SizeMap = BTreeMap<u32, PartyMap>;

/// 集計インデックス
#[derive(Clone, Debug, Default)]
pub struct AggregationIndex {
    tree: BTreeMap<TestKind, SizeMap>,
}

impl AggregationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// レコードを追加で取り込む。
    pub fn ingest<'a, I>(&mut self, records: I)
    where
        I: IntoIterator<Item = &'a BenchmarkRecord>,
    {
        for record in records {
            let key = record.key();
            self.tree
                .entry(key.test_kind)
                .or_default()
                .entry(key.dataset_size)
                .or_default()
                .entry(key.num_parties)
                .or_default()
                .entry(key.num_categories)
                .or_insert_with(|| AggregationBucket::new(key))
                .push_record(record);
        }
    }

    pub fn get(&self, key: &CompositeKey) -> Option<&AggregationBucket> {
        self.tree
            .get(&key.test_kind)?
            .get(&key.dataset_size)?
            .get(&key.num_parties)?
            .get(&key.num_categories)
    }

    /// キーが存在しない場合も `EmptyBucket` を返す。
    pub fn reduce(&self, key: &CompositeKey, metric: Metric) -> AnalysisResult<Summary> {
        match self.get(key) {
            Some(bucket) => bucket.reduce(metric),
            None => Err(AnalysisError::EmptyBucket { key: *key, metric }),
        }
    }

    /// 全バケットをキー順に列挙する。
    pub fn buckets(&self) -> impl Iterator<Item = &AggregationBucket> + '_ {
        self.tree
            .values()
            .flat_map(|sizes| sizes.values())
            .flat_map(|parties| parties.values())
            .flat_map(|cats| cats.values())
    }

    /// 指定検定のバケットをキー順に列挙する。
    pub fn buckets_for(
        &self,
        test_kind: TestKind,
    ) -> impl Iterator<Item = &AggregationBucket> + '_ {
        self.tree
            .get(&test_kind)
            .into_iter()
            .flat_map(|sizes| sizes.values())
            .flat_map(|parties| parties.values())
            .flat_map(|cats| cats.values())
    }

    pub fn test_kinds(&self) -> impl Iterator<Item = TestKind> + '_ {
        self.tree.keys().copied()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets().count()
    }

    pub fn record_count(&self) -> usize {
        self.buckets().map(AggregationBucket::record_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// 1 次元に現れる値を昇順・重複なしで返す。
    pub fn sorted_keys(&self, dimension: Dimension) -> Vec<u32> {
        collect_sorted(self.buckets(), dimension)
    }

    /// 指定検定に限定した [`Self::sorted_keys`]
    pub fn sorted_keys_for(&self, test_kind: TestKind, dimension: Dimension) -> Vec<u32> {
        collect_sorted(self.buckets_for(test_kind), dimension)
    }
}

fn collect_sorted<'a>(
    buckets: impl Iterator<Item = &'a AggregationBucket>,
    dimension: Dimension,
) -> Vec<u32> {
    buckets
        .map(|b| b.key().dimension(dimension))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// レコード列から新しいインデックスを構築する。
pub fn ingest<'a, I>(records: I) -> AggregationIndex
where
    I: IntoIterator<Item = &'a BenchmarkRecord>,
{
    let mut index = AggregationIndex::new();
    index.ingest(records);
    index
}

/// バケットのメトリクスを母平均・母標準偏差に縮約する。
pub fn reduce(bucket: &AggregationBucket, metric: Metric) -> AnalysisResult<Summary> {
    bucket.reduce(metric)
}

pub fn sorted_keys(index: &AggregationIndex, dimension: Dimension) -> Vec<u32> {
    index.sorted_keys(dimension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ReportedValue, TimeUnit, Timings, ValueKind};

    fn record(kind: TestKind, rows: u32, parties: u32, cats: u32, comp: f64) -> BenchmarkRecord {
        BenchmarkRecord {
            test_kind: kind,
            use_shares: None,
            num_parties: parties,
            dataset_size: rows,
            num_categories: cats,
            time_unit: TimeUnit::Seconds,
            timings: Timings {
                computation: Some(comp),
                total: Some(comp * 2.0),
                ..Timings::default()
            },
            reported: ReportedValue {
                kind: ValueKind::Statistic,
                value: 0.0,
            },
            run_id: 0,
        }
    }

    #[test]
    fn shared_key_records_form_one_bucket() {
        let records = vec![
            record(TestKind::TTest, 1000, 3, 0, 10.0),
            BenchmarkRecord {
                run_id: 1,
                ..record(TestKind::TTest, 1000, 3, 0, 20.0)
            },
        ];
        let index = ingest(&records);
        let key = CompositeKey::new(TestKind::TTest, 1000, 3, 0);
        let bucket = index.get(&key).unwrap();
        assert_eq!(bucket.record_count(), 2);
        let s = reduce(bucket, Metric::ComputationTime).unwrap();
        assert_eq!(s.mean, 15.0);
        assert_eq!(s.std, 5.0);
        assert_eq!(index.bucket_count(), 1);
    }

    #[test]
    fn missing_metric_is_empty_bucket_error() {
        let records = vec![record(TestKind::Pearson, 5000, 5, 0, 1.0)];
        let index = ingest(&records);
        let key = CompositeKey::new(TestKind::Pearson, 5000, 5, 0);
        let err = index.reduce(&key, Metric::DivisionTime).unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyBucket { metric: Metric::DivisionTime, .. }));

        let absent = CompositeKey::new(TestKind::Pearson, 1, 1, 0);
        assert!(matches!(
            index.reduce(&absent, Metric::ComputationTime),
            Err(AnalysisError::EmptyBucket { .. })
        ));
    }

    #[test]
    fn ingest_can_continue_on_existing_index() {
        let first = vec![record(TestKind::ChiSquared, 1000, 3, 5, 4.0)];
        let mut index = ingest(&first);
        let key = CompositeKey::new(TestKind::ChiSquared, 1000, 3, 5);
        assert_eq!(index.reduce(&key, Metric::ComputationTime).unwrap().mean, 4.0);

        let more = vec![record(TestKind::ChiSquared, 1000, 3, 5, 8.0)];
        index.ingest(&more);
        assert_eq!(index.reduce(&key, Metric::ComputationTime).unwrap().mean, 6.0);
    }

    #[test]
    fn sorted_keys_are_ascending_per_dimension() {
        let records = vec![
            record(TestKind::ChiSquared, 10000, 16, 10, 1.0),
            record(TestKind::ChiSquared, 1000, 3, 5, 1.0),
            record(TestKind::TTest, 5000, 8, 0, 1.0),
            record(TestKind::ChiSquared, 1000, 8, 10, 1.0),
        ];
        let index = ingest(&records);
        assert_eq!(index.sorted_keys(Dimension::DatasetSize), vec![1000, 5000, 10000]);
        assert_eq!(index.sorted_keys(Dimension::Parties), vec![3, 8, 16]);
        assert_eq!(index.sorted_keys(Dimension::Categories), vec![0, 5, 10]);
        assert_eq!(
            index.sorted_keys_for(TestKind::ChiSquared, Dimension::Categories),
            vec![5, 10]
        );
        assert_eq!(index.record_count(), 4);
    }
}
