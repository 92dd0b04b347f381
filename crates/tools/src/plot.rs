//! グループ化棒グラフ用の CSV 出力
//!
//! 描画自体は外部ツールに任せ、ここでは各バケットの平均・標準偏差と棒の x 座標
//! だけを計算する。グループは `(データセットサイズ, カテゴリ数)` の昇順で並べ、
//! グループ内の棒はパーティ数の昇順に置く。

use std::io::{self, Write};

use benchstat_core::{AggregationIndex, CompositeKey, Dimension, Metric, TestKind};

/// 棒の幅
pub const BAR_WIDTH: f64 = 0.15;
/// 同一グループ内の棒の間隔
pub const BAR_GAP: f64 = 0.02;

/// グループ `group` 内で `bar` 番目（全 `bars` 本）の棒の中心 x 座標
pub fn bar_position(group: usize, bar: usize, bars: usize) -> f64 {
    let total_width = BAR_WIDTH * bars as f64 + BAR_GAP * bars.saturating_sub(1) as f64;
    group as f64 - total_width / 2.0 + BAR_WIDTH / 2.0 + (BAR_WIDTH + BAR_GAP) * bar as f64
}

/// プロット CSV の 1 行
#[derive(Clone, Debug, PartialEq)]
pub struct PlotRow {
    pub key: CompositeKey,
    pub group: usize,
    pub x: f64,
    pub metric: Metric,
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

pub const PLOT_HEADER: [&str; 10] = [
    "test",
    "dataset_size",
    "num_categories",
    "num_parties",
    "group",
    "x",
    "metric",
    "mean",
    "std",
    "count",
];

/// 1 検定分の行を作る。存在しないバケットとサンプルのないメトリクスは出力しない。
pub fn plot_rows(index: &AggregationIndex, test_kind: TestKind) -> Vec<PlotRow> {
    let sizes = index.sorted_keys_for(test_kind, Dimension::DatasetSize);
    let categories = index.sorted_keys_for(test_kind, Dimension::Categories);
    let parties = index.sorted_keys_for(test_kind, Dimension::Parties);

    let mut rows = Vec::new();
    for (si, &size) in sizes.iter().enumerate() {
        for (ci, &cats) in categories.iter().enumerate() {
            let group = si * categories.len() + ci;
            for (pi, &n) in parties.iter().enumerate() {
                let key = CompositeKey::new(test_kind, size, n, cats);
                let Some(bucket) = index.get(&key) else {
                    continue;
                };
                let x = bar_position(group, pi, parties.len());
                for metric in bucket.metrics() {
                    let Ok(summary) = bucket.reduce(metric) else {
                        continue;
                    };
                    rows.push(PlotRow {
                        key,
                        group,
                        x,
                        metric,
                        mean: summary.mean,
                        std: summary.std,
                        count: summary.count,
                    });
                }
            }
        }
    }
    rows
}

pub fn write_plot_csv<W: Write>(writer: &mut W, rows: &[PlotRow]) -> io::Result<()> {
    write_csv_row(writer, &PLOT_HEADER)?;
    for row in rows {
        let fields = [
            row.key.test_kind.as_str().to_string(),
            row.key.dataset_size.to_string(),
            row.key.num_categories.to_string(),
            row.key.num_parties.to_string(),
            row.group.to_string(),
            format!("{:.4}", row.x),
            row.metric.as_str().to_string(),
            format!("{:.6}", row.mean),
            format!("{:.6}", row.std),
            row.count.to_string(),
        ];
        write_csv_row(writer, &fields)?;
    }
    Ok(())
}

fn write_csv_row<W: Write>(writer: &mut W, row: &[impl AsRef<str>]) -> io::Result<()> {
    for (idx, value) in row.iter().enumerate() {
        if idx > 0 {
            writer.write_all(b",")?;
        }
        write_csv_value(writer, value.as_ref())?;
    }
    writer.write_all(b"\n")
}

fn write_csv_value<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    let needs_quote = value.contains(',') || value.contains('"') || value.contains('\n');
    if !needs_quote {
        return writer.write_all(value.as_bytes());
    }
    writer.write_all(b"\"")?;
    writer.write_all(value.replace('"', "\"\"").as_bytes())?;
    writer.write_all(b"\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchstat_core::aggregate::ingest;
    use benchstat_core::{BenchmarkRecord, ReportedValue, TimeUnit, Timings, ValueKind};

    fn record(rows: u32, parties: u32, total: f64) -> BenchmarkRecord {
        BenchmarkRecord {
            test_kind: TestKind::TTest,
            use_shares: None,
            num_parties: parties,
            dataset_size: rows,
            num_categories: 0,
            time_unit: TimeUnit::Seconds,
            timings: Timings {
                total: Some(total),
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
    fn bars_are_centered_on_group() {
        // 1 本なら中心、2 本なら中心から (幅 + 間隔) / 2 ずつ離れる
        assert!((bar_position(3, 0, 1) - 3.0).abs() < 1e-12);
        let left = bar_position(0, 0, 2);
        let right = bar_position(0, 1, 2);
        assert!((left + 0.085).abs() < 1e-12);
        assert!((right - 0.085).abs() < 1e-12);
    }

    #[test]
    fn rows_follow_group_and_party_order() {
        let records = vec![record(5000, 8, 4.0), record(1000, 3, 1.0), record(1000, 8, 2.0)];
        let index = ingest(&records);
        let rows = plot_rows(&index, TestKind::TTest);
        let layout: Vec<(u32, u32, usize)> =
            rows.iter().map(|r| (r.key.dataset_size, r.key.num_parties, r.group)).collect();
        assert_eq!(layout, vec![(1000, 3, 0), (1000, 8, 0), (5000, 8, 1)]);
        assert!(rows[0].x < rows[1].x);
        assert!(plot_rows(&index, TestKind::Pearson).is_empty());

        let mut buf = Vec::new();
        write_plot_csv(&mut buf, &rows).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(PLOT_HEADER.join(",").as_str()));
        assert_eq!(
            lines.next(),
            Some("T-Test,1000,0,3,0,-0.0850,total_runtime,1.000000,0.000000,1")
        );
    }
}
