//! ベンチマークハーネスの標準出力ログをレポート世代のレコードに変換する
//!
//! ログは検定ごとに `Running <Test>...` の見出しと、`****` 行で挟まれた結果ブロック
//! からなる。ブロック内の `ラベル: 値` 行を拾い、同じ構成（検定・行数・パーティ数・
//! カテゴリ数）が繰り返し現れた場合は `run_id` を 0 から順に振る。

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AnalysisError, AnalysisResult};
use crate::record::{BenchmarkRecord, ReportedValue, TestKind, TimeUnit, Timings, ValueKind};

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Running (T-Test|Pearson's Coorelation Test|Chi\^2 Test)\.\.\.$")
        .expect("invalid SECTION_RE pattern")
});
static DELIMITER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*{4,}$").expect("invalid DELIMITER_RE pattern"));

fn section_kind(title: &str) -> Option<TestKind> {
    match title {
        "T-Test" => Some(TestKind::TTest),
        "Pearson's Coorelation Test" => Some(TestKind::Pearson),
        "Chi^2 Test" => Some(TestKind::ChiSquared),
        _ => None,
    }
}

fn statistic_kind(label: &str) -> Option<TestKind> {
    match label {
        "T-Test statistic" => Some(TestKind::TTest),
        "Pearson's statistic" => Some(TestKind::Pearson),
        "Chi^2 statistic" => Some(TestKind::ChiSquared),
        _ => None,
    }
}

/// 1 ブロック分の読み取り途中の値
#[derive(Default)]
struct Block {
    start_line: usize,
    test_kind: Option<TestKind>,
    statistic: Option<f64>,
    dataset_size: Option<u32>,
    num_categories: Option<u32>,
    num_parties: Option<u32>,
    timings: Timings,
}

impl Block {
    fn new(start_line: usize, section: Option<TestKind>) -> Self {
        Self {
            start_line,
            test_kind: section,
            ..Self::default()
        }
    }

    fn set(&mut self, label: &str, value: &str, at: &str) -> AnalysisResult<()> {
        let value = value.trim();
        if let Some(kind) = statistic_kind(label) {
            self.test_kind = Some(kind);
            self.statistic = Some(parse_f64(value, at)?);
            return Ok(());
        }
        match label {
            "Dataset size" => self.dataset_size = Some(parse_u32(value, at)?),
            "Number of categories" => self.num_categories = Some(parse_u32(value, at)?),
            "Number of parties" => self.num_parties = Some(parse_u32(value, at)?),
            "Dealer setup time (s)" => self.timings.setup = Some(parse_f64(value, at)?),
            "T-Test runtime (s)" | "Pearson's Test runtime (s)" | "Chi^2 Test runtime (s)" => {
                self.timings.total = Some(parse_f64(value, at)?)
            }
            "---Computation runtime (s)" => self.timings.computation = Some(parse_f64(value, at)?),
            "---Sign Bit runtime (s)" => self.timings.comparison = Some(parse_f64(value, at)?),
            "---Division runtime (s)" => self.timings.division = Some(parse_f64(value, at)?),
            // Threshold / Total number of shares / Network latency は使わない
            _ => {}
        }
        Ok(())
    }

    fn finish(self, source: &str) -> AnalysisResult<BenchmarkRecord> {
        let at = format!("{source}:{}", self.start_line);
        let missing = |what: &str| AnalysisError::InvalidValue {
            source_name: at.clone(),
            reason: format!("result block has no {what}"),
        };
        let test_kind = self.test_kind.ok_or_else(|| missing("test statistic"))?;
        let statistic = self.statistic.ok_or_else(|| missing("test statistic"))?;
        let dataset_size = self.dataset_size.ok_or_else(|| missing("dataset size"))?;
        let num_parties = self.num_parties.ok_or_else(|| missing("number of parties"))?;
        let num_categories = if test_kind.uses_categories() {
            self.num_categories.ok_or_else(|| missing("number of categories"))?
        } else {
            0
        };
        Ok(BenchmarkRecord {
            test_kind,
            use_shares: None,
            num_parties,
            dataset_size,
            num_categories,
            time_unit: TimeUnit::Seconds,
            timings: self.timings,
            reported: ReportedValue {
                kind: ValueKind::Statistic,
                value: statistic,
            },
            run_id: 0,
        })
    }
}

fn parse_f64(value: &str, at: &str) -> AnalysisResult<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AnalysisError::InvalidValue {
            source_name: at.to_string(),
            reason: format!("expected a number, got {value:?}"),
        })
}

fn parse_u32(value: &str, at: &str) -> AnalysisResult<u32> {
    value.parse::<u32>().map_err(|e| AnalysisError::InvalidValue {
        source_name: at.to_string(),
        reason: format!("{value:?}: {e}"),
    })
}

/// ログ全体を解析する。閉じていない末尾ブロックは警告して捨てる。
pub fn parse_run_log(text: &str, source: &str) -> AnalysisResult<Vec<BenchmarkRecord>> {
    let mut section: Option<TestKind> = None;
    let mut block: Option<Block> = None;
    let mut records = Vec::new();
    let mut next_run_id = HashMap::new();

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();

        if let Some(caps) = SECTION_RE.captures(line) {
            section = caps.get(1).and_then(|m| section_kind(m.as_str()));
            continue;
        }

        if DELIMITER_RE.is_match(line) {
            match block.take() {
                Some(open) => {
                    let mut record = open.finish(source)?;
                    let counter = next_run_id.entry(record.key()).or_insert(0u32);
                    record.run_id = *counter;
                    *counter += 1;
                    records.push(record);
                }
                None => block = Some(Block::new(line_no, section)),
            }
            continue;
        }

        if let Some(open) = block.as_mut() {
            if let Some((label, value)) = line.split_once(':') {
                open.set(label.trim(), value, &format!("{source}:{line_no}"))?;
            }
        }
    }

    if let Some(open) = block {
        log::warn!("{source}:{}: result block is not terminated, dropped", open.start_line);
    }
    log::debug!("{source}: parsed {} result blocks", records.len());
    Ok(records)
}
