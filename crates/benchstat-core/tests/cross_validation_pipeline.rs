use std::fs;

use benchstat_core::schema::{parse_json, parse_jsonl};
use benchstat_core::stats::pearson;
use benchstat_core::{
    CrossValidator, Metric, NormalizeOptions, RecordFilter, ReferenceAlias, ReferenceRegistry,
    TestKind,
};

const PAIRED: &str = "1,2\n2,1\n3,4\n4,3\n5,5\n";

fn write_references(dir: &std::path::Path) {
    fs::write(dir.join("benchmark_5.csv"), PAIRED).unwrap();
    fs::write(dir.join("benchmark_chisq_6_3.csv"), "1,0,0\n0,1,0\n0,0,1\n1,0,0\n0,1,0\n0,0,1\n")
        .unwrap();
    fs::write(dir.join("bridges.csv"), "1,0\n0,1\n1,0\n0,1\n").unwrap();
    fs::write(dir.join("notes.txt"), "not a dataset").unwrap();
}

#[test]
fn registry_loads_conventions_and_aliases() {
    let tmp = tempfile::tempdir().unwrap();
    write_references(tmp.path());
    let aliases = vec![ReferenceAlias {
        dataset_size: 4,
        num_categories: 2,
        file: "bridges.csv".into(),
    }];
    let registry = ReferenceRegistry::load_dir(tmp.path(), &aliases).unwrap();
    assert_eq!(registry.len(), 3);
    assert_eq!(registry.get(5, 0).unwrap().rows(), 5);
    assert_eq!(registry.get(6, 3).unwrap().column_sums(), Some(vec![2.0, 2.0, 2.0]));
    assert_eq!(registry.get(4, 2).unwrap().rows(), 4);
    assert!(registry.get(7, 0).is_err());
}

#[test]
fn missing_reference_skips_only_that_record() {
    let tmp = tempfile::tempdir().unwrap();
    write_references(tmp.path());
    let registry = ReferenceRegistry::load_dir(tmp.path(), &[]).unwrap();

    let a = [1.0, 2.0, 3.0, 4.0, 5.0];
    let b = [2.0, 1.0, 4.0, 3.0, 5.0];
    let r = pearson(&a, &b).unwrap().statistic;
    let results = format!(
        r#"[
        {{"Test": "Pearson", "Value": "{r}", "TotalRuntime": 4.0, "SetupTime": 1.0,
          "NumParties": 3, "NumRows": 999, "NumCols": 2, "RunId": 0}},
        {{"Test": "Pearson", "Value": "{r}", "TotalRuntime": 6.0, "SetupTime": 1.0,
          "NumParties": 3, "NumRows": 5, "NumCols": 2, "RunId": 0}},
        {{"Test": "Chi-Squared", "Value": 0, "TotalRuntime": 2.0, "AuditRuntime": 0.5,
          "NumParties": 5, "NumRows": 6, "NumCols": 3, "RunId": 0}},
        {{"Test": "T-Test", "Value": 0, "TotalRuntime": 1.0,
          "NumParties": 3, "NumRows": 5, "NumCols": 2, "RunId": 1}}
    ]"#
    );
    let records = parse_json(&results, "results.json", &NormalizeOptions::default()).unwrap();
    assert_eq!(records.len(), 4);

    let filter = RecordFilter {
        run_id: Some(0),
        ..RecordFilter::default()
    };
    let selected: Vec<_> = filter.apply(&records).collect();
    assert_eq!(selected.len(), 3);

    let report = CrossValidator::new(&registry).with_tolerance(1e-9).run(&selected);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].index, 0);
    assert_eq!(report.validated.len(), 2);
    assert_eq!(report.tolerance_violations(), 0);

    let pearson_err = report.errors.summary(TestKind::Pearson).unwrap();
    assert!(pearson_err.mean < 1e-9);
    let chi_err = report.errors.summary(TestKind::ChiSquared).unwrap();
    assert_eq!(chi_err.mean, 0.0);

    let total = report.runtime_summary(Metric::TotalRuntime).unwrap();
    assert_eq!(total.count, 2);
    assert_eq!(total.mean, 4.0);
    assert_eq!(report.runtime_summary(Metric::AuditRuntime).unwrap().mean, 0.5);
}

#[test]
fn legacy_p_values_are_compared_directly() {
    let tmp = tempfile::tempdir().unwrap();
    write_references(tmp.path());
    let registry = ReferenceRegistry::load_dir(tmp.path(), &[]).unwrap();

    let lines = "\
{\"TestType\": \"CHI2\", \"UseShares\": true, \"DatasetSize\": 6, \"NumberOfParties\": 3, \"NumberOfCategories\": 3, \"PValue\": 1.0, \"ComputationTime\": 100, \"DivisionTime\": 10, \"ComparisonTime\": 0, \"TotalTime\": 120, \"TimeUnit\": \"ms\"}
{\"TestType\": \"CHI2\", \"UseShares\": true, \"DatasetSize\": 6, \"NumberOfParties\": 3, \"NumberOfCategories\": 3, \"PValue\": 0.5, \"ComputationTime\": 100, \"DivisionTime\": 10, \"ComparisonTime\": 0, \"TotalTime\": 120, \"TimeUnit\": \"ms\"}
";
    let records = parse_jsonl(lines, "legacy.jsonl", &NormalizeOptions::default()).unwrap();
    let report = CrossValidator::new(&registry).with_tolerance(0.1).run_parallel(&records);
    assert_eq!(report.validated.len(), 2);
    assert_eq!(report.errors.errors(TestKind::ChiSquared), &[0.0, 0.5]);
    assert_eq!(report.tolerance_violations(), 1);
    assert_eq!(report.runtime_summary(Metric::TotalRuntime).unwrap().mean, 0.12);
}
