use fq_conformance::{
    CaseStatus, FixtureError, HarnessConfig, HarnessReport, run_case_by_id, run_smoke, run_suite,
    write_report,
};
use fq_runtime::RuntimeMode;

#[test]
fn smoke_report_is_stable() {
    let cfg = HarnessConfig::default_paths();
    let report = run_smoke(&cfg);
    assert_eq!(
        report,
        HarnessReport {
            suite: "smoke",
            fixture_count: report.fixture_count,
        }
    );
    assert!(report.fixture_count >= 1);
    assert!(cfg.case_fixture_root().join("merge_widens_equality_to_in.json").exists());
}

#[test]
fn every_fixture_case_passes() {
    let cfg = HarnessConfig::default_paths();
    let report = run_suite(&cfg).expect("fixture suite should run");
    let failures: Vec<_> = report
        .results
        .iter()
        .filter(|result| result.status == CaseStatus::Fail)
        .map(|result| format!("{}: {}", result.case_id, result.mismatch.as_deref().unwrap_or("")))
        .collect();
    assert!(failures.is_empty(), "failing cases: {failures:#?}");
    assert!(report.is_green());
}

#[test]
fn each_case_runs_under_its_own_mode() {
    let cfg = HarnessConfig::default_paths();
    let strict = run_case_by_id(&cfg, "extract_negation_and_exists").expect("case exists");
    assert_eq!(strict.results[0].mode, RuntimeMode::Strict);
    let hardened = run_case_by_id(&cfg, "extract_functions").expect("case exists");
    assert_eq!(hardened.results[0].mode, RuntimeMode::Hardened);
}

#[test]
fn single_case_and_unknown_case() {
    let cfg = HarnessConfig::default_paths();
    let report = run_case_by_id(&cfg, "resolve_bracket_list_index").expect("case exists");
    assert_eq!(report.fixture_count, 1);
    assert_eq!(report.suite, "cases:resolve_bracket_list_index");

    let err = run_case_by_id(&cfg, "no_such_case").expect_err("unknown id");
    assert!(matches!(err, FixtureError::UnknownCase(id) if id == "no_such_case"));
}

#[test]
fn report_round_trips_through_disk() {
    let cfg = HarnessConfig::default_paths();
    let report = run_case_by_id(&cfg, "merge_appends_unmatched").expect("case exists");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("reports/merge.json");
    write_report(&path, &report).expect("write report");
    let body = std::fs::read_to_string(&path).expect("read report");
    let back: fq_conformance::SuiteReport = serde_json::from_str(&body).expect("parse report");
    assert_eq!(back, report);
}

#[test]
fn empty_fixture_root_is_not_green() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = HarnessConfig::default_paths().with_fixture_root(dir.path());
    let report = run_suite(&cfg).expect("empty suite runs");
    assert_eq!(report.fixture_count, 0);
    assert!(!report.is_green());
    assert_eq!(run_smoke(&cfg).fixture_count, 0);
}
