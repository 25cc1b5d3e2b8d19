#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use fq_context::{Role, resolve_context_with_policy};
use fq_format::{
    convert_expression_to_filters_with_policy, convert_filters_to_expression, format_value,
};
use fq_merge::{merge_with_cache, remove_keys_from_expression_with_policy};
use fq_pairs::{PairCache, extract_with_policy};
use fq_runtime::{DiagnosticLedger, EnginePolicy, RuntimeMode};
use fq_types::{FilterItem, FilterTree, FilterValue, QueryPair};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            fixture_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
        }
    }

    #[must_use]
    pub fn with_fixture_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.fixture_root = root.into();
        self
    }

    #[must_use]
    pub fn case_fixture_root(&self) -> PathBuf {
        self.fixture_root.join("cases")
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

/// Fixture inventory. Each case picks its own runtime mode through its
/// `mode` field, so the report carries no mode of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessReport {
    pub suite: &'static str,
    pub fixture_count: usize,
}

#[must_use]
pub fn run_smoke(config: &HarnessConfig) -> HarnessReport {
    let fixture_count = list_fixture_files(&config.case_fixture_root())
        .map(|files| files.len())
        .unwrap_or_default();

    HarnessReport {
        suite: "smoke",
        fixture_count,
    }
}

#[derive(Debug, Clone, Default)]
pub struct SuiteOptions {
    pub case_filter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureOperation {
    ExtractPairs,
    ResolveContext,
    FormatValue,
    ConvertToExpression,
    ConvertToFilters,
    Merge,
    RemoveKeys,
}

impl FixtureOperation {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ExtractPairs => "extract_pairs",
            Self::ResolveContext => "resolve_context",
            Self::FormatValue => "format_value",
            Self::ConvertToExpression => "convert_to_expression",
            Self::ConvertToFilters => "convert_to_filters",
            Self::Merge => "merge",
            Self::RemoveKeys => "remove_keys",
        }
    }
}

/// The parts of an extracted pair a fixture pins down; spans are covered by
/// unit tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedPair {
    pub key: String,
    pub operator: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub has_negation: bool,
    pub is_complete: bool,
}

impl From<&QueryPair> for ExpectedPair {
    fn from(pair: &QueryPair) -> Self {
        Self {
            key: pair.key.clone(),
            operator: pair.operator.clone(),
            value: pair.value.clone(),
            has_negation: pair.has_negation,
            is_complete: pair.is_complete,
        }
    }
}

/// A structured item without its generated id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedItem {
    pub key: String,
    pub op: String,
    #[serde(default)]
    pub value: FilterValue,
}

impl From<&FilterItem> for ExpectedItem {
    fn from(item: &FilterItem) -> Self {
        Self {
            key: item.key_name().unwrap_or_default().to_owned(),
            op: item.op.clone(),
            value: item.value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConformanceFixture {
    pub case_id: String,
    pub mode: RuntimeMode,
    pub operation: FixtureOperation,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub cursor: Option<usize>,
    #[serde(default)]
    pub value: Option<FilterValue>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub filters: Option<FilterTree>,
    #[serde(default)]
    pub keys: Option<Vec<String>>,
    #[serde(default)]
    pub only_variables: bool,
    #[serde(default)]
    pub expected_text: Option<String>,
    #[serde(default)]
    pub expected_pairs: Option<Vec<ExpectedPair>>,
    #[serde(default)]
    pub expected_role: Option<Role>,
    #[serde(default)]
    pub expected_value_index: Option<usize>,
    #[serde(default)]
    pub expected_items: Option<Vec<ExpectedItem>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: String,
    pub mode: RuntimeMode,
    pub operation: FixtureOperation,
    pub status: CaseStatus,
    pub mismatch: Option<String>,
    pub diagnostic_records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite: String,
    pub fixture_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<CaseResult>,
}

impl SuiteReport {
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.failed == 0 && self.fixture_count > 0
    }
}

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("fixture format error: {0}")]
    FixtureFormat(String),
    #[error("no fixture case with id {0:?}")]
    UnknownCase(String),
}

pub fn run_suite(config: &HarnessConfig) -> Result<SuiteReport, FixtureError> {
    run_suite_with_options(config, &SuiteOptions::default())
}

pub fn run_suite_with_options(
    config: &HarnessConfig,
    options: &SuiteOptions,
) -> Result<SuiteReport, FixtureError> {
    let fixtures = load_fixtures(config, options.case_filter.as_deref())?;
    let suite = match &options.case_filter {
        Some(case_id) => format!("cases:{case_id}"),
        None => "cases".to_owned(),
    };
    build_report(suite, &fixtures)
}

pub fn run_case_by_id(config: &HarnessConfig, case_id: &str) -> Result<SuiteReport, FixtureError> {
    let options = SuiteOptions {
        case_filter: Some(case_id.to_owned()),
    };
    let report = run_suite_with_options(config, &options)?;
    if report.fixture_count == 0 {
        return Err(FixtureError::UnknownCase(case_id.to_owned()));
    }
    Ok(report)
}

pub fn write_report(path: &Path, report: &SuiteReport) -> Result<(), FixtureError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(report)?)?;
    Ok(())
}

fn build_report(suite: String, fixtures: &[ConformanceFixture]) -> Result<SuiteReport, FixtureError> {
    let mut results = Vec::with_capacity(fixtures.len());
    for fixture in fixtures {
        results.push(run_fixture(fixture)?);
    }

    let failed = results
        .iter()
        .filter(|result| matches!(result.status, CaseStatus::Fail))
        .count();
    let passed = results.len().saturating_sub(failed);

    Ok(SuiteReport {
        suite,
        fixture_count: results.len(),
        passed,
        failed,
        results,
    })
}

fn load_fixtures(
    config: &HarnessConfig,
    case_filter: Option<&str>,
) -> Result<Vec<ConformanceFixture>, FixtureError> {
    let fixture_files = list_fixture_files(&config.case_fixture_root())?;
    let mut fixtures = Vec::with_capacity(fixture_files.len());

    for fixture_path in fixture_files {
        let fixture = load_fixture(&fixture_path)?;
        if case_filter.is_none_or(|case_id| fixture.case_id == case_id) {
            fixtures.push(fixture);
        }
    }
    fixtures.sort_by(|a, b| a.case_id.cmp(&b.case_id));
    Ok(fixtures)
}

fn load_fixture(path: &Path) -> Result<ConformanceFixture, FixtureError> {
    let body = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&body)?)
}

fn list_fixture_files(root: &Path) -> Result<Vec<PathBuf>, FixtureError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(current)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn policy_for(mode: RuntimeMode) -> EnginePolicy {
    match mode {
        RuntimeMode::Strict => EnginePolicy::strict(),
        RuntimeMode::Hardened => EnginePolicy::hardened(),
    }
}

fn require<'a, T>(
    field: Option<&'a T>,
    fixture: &ConformanceFixture,
    name: &str,
) -> Result<&'a T, FixtureError> {
    field.ok_or_else(|| {
        FixtureError::FixtureFormat(format!(
            "case {} ({}) is missing `{name}`",
            fixture.case_id,
            fixture.operation.name()
        ))
    })
}

fn run_fixture(fixture: &ConformanceFixture) -> Result<CaseResult, FixtureError> {
    let policy = policy_for(fixture.mode);
    let mut ledger = DiagnosticLedger::new();
    let outcome = run_fixture_operation(fixture, &policy, &mut ledger)?;

    let (status, mismatch) = match outcome {
        Ok(()) => (CaseStatus::Pass, None),
        Err(mismatch) => (CaseStatus::Fail, Some(mismatch)),
    };
    Ok(CaseResult {
        case_id: fixture.case_id.clone(),
        mode: fixture.mode,
        operation: fixture.operation,
        status,
        mismatch,
        diagnostic_records: ledger.len(),
    })
}

/// Outer error: the fixture itself is malformed. Inner error: the engine
/// disagreed with the fixture.
fn run_fixture_operation(
    fixture: &ConformanceFixture,
    policy: &EnginePolicy,
    ledger: &mut DiagnosticLedger,
) -> Result<Result<(), String>, FixtureError> {
    match fixture.operation {
        FixtureOperation::ExtractPairs => {
            let query = require(fixture.query.as_ref(), fixture, "query")?;
            let expected = require(fixture.expected_pairs.as_ref(), fixture, "expected_pairs")?;
            let pairs = extract_with_policy(query, policy, ledger);
            Ok(compare_pairs(expected, &pairs))
        }
        FixtureOperation::ResolveContext => {
            let query = require(fixture.query.as_ref(), fixture, "query")?;
            let cursor = *require(fixture.cursor.as_ref(), fixture, "cursor")?;
            let expected_role = *require(fixture.expected_role.as_ref(), fixture, "expected_role")?;
            let context = resolve_context_with_policy(query, cursor, policy, ledger);
            Ok(compare_eq("role", &expected_role, &context.role)
                .and_then(|()| match fixture.expected_value_index {
                    Some(index) => compare_eq("value_index", &Some(index), &context.value_index),
                    None => Ok(()),
                })
                .and_then(|()| match &fixture.expected_pairs {
                    Some(expected) => compare_pairs(expected, &context.query_pairs),
                    None => Ok(()),
                }))
        }
        FixtureOperation::FormatValue => {
            let value = require(fixture.value.as_ref(), fixture, "value")?;
            let expected = require(fixture.expected_text.as_ref(), fixture, "expected_text")?;
            let operator = fixture.operator.as_deref().unwrap_or_default();
            Ok(compare_eq("text", expected, &format_value(value, operator)))
        }
        FixtureOperation::ConvertToExpression => {
            let filters = require(fixture.filters.as_ref(), fixture, "filters")?;
            let expected = require(fixture.expected_text.as_ref(), fixture, "expected_text")?;
            let expression = convert_filters_to_expression(filters);
            Ok(compare_eq("text", expected, &expression.expression))
        }
        FixtureOperation::ConvertToFilters => {
            let query = require(fixture.query.as_ref(), fixture, "query")?;
            let expected = require(fixture.expected_items.as_ref(), fixture, "expected_items")?;
            let items = convert_expression_to_filters_with_policy(query, policy, ledger);
            Ok(compare_items(expected, &items))
        }
        FixtureOperation::Merge => {
            let filters = require(fixture.filters.as_ref(), fixture, "filters")?;
            let expected = require(fixture.expected_text.as_ref(), fixture, "expected_text")?;
            let cache = PairCache::from_policy(policy);
            let result = merge_with_cache(filters, fixture.query.as_deref(), &cache, policy, ledger);
            Ok(compare_eq("text", expected, &result.filter.expression).and_then(|()| {
                match &fixture.expected_items {
                    Some(items) => compare_items(items, &result.filters.items),
                    None => Ok(()),
                }
            }))
        }
        FixtureOperation::RemoveKeys => {
            let query = require(fixture.query.as_ref(), fixture, "query")?;
            let keys = require(fixture.keys.as_ref(), fixture, "keys")?;
            let expected = require(fixture.expected_text.as_ref(), fixture, "expected_text")?;
            let text = remove_keys_from_expression_with_policy(
                query,
                keys,
                fixture.only_variables,
                policy,
                ledger,
            );
            Ok(compare_eq("text", expected, &text))
        }
    }
}

fn compare_eq<T: PartialEq + std::fmt::Debug + ?Sized>(
    what: &str,
    expected: &T,
    actual: &T,
) -> Result<(), String> {
    if expected == actual {
        Ok(())
    } else {
        Err(format!("{what} mismatch: expected={expected:?}, actual={actual:?}"))
    }
}

fn compare_pairs(expected: &[ExpectedPair], actual: &[QueryPair]) -> Result<(), String> {
    let actual: Vec<ExpectedPair> = actual.iter().map(ExpectedPair::from).collect();
    compare_eq("pairs", expected, actual.as_slice())
}

fn compare_items(expected: &[ExpectedItem], actual: &[FilterItem]) -> Result<(), String> {
    let actual: Vec<ExpectedItem> = actual.iter().map(ExpectedItem::from).collect();
    compare_eq("items", expected, actual.as_slice())
}
