#![forbid(unsafe_code)]

use std::path::PathBuf;

use fq_conformance::{
    HarnessConfig, SuiteOptions, run_case_by_id, run_suite_with_options, write_report,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut case_filter: Option<String> = None;
    let mut fixture_root: Option<PathBuf> = None;
    let mut report_path: Option<PathBuf> = None;
    let mut emit_json = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--case" => {
                let value = args
                    .next()
                    .ok_or("--case requires a value (e.g. merge_widens_equality_to_in)")?;
                case_filter = Some(value);
            }
            "--fixtures" => {
                let value = args.next().ok_or("--fixtures requires a directory")?;
                fixture_root = Some(PathBuf::from(value));
            }
            "--report" => {
                let value = args.next().ok_or("--report requires a file path")?;
                report_path = Some(PathBuf::from(value));
            }
            "--json" => {
                emit_json = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}").into());
            }
        }
    }

    let mut config = HarnessConfig::default_paths();
    if let Some(root) = fixture_root {
        config = config.with_fixture_root(root);
    }

    let report = match case_filter.as_deref() {
        Some(case_id) => run_case_by_id(&config, case_id)?,
        None => run_suite_with_options(&config, &SuiteOptions::default())?,
    };

    if emit_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for result in &report.results {
            println!(
                "case={} operation={} mode={:?} status={:?}{}",
                result.case_id,
                result.operation.name(),
                result.mode,
                result.status,
                result
                    .mismatch
                    .as_deref()
                    .map(|mismatch| format!(" mismatch={mismatch}"))
                    .unwrap_or_default()
            );
        }
        println!(
            "suite={} fixtures={} passed={} failed={} green={}",
            report.suite,
            report.fixture_count,
            report.passed,
            report.failed,
            report.is_green()
        );
    }

    if let Some(path) = report_path {
        write_report(&path, &report)?;
        println!("wrote report={}", path.display());
    }

    if !report.is_green() {
        return Err(format!("{} of {} cases failed", report.failed, report.fixture_count).into());
    }
    Ok(())
}

fn print_help() {
    println!(
        "fq-conformance-cli\n\
         Usage:\n\
         \tfq-conformance-cli [--case <id>] [--fixtures <dir>] [--json] [--report <file>]\n\
         Options:\n\
         \t--case <id>        Run only one fixture case\n\
         \t--fixtures <dir>   Fixture root containing cases/ (default: crate fixtures)\n\
         \t--json             Print the suite report as JSON\n\
         \t--report <file>    Also write the JSON report to a file\n\
         \t-h, --help         Show this help"
    );
}
