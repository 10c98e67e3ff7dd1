use std::path::Path;

use chip_regression_summary_model::{JobKind, JobResult, RunSummary};
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// How much of a failed case's log is shown before the summary.
pub const LOG_TAIL_LINES: usize = 100;

#[derive(Tabled)]
struct TimingRow {
    phase: String,
    seconds: u64,
}

#[derive(Tabled)]
struct CaseRow {
    case: String,
    status: String,
}

#[derive(Tabled)]
struct FailedCaseRow {
    case: String,
    status: String,
    failed_cases: String,
}

/// Render the end of run report.
///
/// Failed cases other than operator suites first get the tail of their case log, operator suites
/// name their failing cases in the table instead. The last line is the verdict.
pub fn render_report(summary: &RunSummary, out_dir: &Path) -> String {
    let mut sections = Vec::new();

    for result in summary
        .failed()
        .filter(|r| r.kind != JobKind::OperatorSuite)
    {
        let log_path = out_dir.join(format!("{}.log", result.case_name));
        match log_tail(&log_path, LOG_TAIL_LINES) {
            Ok(tail) => sections.push(tail),
            Err(e) => sections.push(format!(
                "Could not read log for {} at {}: {e}",
                result.case_name,
                log_path.display()
            )),
        }
    }

    sections.push("============ Time Consumed ============".to_string());
    sections.push(table(summary.time_cost.iter().map(|t| TimingRow {
        phase: t.label.clone(),
        seconds: t.seconds,
    })));

    sections.push("============ Passed Cases ============".to_string());
    sections.push(table(summary.passed().map(|r| CaseRow {
        case: r.case_name.clone(),
        status: r.status.to_string(),
    })));

    sections.push("============ Failed Cases ============".to_string());
    sections.push(table(summary.failed().map(failed_row)));

    if summary.interrupted {
        sections.push("Run was interrupted before all phases completed".to_string());
    }
    sections.push(format!("TEST {} {}", summary.test_type, summary.verdict));

    sections.join("\n")
}

fn failed_row(result: &JobResult) -> FailedCaseRow {
    FailedCaseRow {
        case: result.case_name.clone(),
        status: result.status.to_string(),
        failed_cases: result.error_cases.join(", "),
    }
}

fn table<T: Tabled>(rows: impl IntoIterator<Item = T>) -> String {
    let mut table = Table::new(rows);
    table.with(Style::modern());
    table.to_string()
}

/// The last `lines` lines of a file. Bytes that are not UTF-8 are replaced.
pub fn log_tail(path: &Path, lines: usize) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes);
    let all = content.lines().collect::<Vec<_>>();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].join("\n"))
}
