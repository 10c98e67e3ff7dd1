use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::io::{BufRead, Read, Write};
use std::path::Path;

/// The kind of suite a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// An operator conformance suite for one op source, e.g. `onnx` or `torch`.
    #[display("operator suite")]
    OperatorSuite,
    /// The shell script suite.
    #[display("script suite")]
    ScriptSuite,
    /// A full model compilation regression for one model.
    #[display("model regression")]
    ModelRegression,
}

/// Outcome of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[display("PASSED")]
    Passed,
    #[display("FAILED")]
    Failed,
}

/// The result of one finished job.
///
/// Created once, right after the job finishes, and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobResult {
    /// Unique name of the case within a run. Also the stem of the job's log file.
    pub case_name: String,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Failing sub-cases reported by the suite, if any.
    pub error_cases: Vec<String>,
}

impl JobResult {
    pub fn passed(case_name: impl Into<String>, kind: JobKind) -> Self {
        Self {
            case_name: case_name.into(),
            kind,
            status: JobStatus::Passed,
            error_cases: Vec::new(),
        }
    }

    pub fn failed(case_name: impl Into<String>, kind: JobKind, error_cases: Vec<String>) -> Self {
        Self {
            case_name: case_name.into(),
            kind,
            status: JobStatus::Failed,
            error_cases,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }
}

/// Wall clock time spent in one phase of a run, in whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[display("{label}: {seconds} seconds")]
pub struct TimingEntry {
    pub label: String,
    pub seconds: u64,
}

impl TimingEntry {
    pub fn new(label: impl Into<String>, seconds: u64) -> Self {
        Self {
            label: label.into(),
            seconds,
        }
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    #[display("PASSED")]
    Passed,
    #[display("FAILED")]
    Failed,
}

impl Verdict {
    /// [Verdict::Failed] if any result failed, otherwise [Verdict::Passed].
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a JobResult>) -> Self {
        if results.into_iter().any(JobResult::is_failed) {
            Verdict::Failed
        } else {
            Verdict::Passed
        }
    }

    /// The process exit status for this verdict.
    pub fn exit_code(self) -> u8 {
        match self {
            Verdict::Passed => 0,
            Verdict::Failed => 1,
        }
    }
}

/// Summary of a regression run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The test type the run was started with, `all` or `basic`
    pub test_type: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    pub verdict: Verdict,
    /// Set when the run was stopped by a shutdown signal before all phases were launched
    pub interrupted: bool,
    /// All job results in the order they were recorded
    pub results: Vec<JobResult>,
    /// Per-phase timing in the order the phases finished
    pub time_cost: Vec<TimingEntry>,
    /// The version of the orchestrator that produced this summary
    pub version: String,
}

impl RunSummary {
    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint identifies the shape of the run rather than its outcome. It uses the
    ///     - Test type
    ///     - Case names, sorted
    ///     - Orchestrator version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.test_type.as_bytes());
        self.results
            .iter()
            .map(|result| result.case_name.as_str())
            .sorted()
            .for_each(|case_name| {
                Digest::update(&mut hasher, case_name.as_bytes());
            });
        Digest::update(&mut hasher, self.version.as_bytes());

        format!("{:x}", hasher.finalize())
    }

    pub fn passed(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|result| !result.is_failed())
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|result| result.is_failed())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: &RunSummary, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: &RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_run_summaries(path: impl AsRef<Path>) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample_summary() -> RunSummary {
        RunSummary {
            run_id: "run-1".to_string(),
            test_type: "basic".to_string(),
            started_at: 1_700_000_000,
            verdict: Verdict::Failed,
            interrupted: false,
            results: vec![
                JobResult::passed("onnx_test_bm1684x", JobKind::OperatorSuite),
                JobResult::failed(
                    "resnet50_v2_bm1684x",
                    JobKind::ModelRegression,
                    vec!["int8_sym".to_string()],
                ),
            ],
            time_cost: vec![TimingEntry::new("run_onnx", 12)],
            version: "0.1.0".to_string(),
        }
    }

    #[test]
    fn verdict_fails_on_any_failure() {
        let results = vec![
            JobResult::passed("a", JobKind::ModelRegression),
            JobResult::failed("b", JobKind::ModelRegression, vec![]),
        ];
        assert_eq!(Verdict::Failed, Verdict::from_results(&results));
        assert_eq!(Verdict::Passed, Verdict::from_results(&results[..1]));
        assert_eq!(Verdict::Passed, Verdict::from_results(&[]));
    }

    #[test]
    fn verdict_exit_codes() {
        assert_eq!(0, Verdict::Passed.exit_code());
        assert_eq!(1, Verdict::Failed.exit_code());
    }

    #[test]
    fn timing_entry_display() {
        assert_eq!(
            "run models for bm1686: 42 seconds",
            TimingEntry::new("run models for bm1686", 42).to_string()
        );
    }

    #[test]
    fn status_serializes_upper_case() {
        let json = serde_json::to_string(&JobResult::passed("a", JobKind::ScriptSuite)).unwrap();
        assert!(json.contains("\"status\":\"PASSED\""));
        assert!(json.contains("\"kind\":\"script_suite\""));
    }

    #[test]
    fn fingerprint_ignores_result_order_and_outcome() {
        let summary = sample_summary();

        let mut reordered = summary.clone();
        reordered.results.reverse();
        reordered.results[0].status = JobStatus::Passed;
        reordered.run_id = "run-2".to_string();

        assert_eq!(summary.fingerprint(), reordered.fingerprint());

        let mut other_type = summary.clone();
        other_type.test_type = "all".to_string();
        assert_ne!(summary.fingerprint(), other_type.fingerprint());
    }

    #[test]
    fn append_then_load_summaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regression_summary.jsonl");

        let first = sample_summary();
        let mut second = sample_summary();
        second.run_id = "run-2".to_string();
        second.verdict = Verdict::Passed;

        append_run_summary(&first, &path).unwrap();
        append_run_summary(&second, &path).unwrap();

        let loaded = load_run_summaries(&path).unwrap();
        assert_eq!(vec![first, second], loaded);
    }

    #[test]
    fn load_single_appended_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regression_summary.jsonl");
        append_run_summary(&sample_summary(), &path).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        assert_eq!(sample_summary(), load_run_summary(file).unwrap());

        let truncated = std::fs::read(&path).unwrap();
        assert!(load_run_summary(&truncated[..truncated.len() / 2]).is_err());
    }

    #[test]
    fn passed_and_failed_partition_results() {
        let summary = sample_summary();
        let passed = summary.passed().map(|r| r.case_name.as_str()).collect::<Vec<_>>();
        let failed = summary.failed().map(|r| r.case_name.as_str()).collect::<Vec<_>>();
        assert_eq!(vec!["onnx_test_bm1684x"], passed);
        assert_eq!(vec!["resnet50_v2_bm1684x"], failed);
    }
}
