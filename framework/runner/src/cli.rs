use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;

use crate::job::TestMode;

#[derive(Debug, Parser)]
#[command(about, long_about = None)]
pub struct RegressionCli {
    /// Which cases to run. `basic` runs the reduced operator cases and the basic models and stops
    /// at the first failing phase, `all` runs everything.
    #[clap(long = "test_type", value_enum, ignore_case = true, default_value = "all")]
    pub test_type: TestMode,

    /// Run model regressions one at a time instead of in parallel batches.
    #[clap(long = "disable_thread", default_value = "false")]
    pub disable_thread: bool,

    /// Maximum number of model regressions to run at once.
    ///
    /// Defaults to half the logical CPUs, rounded up, plus one. Ignored with `--disable_thread`.
    #[clap(long)]
    pub jobs: Option<NonZeroUsize>,

    /// Root of the regression tree. Output goes to `regression_out` inside it.
    #[clap(long = "regression_path", env = "REGRESSION_PATH")]
    pub regression_path: PathBuf,

    /// The regression matrix to run.
    ///
    /// Defaults to `regression.toml` in the regression path, or the bundled matrix if that does
    /// not exist.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Do not show progress bars.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long = "no_progress", default_value = "false")]
    pub no_progress: bool,

    /// Where to append the JSON summary of this run.
    ///
    /// Defaults to `regression_summary.jsonl` in the output directory.
    #[clap(long = "summary_file")]
    pub summary_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(args: &[&str]) -> RegressionCli {
        RegressionCli::try_parse_from(
            ["regression", "--regression_path", "/work/regression"]
                .iter()
                .chain(args),
        )
        .unwrap()
    }

    #[test]
    fn defaults() {
        let cli = parse(&[]);
        assert_eq!(TestMode::Full, cli.test_type);
        assert!(!cli.disable_thread);
        assert_eq!(None, cli.jobs);
        assert_eq!(PathBuf::from("/work/regression"), cli.regression_path);
    }

    #[test]
    fn test_type_ignores_case() {
        assert_eq!(TestMode::Basic, parse(&["--test_type", "BASIC"]).test_type);
        assert_eq!(TestMode::Full, parse(&["--test_type", "All"]).test_type);
    }

    #[test]
    fn unknown_test_type_is_rejected() {
        assert!(RegressionCli::try_parse_from([
            "regression",
            "--regression_path",
            "/work",
            "--test_type",
            "nightly"
        ])
        .is_err());
    }

    #[test]
    fn zero_jobs_is_rejected() {
        assert!(RegressionCli::try_parse_from([
            "regression",
            "--regression_path",
            "/work",
            "--jobs",
            "0"
        ])
        .is_err());
    }

    #[test]
    fn thread_and_output_flags() {
        let cli = parse(&[
            "--disable_thread",
            "--jobs",
            "4",
            "--no_progress",
            "--summary_file",
            "/tmp/summary.jsonl",
        ]);
        assert!(cli.disable_thread);
        assert_eq!(NonZeroUsize::new(4), cli.jobs);
        assert!(cli.no_progress);
        assert_eq!(Some(PathBuf::from("/tmp/summary.jsonl")), cli.summary_file);
    }
}
