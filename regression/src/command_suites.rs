use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

use anyhow::{bail, Context};
use chip_regression_runner::prelude::{
    JobContext, ModelDriverConfig, ModelOptions, ModelRegressor, OpSourceConfig, OperatorTester,
    RegressionConfig, RegressionResult, SuiteProvider,
};

use crate::template::TemplateVars;

/// Exposed to every suite process.
const REGRESSION_PATH_ENV: &str = "REGRESSION_PATH";

/// Suites backed by the external programs named in the regression matrix.
pub struct CommandSuites {
    config: RegressionConfig,
}

impl CommandSuites {
    pub fn new(config: RegressionConfig) -> Self {
        Self { config }
    }
}

impl SuiteProvider for CommandSuites {
    fn operator_tester(
        &self,
        source: &str,
        chip: &str,
        reduced: bool,
    ) -> RegressionResult<Box<dyn OperatorTester>> {
        let source = self
            .config
            .op_source(source)
            .with_context(|| format!("No op source named '{source}' in the regression matrix"))?;

        Ok(Box::new(CommandTester {
            source: source.clone(),
            chip: chip.to_string(),
            reduced,
        }))
    }

    fn model_regressor(&self, options: &ModelOptions) -> RegressionResult<Box<dyn ModelRegressor>> {
        Ok(Box::new(CommandRegressor {
            driver: self.config.model_driver.clone(),
            options: options.clone(),
        }))
    }

    fn run_script(&self, name: &str, ctx: &JobContext) -> RegressionResult<()> {
        let script = self
            .config
            .script
            .as_ref()
            .filter(|script| script.name == name)
            .with_context(|| format!("No script suite named '{name}' in the regression matrix"))?;

        let vars = TemplateVars {
            regression_path: Some(ctx.regression_path()),
            workdir: Some(ctx.workdir()),
            ..Default::default()
        };
        let shell = which::which("bash").context("bash not found in PATH")?;
        let (status, _) = run_logged(shell, &[vars.expand(&script.path)], ctx, None)?;

        if !status.success() {
            bail!("Script {} failed with status: {status}", script.path);
        }
        Ok(())
    }
}

/// Runs every case of one op source on one chip.
///
/// The tester prints a line starting with the source's failure marker for each failing case.
struct CommandTester {
    source: OpSourceConfig,
    chip: String,
    reduced: bool,
}

impl OperatorTester for CommandTester {
    fn run_all(&mut self, ctx: &JobContext) -> RegressionResult<Vec<String>> {
        let vars = TemplateVars {
            regression_path: Some(ctx.regression_path()),
            workdir: Some(ctx.workdir()),
            chip: Some(&self.chip),
            ..Default::default()
        };
        let mut args = vars.expand_all(&self.source.command);
        if self.reduced && self.source.accepts_reduced() {
            args.extend(vars.expand_all(&self.source.reduced_args));
        }

        let (program, args) = split_command(&args, ctx)?;
        let (status, failing) =
            run_logged(program, args, ctx, Some(&self.source.failure_marker))?;

        if failing.is_empty() && !status.success() {
            bail!(
                "Tester for {} exited with status {status} without naming a failing case",
                self.source.name
            );
        }
        Ok(failing)
    }
}

/// Runs the model driver for one model on one chip.
struct CommandRegressor {
    driver: ModelDriverConfig,
    options: ModelOptions,
}

impl ModelRegressor for CommandRegressor {
    fn run_full(&mut self, ctx: &JobContext) -> RegressionResult<i32> {
        let mode = self.options.mode.to_string();
        let vars = TemplateVars {
            regression_path: Some(ctx.regression_path()),
            workdir: Some(ctx.workdir()),
            chip: Some(&self.options.chip),
            model: Some(&self.options.model_name),
            mode: Some(&mode),
        };
        let mut args = vars.expand_all(&self.driver.command);
        if self.options.save_log {
            args.extend(vars.expand_all(&self.driver.save_log_args));
        }
        if self.options.disable_thread {
            args.extend(vars.expand_all(&self.driver.disable_thread_args));
        }

        let (program, args) = split_command(&args, ctx)?;
        let (status, _) = run_logged(program, args, ctx, None)?;

        status
            .code()
            .with_context(|| format!("Model driver was terminated by a signal: {status}"))
    }
}

/// Resolve the program of an expanded command. Bare names are looked up in `PATH`, relative
/// paths are taken from the job's working directory.
fn split_command<'a>(
    command: &'a [String],
    ctx: &JobContext,
) -> RegressionResult<(PathBuf, &'a [String])> {
    let Some((program, args)) = command.split_first() else {
        bail!("Empty command for {}", ctx.case_name());
    };

    let program = if program.contains(std::path::MAIN_SEPARATOR) {
        ctx.workdir().join(program)
    } else {
        which::which(program).with_context(|| format!("'{program}' not found in PATH"))?
    };
    Ok((program, args))
}

/// Run a suite process in the job's working directory.
///
/// Stdout is forwarded line by line to the job's log, stderr is appended to the log file
/// directly. Returns the exit status and the failing cases named after `failure_marker`.
fn run_logged(
    program: PathBuf,
    args: &[String],
    ctx: &JobContext,
    failure_marker: Option<&str>,
) -> RegressionResult<(ExitStatus, Vec<String>)> {
    log::debug!("Running {} {}", program.display(), args.join(" "));

    let mut child = Command::new(&program)
        .args(args)
        .current_dir(ctx.workdir())
        .env(REGRESSION_PATH_ENV, ctx.regression_path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(ctx.log_stdio().context("Failed to share the case log")?)
        .spawn()
        .with_context(|| format!("Failed to start {}", program.display()))?;

    let stdout = child
        .stdout
        .take()
        .context("Failed to capture suite output")?;

    // Reap the child even when its output cannot be read.
    let output = forward_output(stdout, failure_marker);
    let status = child
        .wait()
        .with_context(|| format!("Failed to wait for {}", program.display()))?;
    log::debug!("{} finished with status: {status}", program.display());
    let failing = output.context("Failed to read suite output")?;

    Ok((status, failing))
}

/// Log each output line and collect the failing cases named after `failure_marker`.
///
/// Lines are decoded lossily, tools are free to print bytes that are not UTF-8.
fn forward_output(
    output: impl Read,
    failure_marker: Option<&str>,
) -> std::io::Result<Vec<String>> {
    let mut reader = BufReader::new(output);
    let mut buf = Vec::new();
    let mut failing = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        log::info!("{line}");
        if let Some(case) = failure_marker.and_then(|marker| line.strip_prefix(marker)) {
            failing.push(case.trim().to_string());
        }
    }

    Ok(failing)
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use chip_regression_runner::prelude::{
        init_logging, IsolatedRunner, JobDescriptor, JobStatus, RunLayout, TestMode,
    };
    use pretty_assertions::assert_eq;

    use super::*;

    fn matrix(op_command: &str, driver_command: &str) -> RegressionConfig {
        RegressionConfig::from_toml_str(&format!(
            r#"
chips = ["bm1684x", "bm1686"]

[[op_source]]
name = "onnx"
chips = ["bm1684x", "bm1686"]
command = ["sh", "-c", "{op_command}", "tester"]
reduced_args = ["--simple"]

[script]
name = "script"
path = "{{regression_path}}/script_test/run.sh"

[model_driver]
command = ["sh", "-c", "{driver_command}", "driver", "{{model}}", "{{chip}}", "{{mode}}"]
disable_thread_args = ["--disable_thread"]

[[model]]
name = "resnet50_v2"
full = ["bm1684x"]
"#
        ))
        .unwrap()
    }

    fn runner(root: &std::path::Path, config: RegressionConfig) -> IsolatedRunner {
        let _ = init_logging();
        let layout = RunLayout::new(root);
        layout.prepare().unwrap();
        IsolatedRunner::new(Arc::new(CommandSuites::new(config)), layout, true)
    }

    #[test]
    fn tester_reports_marked_cases() {
        let root = tempfile::tempdir().unwrap();
        let runner = runner(
            root.path(),
            matrix(
                "echo 'FAILED: Conv2d'; echo passed Relu; echo 'FAILED: Softmax'; exit 1",
                "exit 0",
            ),
        );

        let result = runner
            .run_job(&JobDescriptor::operator_suite("onnx", "bm1686", TestMode::Full))
            .unwrap();

        assert_eq!(JobStatus::Failed, result.status);
        assert_eq!(vec!["Conv2d", "Softmax"], result.error_cases);
        let log = std::fs::read_to_string(runner.layout().log_path("onnx_test_bm1686")).unwrap();
        assert!(log.contains("passed Relu"));
    }

    #[test]
    fn tester_receives_reduced_flag_in_basic_mode() {
        let root = tempfile::tempdir().unwrap();
        let runner = runner(root.path(), matrix("echo \\\"$@\\\" > args.txt", "exit 0"));

        let result = runner
            .run_job(&JobDescriptor::operator_suite("onnx", "bm1684x", TestMode::Basic))
            .unwrap();

        assert_eq!(JobStatus::Passed, result.status);
        let args =
            std::fs::read_to_string(runner.layout().workdir("onnx_test_bm1684x").join("args.txt"))
                .unwrap();
        assert_eq!("--simple", args.trim());
    }

    #[test]
    fn silent_tester_crash_fails_without_cases() {
        let root = tempfile::tempdir().unwrap();
        let runner = runner(root.path(), matrix("echo boom >&2; exit 3", "exit 0"));

        let result = runner
            .run_job(&JobDescriptor::operator_suite("onnx", "bm1684x", TestMode::Full))
            .unwrap();

        assert_eq!(JobStatus::Failed, result.status);
        assert!(result.error_cases.is_empty());
        let log = std::fs::read_to_string(runner.layout().log_path("onnx_test_bm1684x")).unwrap();
        assert!(log.contains("boom"));
    }

    #[test]
    fn driver_gets_model_arguments_and_exit_code_counts() {
        let root = tempfile::tempdir().unwrap();
        let runner = runner(
            root.path(),
            matrix("exit 0", "echo \\\"$@\\\" > args.txt; test \\\"$1\\\" = resnet50_v2"),
        );

        let result = runner
            .run_job(&JobDescriptor::model_regression("resnet50_v2", "bm1684x", TestMode::Full))
            .unwrap();
        assert_eq!(JobStatus::Passed, result.status);

        let args_path = runner.layout().workdir("resnet50_v2_bm1684x").join("args.txt");
        let args = std::fs::read_to_string(args_path).unwrap();
        assert_eq!(
            "resnet50_v2 bm1684x all --save_log --disable_thread",
            args.trim()
        );

        let result = runner
            .run_job(&JobDescriptor::model_regression("yolov5s", "bm1684x", TestMode::Full))
            .unwrap();
        assert_eq!(JobStatus::Failed, result.status);
    }

    #[test]
    fn driver_output_that_is_not_utf8_still_passes() {
        let root = tempfile::tempdir().unwrap();
        let runner = runner(
            root.path(),
            matrix(
                "exit 0",
                r"printf 'compiled \\377 ok\\n'; sleep 1; touch done.txt; exit 0",
            ),
        );

        let result = runner
            .run_job(&JobDescriptor::model_regression("resnet50_v2", "bm1684x", TestMode::Full))
            .unwrap();

        assert_eq!(JobStatus::Passed, result.status);
        // The driver has exited by the time its result exists.
        assert!(runner
            .layout()
            .workdir("resnet50_v2_bm1684x")
            .join("done.txt")
            .is_file());
        let log = std::fs::read(runner.layout().log_path("resnet50_v2_bm1684x")).unwrap();
        assert!(String::from_utf8_lossy(&log).contains("compiled \u{FFFD} ok"));
    }

    #[test]
    fn output_lines_are_decoded_lossily() {
        let output: &[u8] = b"FAILED: Conv\xff2d\nplain line\r\nFAILED: Softmax";

        let failing = forward_output(output, Some("FAILED:")).unwrap();

        assert_eq!(vec!["Conv\u{FFFD}2d", "Softmax"], failing);
    }

    #[test]
    fn script_runs_through_bash() {
        let root = tempfile::tempdir().unwrap();
        let script_dir = root.path().join("script_test");
        std::fs::create_dir_all(&script_dir).unwrap();
        std::fs::write(script_dir.join("run.sh"), "pwd > where.txt\nexit 0\n").unwrap();
        let runner = runner(root.path(), matrix("exit 0", "exit 0"));

        let result = runner
            .run_job(&JobDescriptor::script_suite("script", TestMode::Basic))
            .unwrap();

        assert_eq!(JobStatus::Passed, result.status);
        assert!(runner.layout().workdir("script_test").join("where.txt").is_file());

        std::fs::write(script_dir.join("run.sh"), "exit 1\n").unwrap();
        let result = runner
            .run_job(&JobDescriptor::script_suite("script", TestMode::Basic))
            .unwrap();
        assert_eq!(JobStatus::Failed, result.status);
    }

    #[test]
    fn unknown_op_source_fails_the_job() {
        let root = tempfile::tempdir().unwrap();
        let runner = runner(root.path(), matrix("exit 0", "exit 0"));

        let result = runner
            .run_job(&JobDescriptor::operator_suite("tflite", "bm1686", TestMode::Full))
            .unwrap();

        assert_eq!(JobStatus::Failed, result.status);
    }
}
