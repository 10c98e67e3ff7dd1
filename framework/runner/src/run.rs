use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chip_regression_core::prelude::{ShutdownHandle, ShutdownSignalError};
use chip_regression_summary_model::{append_run_summary, RunSummary};

use crate::case_log::CaseLog;
use crate::cli::RegressionCli;
use crate::config::RegressionConfig;
use crate::context::RunLayout;
use crate::error::RunnerError;
use crate::isolated::IsolatedRunner;
use crate::monitor::start_monitor;
use crate::plan::{job_count, plan};
use crate::pool::Concurrency;
use crate::report::render_report;
use crate::scheduler::Scheduler;
use crate::shutdown::start_shutdown_listener;
use crate::suite::SuiteProvider;

/// Matrix file looked up in the regression path when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "regression.toml";
/// Summary file written to the output directory when no `--summary_file` is given.
pub const DEFAULT_SUMMARY_FILE: &str = "regression_summary.jsonl";

/// Load the regression matrix selected on the command line.
pub fn load_config(cli: &RegressionCli) -> anyhow::Result<RegressionConfig> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => {
            let path = cli.regression_path.join(DEFAULT_CONFIG_FILE);
            if !path.exists() {
                log::info!(
                    "No {} found in {}, using the bundled matrix",
                    DEFAULT_CONFIG_FILE,
                    cli.regression_path.display()
                );
                return RegressionConfig::bundled().context("Bundled regression matrix is invalid");
            }
            path
        }
    };

    RegressionConfig::load(&path)
        .with_context(|| format!("Failed to load regression matrix {}", path.display()))
}

/// Run the whole matrix and report on it.
///
/// The summary is appended to the summary file and the report is printed to stdout. Failed jobs
/// are part of the returned summary, only environmental failures are returned as errors.
pub fn run(
    cli: &RegressionCli,
    config: &RegressionConfig,
    suites: Arc<dyn SuiteProvider>,
) -> anyhow::Result<RunSummary> {
    let layout = RunLayout::new(&cli.regression_path);
    layout.prepare()?;
    let main_log_path = layout.main_log_path();
    let main_log = CaseLog::create(&main_log_path).map_err(|source| RunnerError::CaseLog {
        path: main_log_path,
        source,
    })?;
    let _main_log_guard = main_log.attach_to_run();

    let phases = plan(config, cli.test_type)?;
    let concurrency = Concurrency::from_settings(cli.disable_thread, cli.jobs);
    log::info!(
        "Running {} regression: {} jobs in {} phases, concurrency {:?}",
        cli.test_type,
        job_count(&phases),
        phases.len(),
        concurrency
    );

    let started_at = chrono::Utc::now().timestamp();
    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime);

    // The monitor has its own handle, it must stop when the run ends even without Ctrl-C.
    let monitor_handle = ShutdownHandle::new();
    let monitor = match start_monitor(monitor_handle.new_listener()) {
        Ok(monitor) => Some(monitor),
        Err(e) => {
            log::warn!("Failed to start resource monitor: {e}");
            None
        }
    };

    let runner = IsolatedRunner::new(suites, layout.clone(), cli.disable_thread);
    let outcome = Scheduler::new(
        &runner,
        concurrency,
        cli.test_type,
        shutdown_handle.new_listener(),
    )
    .with_progress(!cli.no_progress)
    .run(&phases);

    monitor_handle.shutdown();
    if let Some(monitor) = monitor {
        if monitor.join().is_err() {
            log::warn!("Resource monitor panicked");
        }
    }
    let outcome = outcome?;

    if outcome.interrupted {
        log::warn!("{}", ShutdownSignalError::default());
    }
    let verdict = outcome.verdict();
    let interrupted = outcome.interrupted;
    let (results, time_cost) = outcome.state.into_parts();

    let summary = RunSummary {
        run_id: nanoid::nanoid!(),
        test_type: cli.test_type.to_string(),
        started_at,
        verdict,
        interrupted,
        results,
        time_cost,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let summary_path = cli
        .summary_file
        .clone()
        .unwrap_or_else(|| layout.out_dir().join(DEFAULT_SUMMARY_FILE));
    write_summary(&summary, summary_path);

    println!("{}", render_report(&summary, layout.out_dir()));

    Ok(summary)
}

/// Persisting the summary is best effort, the report and exit code still reflect the run.
fn write_summary(summary: &RunSummary, path: PathBuf) {
    match append_run_summary(summary, &path) {
        Ok(()) => log::info!(
            "Run {} ({}) summary appended to {}",
            summary.run_id,
            summary.fingerprint(),
            path.display()
        ),
        Err(e) => log::error!("Failed to write run summary to {}: {e:?}", path.display()),
    }
}
