use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::anyhow;
use chip_regression_summary_model::{JobKind, JobResult};

use crate::case_log::CaseLog;
use crate::context::{JobContext, RunLayout};
use crate::error::RunnerError;
use crate::job::JobDescriptor;
use crate::suite::{ModelOptions, SuiteProvider};
use crate::types::RegressionResult;

/// Runs one job at a time with its own working directory and case log.
///
/// Safe to share between worker threads: each call to [IsolatedRunner::run_job] owns everything
/// it touches apart from the suite provider.
pub struct IsolatedRunner {
    suites: Arc<dyn SuiteProvider>,
    layout: RunLayout,
    disable_thread: bool,
}

impl IsolatedRunner {
    pub fn new(suites: Arc<dyn SuiteProvider>, layout: RunLayout, disable_thread: bool) -> Self {
        Self {
            suites,
            layout,
            disable_thread,
        }
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    /// Run a job and convert whatever the suite does into a [JobResult].
    ///
    /// Only failing to set up the job's log or working directory is an error. Suite errors,
    /// non-zero exits and panics all become a failed result.
    pub fn run_job(&self, job: &JobDescriptor) -> Result<JobResult, RunnerError> {
        let case_name = job.case_name();
        log::info!("======= {} {case_name} {} =======", job.kind, job.mode);

        let log_path = self.layout.log_path(&case_name);
        let case_log = CaseLog::create(&log_path).map_err(|source| RunnerError::CaseLog {
            path: log_path.clone(),
            source,
        })?;

        let workdir = self.layout.workdir(&case_name);
        std::fs::create_dir_all(&workdir).map_err(|source| RunnerError::Workdir {
            path: workdir.clone(),
            source,
        })?;

        let ctx = JobContext::new(
            case_name.clone(),
            workdir,
            self.layout.regression_path().to_path_buf(),
            case_log,
        );

        let outcome = {
            let _guard = ctx.log().attach();
            log::debug!("Working directory: {}", ctx.workdir().display());

            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(job, &ctx)))
                .unwrap_or_else(|panic| {
                    Err(anyhow!("Suite panicked: {}", panic_message(panic.as_ref())))
                });
            if let Err(e) = &outcome {
                log::error!("{case_name} did not complete: {e:?}");
            }
            outcome
        };

        let result = match outcome {
            Ok(error_cases) if error_cases.is_empty() => JobResult::passed(case_name, job.kind),
            Ok(error_cases) => JobResult::failed(case_name, job.kind, error_cases),
            Err(e) => {
                log::warn!("{} {case_name} failed: {e}", job.kind);
                JobResult::failed(case_name, job.kind, Vec::new())
            }
        };
        log::info!("{} {}", result.case_name, result.status);

        Ok(result)
    }

    /// Returns the failing sub-cases, empty on success.
    fn dispatch(&self, job: &JobDescriptor, ctx: &JobContext) -> RegressionResult<Vec<String>> {
        match job.kind {
            JobKind::OperatorSuite => self.run_operator_suite(job, ctx),
            JobKind::ScriptSuite => self.run_script_suite(job, ctx),
            JobKind::ModelRegression => self.run_model_regression(job, ctx),
        }
    }

    fn run_operator_suite(
        &self,
        job: &JobDescriptor,
        ctx: &JobContext,
    ) -> RegressionResult<Vec<String>> {
        let mut tester =
            self.suites
                .operator_tester(&job.identity, &job.target_profile, job.reduced())?;
        tester.run_all(ctx)
    }

    fn run_script_suite(
        &self,
        job: &JobDescriptor,
        ctx: &JobContext,
    ) -> RegressionResult<Vec<String>> {
        self.suites.run_script(&job.identity, ctx)?;
        Ok(Vec::new())
    }

    fn run_model_regression(
        &self,
        job: &JobDescriptor,
        ctx: &JobContext,
    ) -> RegressionResult<Vec<String>> {
        let options = ModelOptions {
            model_name: job.identity.clone(),
            chip: job.target_profile.clone(),
            mode: job.mode,
            save_log: true,
            disable_thread: self.disable_thread,
        };
        let mut regressor = self.suites.model_regressor(&options)?;
        match regressor.run_full(ctx)? {
            0 => Ok(Vec::new()),
            code => Err(anyhow!("Model regression exited with status {code}")),
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
