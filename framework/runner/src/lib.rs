mod aggregator;
mod case_log;
mod cli;
mod config;
mod context;
mod error;
mod init;
mod isolated;
mod job;
mod monitor;
mod plan;
mod pool;
mod progress;
mod report;
mod run;
mod scheduler;
mod shutdown;
mod sink;
mod suite;
mod types;

#[cfg(test)]
mod test_support;

pub mod prelude {
    pub use crate::aggregator::{Aggregator, PhaseOutcome, RunState, TOTAL_TIME_LABEL};
    pub use crate::case_log::{init_logging, CaseLog, CaseLogGuard, RunLogGuard, CASE_LOG_LEVEL};
    pub use crate::cli::RegressionCli;
    pub use crate::config::{
        ConfigError, ModelConfig, ModelDriverConfig, OpSourceConfig, RegressionConfig,
        ScriptConfig,
    };
    pub use crate::context::{JobContext, RunLayout, MAIN_LOG_FILE, REGRESSION_OUT_DIR};
    pub use crate::error::RunnerError;
    pub use crate::init::init;
    pub use crate::isolated::IsolatedRunner;
    pub use crate::job::{JobDescriptor, TestMode};
    pub use crate::plan::{job_count, plan, Phase, PhaseKind};
    pub use crate::pool::{host_parallelism, Concurrency, PoolOutcome, WorkerPool};
    pub use crate::report::{log_tail, render_report, LOG_TAIL_LINES};
    pub use crate::run::{load_config, run, DEFAULT_CONFIG_FILE, DEFAULT_SUMMARY_FILE};
    pub use crate::scheduler::{RunOutcome, Scheduler};
    pub use crate::sink::ResultSink;
    pub use crate::suite::{ModelOptions, ModelRegressor, OperatorTester, SuiteProvider};
    pub use crate::types::RegressionResult;

    pub use chip_regression_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
    pub use chip_regression_summary_model::{JobKind, JobResult, JobStatus, RunSummary, Verdict};
}
