//! The narrow contract between the runner and the external test suites.
//!
//! Every collaborator receives the [JobContext] of the job it runs for. Anything it writes through
//! the `log` macros on the calling thread lands in that job's case log.

use crate::context::JobContext;
use crate::job::TestMode;
use crate::types::RegressionResult;

/// An operator conformance tester bound to one chip.
pub trait OperatorTester {
    /// Run every case and return the identifiers of the failing ones. Empty means success.
    fn run_all(&mut self, ctx: &JobContext) -> RegressionResult<Vec<String>>;
}

/// A model compilation regression driver bound to one model and chip.
pub trait ModelRegressor {
    /// Run the full pipeline and return its exit code, 0 on success.
    fn run_full(&mut self, ctx: &JobContext) -> RegressionResult<i32>;
}

/// Construction parameters for a [ModelRegressor].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelOptions {
    pub model_name: String,
    pub chip: String,
    pub mode: TestMode,
    pub save_log: bool,
    pub disable_thread: bool,
}

/// Builds the collaborators for each kind of job.
///
/// Implementations are shared between worker threads.
pub trait SuiteProvider: Send + Sync {
    /// Create a tester for the op source `source`, bound to `(chip, reduced)`.
    fn operator_tester(
        &self,
        source: &str,
        chip: &str,
        reduced: bool,
    ) -> RegressionResult<Box<dyn OperatorTester>>;

    fn model_regressor(&self, options: &ModelOptions) -> RegressionResult<Box<dyn ModelRegressor>>;

    /// Run the script suite `name` through the host shell. Any error, including a non-zero exit,
    /// fails the job.
    fn run_script(&self, name: &str, ctx: &JobContext) -> RegressionResult<()>;
}
