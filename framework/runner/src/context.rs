use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::case_log::CaseLog;
use crate::error::RunnerError;

/// Directory name, under the regression root, that holds logs and job working directories.
pub const REGRESSION_OUT_DIR: &str = "regression_out";
/// Run-level log file in the output directory.
pub const MAIN_LOG_FILE: &str = "main.log";

/// Filesystem layout of a run.
///
/// The output directory is the run's original working directory. Case logs are written there and
/// each job gets its own working directory below it.
#[derive(Debug, Clone)]
pub struct RunLayout {
    regression_path: PathBuf,
    out_dir: PathBuf,
}

impl RunLayout {
    pub fn new(regression_path: impl Into<PathBuf>) -> Self {
        let regression_path = regression_path.into();
        let out_dir = regression_path.join(REGRESSION_OUT_DIR);
        Self {
            regression_path,
            out_dir,
        }
    }

    pub fn regression_path(&self) -> &Path {
        &self.regression_path
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Create the output directory if it does not exist yet.
    pub fn prepare(&self) -> Result<(), RunnerError> {
        std::fs::create_dir_all(&self.out_dir).map_err(|source| RunnerError::OutputDir {
            path: self.out_dir.clone(),
            source,
        })
    }

    pub fn workdir(&self, case_name: &str) -> PathBuf {
        self.out_dir.join(case_name)
    }

    pub fn log_path(&self, case_name: &str) -> PathBuf {
        self.out_dir.join(format!("{case_name}.log"))
    }

    /// Log of everything that happens outside a job.
    pub fn main_log_path(&self) -> PathBuf {
        self.out_dir.join(MAIN_LOG_FILE)
    }
}

/// Everything a suite collaborator may touch while its job runs.
///
/// The process-wide current directory is shared by all workers, so suites must run their work in
/// [JobContext::workdir] rather than relying on the current directory.
#[derive(Debug)]
pub struct JobContext {
    case_name: String,
    workdir: PathBuf,
    regression_path: PathBuf,
    log: CaseLog,
}

impl JobContext {
    pub(crate) fn new(
        case_name: String,
        workdir: PathBuf,
        regression_path: PathBuf,
        log: CaseLog,
    ) -> Self {
        Self {
            case_name,
            workdir,
            regression_path,
            log,
        }
    }

    pub fn case_name(&self) -> &str {
        &self.case_name
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn regression_path(&self) -> &Path {
        &self.regression_path
    }

    pub fn log(&self) -> &CaseLog {
        &self.log
    }

    /// A [Stdio] that appends a child process's output to this job's log.
    pub fn log_stdio(&self) -> std::io::Result<Stdio> {
        self.log.try_clone_file().map(Stdio::from)
    }
}
