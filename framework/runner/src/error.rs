use std::path::PathBuf;

/// Environmental failures that abort the whole run.
///
/// Failures of the suites themselves never end up here, the isolated runner turns those into a
/// failed [chip_regression_summary_model::JobResult].
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to create working directory {path}: {source}")]
    Workdir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to create case log {path}: {source}")]
    CaseLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to spawn worker for {case_name}: {source}")]
    SpawnWorker {
        case_name: String,
        #[source]
        source: std::io::Error,
    },
}
