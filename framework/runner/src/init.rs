use clap::Parser;

use crate::case_log::init_logging;
use crate::cli::RegressionCli;

/// Initialise the CLI and logging for the regression runner.
pub fn init() -> RegressionCli {
    if let Err(e) = init_logging() {
        eprintln!("Logging was already initialised: {e}");
    }

    RegressionCli::parse()
}
