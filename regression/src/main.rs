mod command_suites;
mod template;

use std::process::ExitCode;
use std::sync::Arc;

use chip_regression_runner::prelude::{init, load_config, run};

use crate::command_suites::CommandSuites;

fn main() -> anyhow::Result<ExitCode> {
    let cli = init();
    let config = load_config(&cli)?;

    let summary = run(&cli, &config, Arc::new(CommandSuites::new(config.clone())))?;

    Ok(ExitCode::from(summary.verdict.exit_code()))
}
