use std::collections::HashSet;

use crate::config::{ConfigError, RegressionConfig};
use crate::job::{JobDescriptor, TestMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    /// One op source against each of its chips, one job at a time.
    OperatorSource,
    Script,
    /// Every model selected for one chip, run through the worker pool.
    Models,
}

/// A timed group of jobs. Phases run in the order they are planned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    /// Label of the timing entry recorded when the phase completes.
    pub label: String,
    pub kind: PhaseKind,
    pub jobs: Vec<JobDescriptor>,
}

/// Expand the matrix into phases: operator sources, then the script suite, then one model phase
/// per chip.
///
/// A phase may have no jobs, it still gets timed.
pub fn plan(config: &RegressionConfig, mode: TestMode) -> Result<Vec<Phase>, ConfigError> {
    let mut phases = Vec::with_capacity(config.op_sources.len() + 1 + config.chips.len());

    for source in &config.op_sources {
        phases.push(Phase {
            label: format!("run_{}", source.name),
            kind: PhaseKind::OperatorSource,
            jobs: source
                .chips
                .iter()
                .map(|chip| JobDescriptor::operator_suite(&source.name, chip, mode))
                .collect(),
        });
    }

    phases.push(Phase {
        label: "run_script".to_string(),
        kind: PhaseKind::Script,
        jobs: config
            .script
            .iter()
            .map(|script| JobDescriptor::script_suite(&script.name, mode))
            .collect(),
    });

    for chip in &config.chips {
        phases.push(Phase {
            label: format!("run models for {chip}"),
            kind: PhaseKind::Models,
            jobs: config
                .models
                .iter()
                .filter(|model| model.runs_on(chip, mode))
                .map(|model| JobDescriptor::model_regression(&model.name, chip, mode))
                .collect(),
        });
    }

    let mut seen = HashSet::new();
    for job in phases.iter().flat_map(|phase| &phase.jobs) {
        let case_name = job.case_name();
        if !seen.insert(case_name.clone()) {
            return Err(ConfigError::DuplicateCase(case_name));
        }
    }

    Ok(phases)
}

/// Total number of jobs across `phases`.
pub fn job_count(phases: &[Phase]) -> usize {
    phases.iter().map(|phase| phase.jobs.len()).sum()
}
