use std::path::{Path, PathBuf};
use std::time::Instant;

use chip_regression_summary_model::{JobResult, TimingEntry, Verdict};

use crate::job::TestMode;

/// Label of the timing entry that covers the whole run.
pub const TOTAL_TIME_LABEL: &str = "total time";

/// Everything a run accumulates. Owned by the scheduler, never handed to workers.
#[derive(Debug)]
pub struct RunState {
    results: Vec<JobResult>,
    time_cost: Vec<TimingEntry>,
    original_working_directory: PathBuf,
    started: Instant,
    last_boundary: Instant,
}

impl RunState {
    pub fn new(original_working_directory: impl Into<PathBuf>) -> Self {
        let now = Instant::now();
        Self {
            results: Vec::new(),
            time_cost: Vec::new(),
            original_working_directory: original_working_directory.into(),
            started: now,
            last_boundary: now,
        }
    }

    pub fn results(&self) -> &[JobResult] {
        &self.results
    }

    pub fn time_cost(&self) -> &[TimingEntry] {
        &self.time_cost
    }

    pub fn original_working_directory(&self) -> &Path {
        &self.original_working_directory
    }

    pub fn verdict(&self) -> Verdict {
        Verdict::from_results(&self.results)
    }

    pub fn into_parts(self) -> (Vec<JobResult>, Vec<TimingEntry>) {
        (self.results, self.time_cost)
    }

    fn extend_results(&mut self, results: Vec<JobResult>) {
        self.results.extend(results);
    }

    /// Close the current phase, timing it from the previous boundary.
    fn mark_phase(&mut self, label: &str) {
        let now = Instant::now();
        let seconds = now.duration_since(self.last_boundary).as_secs();
        self.last_boundary = now;
        self.time_cost.push(TimingEntry::new(label, seconds));
    }

    /// Time from the start of the run to the last phase boundary.
    fn mark_total(&mut self) {
        let seconds = self.last_boundary.duration_since(self.started).as_secs();
        self.time_cost
            .push(TimingEntry::new(TOTAL_TIME_LABEL, seconds));
    }
}

/// What the scheduler should do after handing over a set of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Continue,
    /// Basic mode saw a failure, skip every remaining phase.
    Halt,
}

/// Collects results and timing into a [RunState] and applies the basic mode fail-fast policy.
#[derive(Debug)]
pub struct Aggregator {
    state: RunState,
    mode: TestMode,
}

impl Aggregator {
    pub fn new(mode: TestMode, original_working_directory: impl Into<PathBuf>) -> Self {
        Self {
            state: RunState::new(original_working_directory),
            mode,
        }
    }

    /// Append the results just produced at a fail-fast point.
    ///
    /// Only these results are inspected, not the history of the run. A failure that was recorded
    /// earlier does not halt a later clean phase.
    pub fn record(&mut self, results: Vec<JobResult>) -> PhaseOutcome {
        let failed = results.iter().any(JobResult::is_failed);
        self.state.extend_results(results);

        if failed && self.mode.is_basic() {
            PhaseOutcome::Halt
        } else {
            PhaseOutcome::Continue
        }
    }

    pub fn close_phase(&mut self, label: &str) {
        self.state.mark_phase(label);
    }

    /// Record the total time after the last phase has closed.
    pub fn close_run(&mut self) {
        self.state.mark_total();
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn into_state(self) -> RunState {
        self.state
    }
}
