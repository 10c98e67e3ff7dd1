use chip_regression_core::prelude::DelegatedShutdownListener;
use chip_regression_summary_model::Verdict;
use indicatif::ProgressBar;

use crate::aggregator::{Aggregator, PhaseOutcome, RunState};
use crate::error::RunnerError;
use crate::isolated::IsolatedRunner;
use crate::job::TestMode;
use crate::plan::{Phase, PhaseKind};
use crate::pool::{Concurrency, WorkerPool};
use crate::progress::phase_progress;

/// The result of [Scheduler::run].
#[derive(Debug)]
pub struct RunOutcome {
    pub state: RunState,
    /// A shutdown request stopped the run before every phase completed.
    pub interrupted: bool,
    /// Basic mode hit a failure and skipped the remaining phases.
    pub stopped_early: bool,
}

impl RunOutcome {
    /// Failed if any job failed or the run was interrupted.
    pub fn verdict(&self) -> Verdict {
        if self.interrupted {
            Verdict::Failed
        } else {
            self.state.verdict()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhaseEnd {
    Completed,
    Halted,
    Interrupted,
}

/// Drives the planned phases in order and owns the run's [RunState].
pub struct Scheduler<'a> {
    runner: &'a IsolatedRunner,
    concurrency: Concurrency,
    mode: TestMode,
    shutdown: DelegatedShutdownListener,
    show_progress: bool,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        runner: &'a IsolatedRunner,
        concurrency: Concurrency,
        mode: TestMode,
        shutdown: DelegatedShutdownListener,
    ) -> Self {
        Self {
            runner,
            concurrency,
            mode,
            shutdown,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Run every phase, stopping early on a basic mode failure or a shutdown request.
    ///
    /// Only environmental failures are returned as errors. Timing is recorded for completed phases
    /// only, and the total time only when every phase completed.
    pub fn run(&self, phases: &[Phase]) -> Result<RunOutcome, RunnerError> {
        let mut aggregator = Aggregator::new(self.mode, self.runner.layout().out_dir());
        let mut end = PhaseEnd::Completed;

        for phase in phases {
            if self.shutdown.should_shutdown() {
                end = PhaseEnd::Interrupted;
                break;
            }

            log::info!("Starting phase {} with {} jobs", phase.label, phase.jobs.len());
            let progress = phase_progress(&phase.label, phase.jobs.len(), self.show_progress);
            let phase_end = match phase.kind {
                PhaseKind::OperatorSource | PhaseKind::Script => {
                    self.run_one_by_one(phase, &mut aggregator, &progress)
                }
                PhaseKind::Models => self.run_pooled(phase, &mut aggregator, &progress),
            };
            progress.finish_and_clear();

            end = phase_end?;
            if end != PhaseEnd::Completed {
                break;
            }
            aggregator.close_phase(&phase.label);
        }

        match end {
            PhaseEnd::Completed => aggregator.close_run(),
            PhaseEnd::Halted => log::warn!("Basic test failed, skipping the remaining phases"),
            PhaseEnd::Interrupted => log::warn!("Run interrupted, skipping the remaining phases"),
        }

        Ok(RunOutcome {
            state: aggregator.into_state(),
            interrupted: end == PhaseEnd::Interrupted,
            stopped_early: end == PhaseEnd::Halted,
        })
    }

    /// Each job is its own fail-fast point.
    fn run_one_by_one(
        &self,
        phase: &Phase,
        aggregator: &mut Aggregator,
        progress: &ProgressBar,
    ) -> Result<PhaseEnd, RunnerError> {
        for job in &phase.jobs {
            if self.shutdown.should_shutdown() {
                return Ok(PhaseEnd::Interrupted);
            }

            let result = self.runner.run_job(job)?;
            progress.inc(1);
            if aggregator.record(vec![result]) == PhaseOutcome::Halt {
                return Ok(PhaseEnd::Halted);
            }
        }

        Ok(PhaseEnd::Completed)
    }

    /// The whole batch of models is one fail-fast point.
    fn run_pooled(
        &self,
        phase: &Phase,
        aggregator: &mut Aggregator,
        progress: &ProgressBar,
    ) -> Result<PhaseEnd, RunnerError> {
        let outcome = WorkerPool::new(self.runner, self.concurrency, &self.shutdown)
            .with_progress(progress.clone())
            .run(&phase.jobs)?;

        let halted = aggregator.record(outcome.results) == PhaseOutcome::Halt;
        if outcome.interrupted {
            Ok(PhaseEnd::Interrupted)
        } else if halted {
            Ok(PhaseEnd::Halted)
        } else {
            Ok(PhaseEnd::Completed)
        }
    }
}
